//! Synchronization primitives for the retrace crates: a re-openable counting
//! gate and a cooperative cancellation token.

mod cancel;
mod gate;

pub use cancel::CancelToken;
pub use gate::{GateCounter, WaitInterrupted};
