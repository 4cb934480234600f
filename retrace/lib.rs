//! `retrace` tracks a selected line range backward through an ordered
//! revision history.
//!
//! A [`HistoryWalker`] projects the caller's `[start, end)` line selection
//! into ever older revisions on a single background thread, one revision at
//! a time, while any number of readers take consistent [`Snapshot`]s of the
//! progress. Where the history comes from, how diffs are rendered and how
//! notifications reach a UI thread are all left to the caller: the crate
//! only consumes the [`HistorySource`] and [`Revision`] capabilities and
//! pushes [`WalkListener`] notifications.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;

mod block;
mod walker;

pub use block::{Block, LineBlock, tokenize};
pub use retrace_sync::{CancelToken, GateCounter, WaitInterrupted};
pub use walker::{HistoryWalker, Snapshot, WalkListener};

/// One entry of a file's revision history.
///
/// Author, message and timestamps are opaque to the walker; it only needs a
/// display id and the revision's raw content bytes.
pub trait Revision: Send + Sync {
    /// Stable identifier used for display and logging.
    fn id(&self) -> Cow<'_, str>;

    /// Raw content of the tracked file at this revision.
    fn load_content(&self) -> anyhow::Result<Vec<u8>>;
}

/// Produces the ordered revision list for the tracked file, newest first.
///
/// The synthetic local revision is not part of the list; the walker prepends
/// it itself.
pub trait HistorySource: Send {
    fn collect(&mut self) -> anyhow::Result<Vec<Arc<dyn Revision>>>;
}

/// Synthetic first history entry standing in for the live, uncommitted text.
#[derive(Debug, Clone)]
pub struct LocalRevision {
    text: Arc<str>,
}

impl LocalRevision {
    pub fn new(text: &str) -> LocalRevision {
        LocalRevision {
            text: Arc::from(text),
        }
    }
}

impl Revision for LocalRevision {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed("local changes")
    }

    fn load_content(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.text.as_bytes().to_vec())
    }
}

/// Failure modes of a history walk.
///
/// Cancellation is not an error; a cancelled walk simply stops with no
/// `error` in its final [`Snapshot`]. The walker never retries: restarting
/// is an explicit caller action (construct a new [`HistoryWalker`]).
#[derive(Debug, Clone, Error)]
pub enum WalkError {
    /// The ordered revision list could not be obtained. The walk aborts
    /// before any stepping; only the local block exists.
    #[error("failed to collect revision history: {0:#}")]
    History(Arc<anyhow::Error>),

    /// A specific revision's content was unavailable or undecodable. The
    /// walk aborts, keeping every block computed before the failure.
    #[error("failed to load content for revision {revision}: {cause:#}")]
    Content {
        revision: String,
        cause: Arc<anyhow::Error>,
    },
}
