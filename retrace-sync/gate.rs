use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;


/// Error returned when a blocked [`GateCounter::wait`] was failed via
/// [`GateCounter::interrupt_waiters`] before the gate opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait for gate interrupted")]
pub struct WaitInterrupted;

/// A re-openable counting gate.
///
/// The counter starts at zero, with the gate "open". Any caller may
/// [`raise`] the gate to signal one unit of outstanding work and [`lower`]
/// it once that work is done; any number of callers block in
/// [`wait`]/[`wait_timeout`] until the count drains back to zero. Note the
/// naming is inverted from a classical semaphore: the count grows on signal
/// and waiting succeeds only at zero. The gate can be raised again after it
/// has drained.
///
/// `raise` and `lower` are lock-free and never block; the internal mutex is
/// only touched when a drain has to wake waiters.
///
/// [`raise`]: GateCounter::raise
/// [`lower`]: GateCounter::lower
/// [`wait`]: GateCounter::wait
/// [`wait_timeout`]: GateCounter::wait_timeout
#[derive(Clone, Default)]
pub struct GateCounter {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicUsize,
    // Bumped by `interrupt_waiters`; waiters that parked under an older
    // value fail out of their wait.
    interrupts: AtomicUsize,
    lock: Mutex<()>,
    opened: Condvar,
}

impl GateCounter {
    pub fn new() -> GateCounter {
        GateCounter::default()
    }

    /// Current number of outstanding raises. Zero means the gate is open.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.count() == 0
    }

    /// Close the gate by one unit of outstanding work. Never blocks.
    pub fn raise(&self) {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Open the gate by one unit. Returns `false` if the count was already
    /// zero; the count never goes negative. The decrement that reaches zero
    /// wakes every blocked waiter.
    pub fn lower(&self) -> bool {
        let mut current = self.inner.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.inner.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if current == 1 {
                        // Taking the lock orders this wakeup after any waiter
                        // that observed a non-zero count and is about to park.
                        let _guard = self.inner.lock.lock();
                        self.inner.opened.notify_all();
                    }
                    return true;
                },
                Err(observed) => current = observed,
            }
        }
    }

    /// Block the calling thread until the count reaches zero. Returns
    /// immediately if the gate is already open.
    pub fn wait(&self) -> Result<(), WaitInterrupted> {
        if self.is_open() {
            return Ok(());
        }
        let mut guard = self.inner.lock.lock();
        let epoch = self.inner.interrupts.load(Ordering::Acquire);
        while self.inner.count.load(Ordering::Acquire) != 0 {
            if self.inner.interrupts.load(Ordering::Acquire) != epoch {
                return Err(WaitInterrupted);
            }
            self.inner.opened.wait(&mut guard);
        }
        Ok(())
    }

    /// Block until the count reaches zero or `timeout` elapses, returning
    /// whether the gate opened in time. Timing out is not an error.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, WaitInterrupted> {
        if self.is_open() {
            return Ok(true);
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        let epoch = self.inner.interrupts.load(Ordering::Acquire);
        while self.inner.count.load(Ordering::Acquire) != 0 {
            if self.inner.interrupts.load(Ordering::Acquire) != epoch {
                return Err(WaitInterrupted);
            }
            if self
                .inner
                .opened
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return Ok(self.inner.count.load(Ordering::Acquire) == 0);
            }
        }
        Ok(true)
    }

    /// Fail every thread currently blocked in [`wait`]/[`wait_timeout`] with
    /// [`WaitInterrupted`]. The count is unaffected; waits entered after this
    /// call proceed normally.
    ///
    /// [`wait`]: GateCounter::wait
    /// [`wait_timeout`]: GateCounter::wait_timeout
    pub fn interrupt_waiters(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.interrupts.fetch_add(1, Ordering::AcqRel);
        self.inner.opened.notify_all();
    }
}

impl std::fmt::Debug for GateCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateCounter")
            .field("count", &self.count())
            .finish()
    }
}
