use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use encoding_rs::Encoding;
use parking_lot::Mutex;
use retrace_sync::{CancelToken, GateCounter};

use crate::{Block, HistorySource, LocalRevision, Revision, WalkError};


/// Notification hooks invoked from the walker's background thread.
///
/// `on_update(true)` marks points where the consumer must not defer
/// rendering; `on_update(false)` notifications fire once per step and may be
/// coalesced by the consumer. Thread-hopping to the consumer's own execution
/// context is the consumer's job. Hooks run after the walker's state lock is
/// released, so they may call [`HistoryWalker::snapshot`] freely.
pub trait WalkListener: Send + Sync {
    fn on_update(&self, flush: bool);
    fn on_error(&self, error: &WalkError);
}

/// Point-in-time copy of a walk's shared state.
///
/// Immutable once taken; safe to hand to any thread and to read without
/// locking. `blocks[i]` is the tracked range projected into `revisions[i]`,
/// and `blocks` is always a valid prefix of the finished walk.
#[derive(Clone)]
pub struct Snapshot {
    pub loading: bool,
    pub revisions: Vec<Arc<dyn Revision>>,
    pub blocks: Vec<Block>,
    pub error: Option<WalkError>,
    pub current_revision: Option<Arc<dyn Revision>>,
}

impl Snapshot {
    /// Block projected into `revisions[index]`, or `None` while the walk has
    /// not reached that revision.
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// `(computed, total)` step counts; `total` is zero until the history
    /// has been collected.
    pub fn progress(&self) -> (usize, usize) {
        (self.blocks.len(), self.revisions.len())
    }

    /// Indices of the revisions that changed the tracked text, plus the
    /// initial commit if the range still exists there. This is the
    /// "changed revisions only" view of the history.
    pub fn changed_revisions(&self) -> Vec<usize> {
        let mut result = Vec::new();
        for index in 1..self.revisions.len() {
            let (Some(newer), Some(older)) = (self.block(index - 1), self.block(index)) else {
                break;
            };
            let changed = match (newer, older) {
                (Block::Lines(newer), Block::Lines(older)) => newer.lines() != older.lines(),
                (newer, older) => newer != older,
            };
            if changed {
                result.push(index - 1);
            }
            if older.is_empty() {
                break;
            }
        }

        if let Some(initial) = self.revisions.len().checked_sub(1)
            && self.block(initial).is_some_and(|block| !block.is_empty())
        {
            result.push(initial);
        }
        result
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("loading", &self.loading)
            .field("revisions", &self.revisions.len())
            .field("blocks", &self.blocks.len())
            .field("error", &self.error)
            .field(
                "current_revision",
                &self.current_revision.as_ref().map(|revision| revision.id()),
            )
            .finish()
    }
}

struct State {
    loading: bool,
    revisions: Vec<Arc<dyn Revision>>,
    blocks: Vec<Block>,
    error: Option<WalkError>,
    current_revision: Option<Arc<dyn Revision>>,
}

struct Shared {
    state: Mutex<State>,
    listener: Arc<dyn WalkListener>,
    local: Arc<dyn Revision>,
    encoding: &'static Encoding,
    gate: GateCounter,
    started: AtomicBool,
}

/// Tracks one line selection backward through a file's revision history.
///
/// Construction computes the block for the live text synchronously;
/// [`start`] spawns a single worker thread that collects the history and
/// appends one [`Block`] per revision, newest to oldest. Clones share
/// state: any clone may take [`snapshot`]s while the worker runs.
///
/// [`start`]: HistoryWalker::start
/// [`snapshot`]: HistoryWalker::snapshot
#[derive(Clone)]
pub struct HistoryWalker {
    shared: Arc<Shared>,
}

impl HistoryWalker {
    /// `selection` is the tracked `[start, end)` line range within `text`,
    /// the live contents of the file. `encoding` is the file's declared
    /// encoding, used to decode every revision's content bytes.
    pub fn new(
        text: &str,
        selection: Range<u32>,
        encoding: &'static Encoding,
        listener: Arc<dyn WalkListener>,
    ) -> HistoryWalker {
        let shared = Shared {
            state: Mutex::new(State {
                loading: true,
                revisions: Vec::new(),
                blocks: vec![Block::new(text, selection)],
                error: None,
                current_revision: None,
            }),
            listener,
            local: Arc::new(LocalRevision::new(text)),
            encoding,
            gate: GateCounter::new(),
            started: AtomicBool::new(false),
        };
        HistoryWalker {
            shared: Arc::new(shared),
        }
    }

    /// The synthetic revision record standing in for the live text; always
    /// index 0 of the collected history.
    pub fn local_revision(&self) -> Arc<dyn Revision> {
        Arc::clone(&self.shared.local)
    }

    /// Gate raised for the lifetime of the background walk. Wait on it to
    /// block until the walk has finished, failed or been cancelled.
    pub fn gate(&self) -> GateCounter {
        self.shared.gate.clone()
    }

    /// Consistent copy of the walk's progress.
    ///
    /// Holds the state lock only for the duration of the copy and never
    /// blocks on I/O. Callable from any thread, including from
    /// [`WalkListener`] hooks.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.lock();
        Snapshot {
            loading: state.loading,
            revisions: state.revisions.clone(),
            blocks: state.blocks.clone(),
            error: state.error.clone(),
            current_revision: state.current_revision.clone(),
        }
    }

    /// Start the background walk.
    ///
    /// Fires one `on_update(true)` for the synchronously computed local
    /// block, then hands the rest of the history to a worker thread which
    /// steps it under `cancel`. The caller is never blocked.
    ///
    /// # Panics
    ///
    /// Panics if called a second time for this walker, clones included.
    pub fn start(&self, source: impl HistorySource + 'static, cancel: CancelToken) {
        assert!(
            !self.shared.started.swap(true, Ordering::AcqRel),
            "history walker already started"
        );

        self.shared.listener.on_update(true);

        self.shared.gate.raise();
        let shared = Arc::clone(&self.shared);
        let mut source = source;
        thread::spawn(move || {
            shared.run(&mut source, &cancel);
            shared.gate.lower();
        });
    }
}

impl Shared {
    fn run(&self, source: &mut dyn HistorySource, cancel: &CancelToken) {
        let error = self.walk(source, cancel).err();

        {
            let mut state = self.state.lock();
            state.loading = false;
            state.current_revision = None;
            state.error = error.clone();
        }
        if let Some(error) = &error {
            log::warn!("history walk failed: {error}");
            self.listener.on_error(error);
        }
        self.listener.on_update(true);
    }

    fn walk(&self, source: &mut dyn HistorySource, cancel: &CancelToken) -> Result<(), WalkError> {
        let history = source
            .collect()
            .map_err(|error| WalkError::History(Arc::new(error)))?;

        let total = {
            let mut state = self.state.lock();
            state.revisions.push(Arc::clone(&self.local));
            state.revisions.extend(history);
            state.revisions.len()
        };
        self.listener.on_update(true);

        // blocks[0] was computed at construction time from the live text.
        for index in 1..total {
            if cancel.is_cancelled() {
                log::debug!(
                    "history walk cancelled after {} of {} revisions",
                    index - 1,
                    total - 1
                );
                return Ok(());
            }

            let (previous, revision) = {
                let mut state = self.state.lock();
                let previous = state.blocks[index - 1].clone();
                let revision = Arc::clone(&state.revisions[index]);
                state.current_revision = Some(Arc::clone(&revision));
                (previous, revision)
            };
            self.listener.on_update(false);

            let block = self.step(&previous, &revision)?;

            self.state.lock().blocks.push(block);
            self.listener.on_update(false);
        }
        Ok(())
    }

    /// Project `previous` into `revision`'s content. Once the tracked range
    /// has vanished the empty block is carried over without loading or
    /// diffing anything.
    fn step(&self, previous: &Block, revision: &Arc<dyn Revision>) -> Result<Block, WalkError> {
        let Some(previous) = previous.as_lines() else {
            return Ok(Block::Empty);
        };

        let bytes = revision
            .load_content()
            .map_err(|error| WalkError::Content {
                revision: revision.id().into_owned(),
                cause: Arc::new(error),
            })?;
        let text = self.decode(&bytes, revision)?;
        Ok(previous.project(&text))
    }

    fn decode(&self, bytes: &[u8], revision: &Arc<dyn Revision>) -> Result<String, WalkError> {
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            return Err(WalkError::Content {
                revision: revision.id().into_owned(),
                cause: Arc::new(anyhow::anyhow!(
                    "content is not valid {}",
                    self.encoding.name()
                )),
            });
        }
        Ok(text.into_owned())
    }
}
