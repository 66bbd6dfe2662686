//! Deferred reclamation of values the cache no longer wants.
//!
//! Deciding what to evict is cheap and happens under the cache lock. Tearing the evicted value
//! down may not be: a directory listing can hold an arbitrary number of entries. A
//! [`ReclaimQueue`] takes ownership of those values and hands them to a pool of background
//! threads, so the teardown runs outside of any cache critical section.
//!
//! The queue is bounded. What happens when it is full is decided once, at construction time, by
//! [`BackpressurePolicy`]:
//!
//! - [`BackpressurePolicy::Block`] parks the producer until a worker frees a slot.
//! - [`BackpressurePolicy::Inline`] reclaims the value on the producer's thread.
//!
//! Either way the value is reclaimed exactly once.

use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, SendError, Sender, TrySendError, bounded};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{BackpressurePolicy, ReclaimOption};
use crate::sync::Arc;
use crate::sync::atomic::{AtomicU64, Ordering};

/// Tears down values handed over by a [`ReclaimQueue`].
///
/// Every worker thread owns its own clone. The queue also clones one on demand to reclaim inline,
/// so clones must be cheap and must share whatever state they report into.
pub trait Reclaimer<T>: Send + Clone + 'static {
    /// Take ownership of `item` and dispose of it.
    fn reclaim(&mut self, item: T);
}

/// Errors raised while setting up a [`ReclaimQueue`].
#[derive(Debug, Error)]
pub enum ReclaimError {
    /// The operating system refused to start a worker thread.
    #[error("failed to spawn reclaim worker {index}: {source}")]
    Spawn {
        /// Index of the worker that failed to start.
        index: usize,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },
}

/// Counters describing the traffic through a [`ReclaimQueue`].
#[derive(Debug)]
pub struct ReclaimStats {
    submitted: AtomicU64,
    reclaimed: AtomicU64,
    inline: AtomicU64,
    blocked: AtomicU64,
}

impl ReclaimStats {
    fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            inline: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
        }
    }

    /// Values handed to [`ReclaimQueue::submit`].
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Values reclaimed by the background workers.
    #[must_use]
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Values reclaimed on the submitting thread, either by policy or because the workers were
    /// already gone.
    #[must_use]
    pub fn inline(&self) -> u64 {
        self.inline.load(Ordering::Relaxed)
    }

    /// Submissions that found the queue full and had to wait for a slot.
    #[must_use]
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Values submitted but not yet reclaimed.
    #[must_use]
    pub fn pending(&self) -> u64 {
        // Completions are read first: racing submissions can only inflate the result.
        let done = self.reclaimed() + self.inline();
        self.submitted().saturating_sub(done)
    }
}

/// A bounded FIFO of values awaiting reclamation, drained by background worker threads.
///
/// Dropping the queue (or calling [`shutdown`](Self::shutdown)) closes it, waits for the workers
/// to drain everything already queued, and joins them.
pub struct ReclaimQueue<T, R> {
    sender: Option<Sender<T>>,
    workers: Vec<JoinHandle<()>>,
    reclaimer: R,
    policy: BackpressurePolicy,
    capacity: usize,
    stats: Arc<ReclaimStats>,
}

impl<T, R> std::fmt::Debug for ReclaimQueue<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("workers", &self.workers.len())
            .field("policy", &self.policy)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static, R: Reclaimer<T>> ReclaimQueue<T, R> {
    /// Start `option.workers` threads named `{name}-reclaim-{index}`, each draining a shared queue
    /// of `option.queue_capacity` slots into a clone of `reclaimer`.
    pub fn spawn(name: &str, reclaimer: R, option: &ReclaimOption) -> Result<Self, ReclaimError> {
        let (sender, receiver) = bounded(option.queue_capacity);
        let stats = Arc::new(ReclaimStats::new());

        let mut workers = Vec::with_capacity(option.workers);
        for index in 0..option.workers {
            let receiver = receiver.clone();
            let reclaimer = reclaimer.clone();
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-reclaim-{index}"))
                .spawn(move || worker_loop(&receiver, reclaimer, &stats))
                .map_err(|source| ReclaimError::Spawn { index, source })?;
            workers.push(handle);
        }

        debug!(
            name,
            workers = workers.len(),
            capacity = option.queue_capacity,
            policy = ?option.policy,
            "reclaim queue started"
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            reclaimer,
            policy: option.policy,
            capacity: option.queue_capacity,
            stats,
        })
    }

    /// Hand `item` over for reclamation.
    ///
    /// Never drops `item` on the floor: if it cannot be queued, it is reclaimed on this thread.
    pub fn submit(&self, item: T) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let Some(sender) = &self.sender else {
            self.reclaim_inline(item);
            return;
        };

        match sender.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => match self.policy {
                BackpressurePolicy::Block => {
                    self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        capacity = self.capacity,
                        "reclaim queue full, blocking producer"
                    );
                    if let Err(SendError(item)) = sender.send(item) {
                        self.reclaim_inline(item);
                    }
                }
                BackpressurePolicy::Inline => {
                    trace!(
                        capacity = self.capacity,
                        "reclaim queue full, reclaiming inline"
                    );
                    self.reclaim_inline(item);
                }
            },
            Err(TrySendError::Disconnected(item)) => self.reclaim_inline(item),
        }
    }

    fn reclaim_inline(&self, item: T) {
        self.reclaimer.clone().reclaim(item);
        self.stats.inline.fetch_add(1, Ordering::Relaxed);
    }

    /// Traffic counters for this queue.
    #[must_use]
    pub fn stats(&self) -> &ReclaimStats {
        &self.stats
    }

    /// Number of values currently sitting in the queue.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// The configured policy for a full queue.
    #[must_use]
    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Close the queue, drain it, and join the workers.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl<T, R> Drop for ReclaimQueue<T, R> {
    fn drop(&mut self) {
        // Dropping the only sender disconnects the channel. Workers still receive everything that
        // was queued before they observe the disconnect.
        drop(self.sender.take());
        for (index, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.join() {
                warn!(worker = index, error = ?e, "reclaim worker panicked during shutdown");
            }
        }
    }
}

/// Worker thread loop.
fn worker_loop<T, R: Reclaimer<T>>(receiver: &Receiver<T>, mut reclaimer: R, stats: &ReclaimStats) {
    while let Ok(item) = receiver.recv() {
        if let Err(e) = std::panic::catch_unwind(AssertUnwindSafe(|| reclaimer.reclaim(item))) {
            warn!(error = ?e, "reclaimer panicked");
        }
        stats.reclaimed.fetch_add(1, Ordering::Relaxed);
    }
    trace!("reclaim worker exiting");
}
