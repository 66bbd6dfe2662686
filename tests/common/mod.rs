#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dircache::cache::reclaim::{ReclaimStats, Reclaimer};
use dircache::config::{BackpressurePolicy, DirCacheOption, ReclaimOption};
use dircache::fs::{DirCache, DirEntry, DirEntryList, FileType, InodeAttr, Ino, TimeSpec};

/// Attributes for a synthetic child inode.
pub fn attr(ino: Ino) -> InodeAttr {
    InodeAttr {
        file_type: if ino % 2 == 0 {
            FileType::Directory
        } else {
            FileType::File
        },
        mode: 0o644,
        uid: 1000,
        gid: 1000,
        length: ino * 10,
        nlink: 1,
        mtime: TimeSpec::new(ino, 0),
        ctime: TimeSpec::new(ino, 0),
    }
}

/// A child entry named after its inode.
pub fn entry(ino: Ino) -> DirEntry {
    DirEntry::new(ino, format!("child-{ino}"), attr(ino))
}

/// A listing of `count` children of `parent`, with inodes `parent * 1000 + 0..count`.
pub fn listing(parent: Ino, count: u64) -> Arc<DirEntryList> {
    listing_at(parent, count, TimeSpec::ZERO)
}

/// Like [`listing`], stamped with `mtime`.
pub fn listing_at(parent: Ino, count: u64, mtime: TimeSpec) -> Arc<DirEntryList> {
    Arc::new(DirEntryList::from_entries(
        mtime,
        (0..count).map(|i| entry(parent * 1000 + i)),
    ))
}

/// Cache options with small, test-friendly reclaim settings.
pub fn option(capacity: usize) -> DirCacheOption {
    DirCacheOption {
        lru_size: capacity,
        reclaim: ReclaimOption {
            queue_capacity: 64,
            workers: 1,
            policy: BackpressurePolicy::Block,
        },
    }
}

pub fn cache(capacity: usize) -> DirCache {
    DirCache::new(&option(capacity)).unwrap()
}

/// Sum of the current sizes of every cached listing.
pub fn cached_size(cache: &DirCache) -> usize {
    cache
        .cached_dirs()
        .into_iter()
        .filter_map(|parent| cache.peek(parent))
        .map(|list| list.len())
        .sum()
}

/// How long [`wait_for_reclaim`] waits before declaring the reclaim workers stuck.
pub const RECLAIM_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll `pending()` until it reaches zero, or panic after [`RECLAIM_TIMEOUT`].
pub fn wait_for_reclaim(stats: &ReclaimStats) {
    let deadline = Instant::now() + RECLAIM_TIMEOUT;
    while stats.pending() != 0 {
        assert!(
            Instant::now() < deadline,
            "reclaim did not complete within {RECLAIM_TIMEOUT:?}, {} still pending",
            stats.pending()
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A reclaimer that records every item it receives.
#[derive(Clone, Default)]
pub struct RecordingReclaimer {
    pub reclaimed: Arc<Mutex<Vec<u64>>>,
}

impl RecordingReclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items reclaimed so far, in reclaim order.
    pub fn items(&self) -> Vec<u64> {
        self.reclaimed.lock().unwrap().clone()
    }
}

impl Reclaimer<u64> for RecordingReclaimer {
    fn reclaim(&mut self, item: u64) {
        self.reclaimed.lock().unwrap().push(item);
    }
}

/// Returns `true` on a reclaim worker thread.
pub fn on_reclaim_worker() -> bool {
    std::thread::current()
        .name()
        .is_some_and(|name| name.contains("-reclaim-"))
}

/// A reclaimer that parks reclaim workers until the gate opens, to fill the queue on demand.
/// Inline reclaims on the submitting thread pass straight through.
#[derive(Clone)]
pub struct GatedReclaimer {
    pub inner: RecordingReclaimer,
    pub gate: Arc<(Mutex<bool>, std::sync::Condvar)>,
}

impl GatedReclaimer {
    pub fn new() -> Self {
        Self {
            inner: RecordingReclaimer::new(),
            gate: Arc::new((Mutex::new(false), std::sync::Condvar::new())),
        }
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl Reclaimer<u64> for GatedReclaimer {
    fn reclaim(&mut self, item: u64) {
        if on_reclaim_worker() {
            let (lock, cvar) = &*self.gate;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }
        self.inner.reclaim(item);
    }
}
