use serde::Serialize;
use tracing::{debug, trace};

use super::{DirEntryList, Ino};
use crate::cache::lru::LruIndex;
use crate::cache::reclaim::{ReclaimError, ReclaimQueue, ReclaimStats, Reclaimer};
use crate::config::DirCacheOption;
use crate::sync::atomic::{AtomicU64, Ordering};
use crate::sync::{self, Arc, Mutex};

/// Counters describing cache traffic. All updates are `Relaxed`; read them through
/// [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct DirCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    replacements: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
    reclaimed_lists: AtomicU64,
    reclaimed_entries: AtomicU64,
}

/// A point-in-time copy of [`DirCacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirCacheStatsSnapshot {
    /// `get` calls that found a listing.
    pub hits: u64,
    /// `get` calls that found nothing.
    pub misses: u64,
    /// `put` calls.
    pub inserts: u64,
    /// `put` calls that replaced an existing listing.
    pub replacements: u64,
    /// Listings evicted to stay within capacity.
    pub evictions: u64,
    /// Listings removed by invalidation.
    pub removals: u64,
    /// Listings released by the reclaim path.
    pub reclaimed_lists: u64,
    /// Entries held by those listings when they were released.
    pub reclaimed_entries: u64,
}

impl DirCacheStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            reclaimed_lists: AtomicU64::new(0),
            reclaimed_entries: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// Copy out the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> DirCacheStatsSnapshot {
        DirCacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            reclaimed_lists: self.reclaimed_lists.load(Ordering::Relaxed),
            reclaimed_entries: self.reclaimed_entries.load(Ordering::Relaxed),
        }
    }
}

/// Releases the cache's reference to an evicted, replaced, or removed listing.
///
/// Readers that still hold a handle keep the listing alive; it is freed when the last of them
/// lets go.
#[derive(Debug, Clone)]
struct ListReclaimer {
    stats: Arc<DirCacheStats>,
}

impl Reclaimer<Arc<DirEntryList>> for ListReclaimer {
    fn reclaim(&mut self, list: Arc<DirEntryList>) {
        let entries = list.len();
        let shared = Arc::strong_count(&list) > 1;
        drop(list);

        DirCacheStats::bump(&self.stats.reclaimed_lists, 1);
        DirCacheStats::bump(&self.stats.reclaimed_entries, entries as u64);
        trace!(entries, shared, "reclaimed directory listing");
    }
}

/// A published listing plus the number of entries it was charged against the budget.
///
/// The charge is fixed at `put` time. A listing cleared in place keeps its charge until it leaves
/// the cache, which keeps `nentries` an exact sum of charges without the cache ever taking a list
/// lock.
#[derive(Debug)]
struct CachedDir {
    list: Arc<DirEntryList>,
    charge: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    lru: LruIndex<Ino, CachedDir>,
    /// Sum of `charge` over every entry in `lru`.
    nentries: usize,
}

impl CacheState {
    /// Pop least recently used listings into `victims` until `nentries <= target`, leaving at
    /// least `keep` listings in place. Returns how many were popped.
    fn evict_to(
        &mut self,
        target: usize,
        keep: usize,
        victims: &mut Vec<Arc<DirEntryList>>,
    ) -> usize {
        let mut evicted = 0;
        while self.nentries > target && self.lru.len() > keep {
            let Some((parent, cached)) = self.lru.pop_lru() else {
                break;
            };
            self.nentries -= cached.charge;
            trace!(parent, entries = cached.charge, "evicting directory listing");
            victims.push(cached.list);
            evicted += 1;
        }
        evicted
    }
}

/// LRU cache of directory listings, bounded by the total number of cached child entries.
///
/// # Locking
///
/// The cache lock guards only the LRU index and the entry count. It is never held while a
/// listing's own lock is taken: sizes are read before the cache lock is acquired, and listings
/// leaving the cache are handed to the reclaim queue after it is released. The two lock levels
/// therefore never nest.
///
/// # Reclamation
///
/// Listings that leave the cache (replaced, evicted, or removed) are not dropped under the cache
/// lock. They go to a bounded [`ReclaimQueue`] drained by background threads; see
/// [`BackpressurePolicy`](crate::config::BackpressurePolicy) for what happens when it is full.
/// Dropping the cache drains that queue before returning.
#[derive(Debug)]
pub struct DirCache {
    state: Mutex<CacheState>,
    capacity: usize,
    stats: Arc<DirCacheStats>,
    reclaim: ReclaimQueue<Arc<DirEntryList>, ListReclaimer>,
}

impl DirCache {
    /// Creates an empty cache and starts its reclaim workers.
    pub fn new(option: &DirCacheOption) -> Result<Self, ReclaimError> {
        let stats = Arc::new(DirCacheStats::new());
        let reclaimer = ListReclaimer {
            stats: Arc::clone(&stats),
        };
        let reclaim = ReclaimQueue::spawn("dircache", reclaimer, &option.reclaim)?;

        debug!(capacity = option.lru_size, "directory cache created");
        Ok(Self {
            state: Mutex::new(CacheState::default()),
            capacity: option.lru_size,
            stats,
            reclaim,
        })
    }

    /// Publishes `list` as the listing of `parent`, replacing any previous one, and makes
    /// `parent` the most recently used directory.
    ///
    /// Evicts least recently used directories until the cached entry count is back within
    /// capacity. A single listing larger than the whole capacity is still cached; it just ends up
    /// alone.
    ///
    /// May block if the reclaim queue is full and configured to block.
    pub fn put(&self, parent: Ino, list: Arc<DirEntryList>) {
        let charge = list.len();
        let mut victims = Vec::new();

        {
            let mut state = sync::lock(&self.state);
            if let Some(old) = state.lru.insert(parent, CachedDir { list, charge }) {
                state.nentries -= old.charge;
                DirCacheStats::bump(&self.stats.replacements, 1);
                victims.push(old.list);
            }
            state.nentries += charge;
            DirCacheStats::bump(&self.stats.inserts, 1);

            // `parent` is the most recently used key, so keeping one listing keeps it.
            let evicted = state.evict_to(self.capacity, 1, &mut victims);
            DirCacheStats::bump(&self.stats.evictions, evicted as u64);
            trace!(
                parent,
                charge,
                nentries = state.nentries,
                evicted,
                "put directory listing"
            );
        }

        self.reclaim_all(victims);
    }

    /// Returns the cached listing of `parent`, promoting it to most recently used.
    ///
    /// The handle stays valid after the cache lock is released, even if the listing is evicted
    /// in the meantime. A miss does not fetch anything.
    #[must_use]
    pub fn get(&self, parent: Ino) -> Option<Arc<DirEntryList>> {
        let hit = sync::lock(&self.state)
            .lru
            .get(&parent)
            .map(|cached| Arc::clone(&cached.list));

        if hit.is_some() {
            DirCacheStats::bump(&self.stats.hits, 1);
        } else {
            DirCacheStats::bump(&self.stats.misses, 1);
        }
        trace!(parent, hit = hit.is_some(), "get directory listing");
        hit
    }

    /// Like [`get`](Self::get), but leaves recency and hit counters alone.
    #[must_use]
    pub fn peek(&self, parent: Ino) -> Option<Arc<DirEntryList>> {
        sync::lock(&self.state)
            .lru
            .peek(&parent)
            .map(|cached| Arc::clone(&cached.list))
    }

    /// Forgets the listing of `parent`, if any.
    ///
    /// Used when the directory is invalidated externally (rename, unlink, coherence callback).
    /// Returns `true` if a listing was removed.
    pub fn remove(&self, parent: Ino) -> bool {
        let removed = {
            let mut state = sync::lock(&self.state);
            let removed = state.lru.remove(&parent);
            if let Some(cached) = &removed {
                state.nentries -= cached.charge;
            }
            removed
        };

        let Some(cached) = removed else {
            return false;
        };
        DirCacheStats::bump(&self.stats.removals, 1);
        trace!(parent, entries = cached.charge, "removed directory listing");
        self.reclaim.submit(cached.list);
        true
    }

    /// Evicts least recently used listings until at most `target` entries remain cached.
    ///
    /// Unlike the eviction done by [`put`](Self::put), this may empty the cache. Returns the
    /// number of listings evicted.
    pub fn shrink_to(&self, target: usize) -> usize {
        let mut victims = Vec::new();
        let evicted = sync::lock(&self.state).evict_to(target, 0, &mut victims);
        DirCacheStats::bump(&self.stats.evictions, evicted as u64);
        if evicted > 0 {
            debug!(target, evicted, "shrunk directory cache");
        }
        self.reclaim_all(victims);
        evicted
    }

    /// Forgets every cached listing. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let victims: Vec<_> = {
            let mut state = sync::lock(&self.state);
            state.nentries = 0;
            state.lru.drain().map(|(_, cached)| cached.list).collect()
        };
        let removed = victims.len();
        DirCacheStats::bump(&self.stats.removals, removed as u64);
        self.reclaim_all(victims);
        removed
    }

    fn reclaim_all(&self, victims: Vec<Arc<DirEntryList>>) {
        for list in victims {
            self.reclaim.submit(list);
        }
    }

    /// Returns `true` if `parent` has a cached listing. Does not touch recency.
    #[must_use]
    pub fn contains(&self, parent: Ino) -> bool {
        sync::lock(&self.state).lru.contains_key(&parent)
    }

    /// Number of cached directories.
    #[must_use]
    pub fn len(&self) -> usize {
        sync::lock(&self.state).lru.len()
    }

    /// Returns `true` if no directory is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        sync::lock(&self.state).lru.is_empty()
    }

    /// Total number of child entries charged against the capacity.
    #[must_use]
    pub fn nentries(&self) -> usize {
        sync::lock(&self.state).nentries
    }

    /// The configured maximum for [`nentries`](Self::nentries).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached directories from least to most recently used.
    #[must_use]
    pub fn cached_dirs(&self) -> Vec<Ino> {
        sync::lock(&self.state)
            .lru
            .keys_lru_order()
            .copied()
            .collect()
    }

    /// Cache traffic counters.
    #[must_use]
    pub fn stats(&self) -> &DirCacheStats {
        &self.stats
    }

    /// Reclaim queue traffic counters.
    #[must_use]
    pub fn reclaim_stats(&self) -> &ReclaimStats {
        self.reclaim.stats()
    }

    /// Releases every cached listing and waits for the reclaim workers to finish.
    pub fn shutdown(self) {
        let Self { state, reclaim, .. } = self;
        let remaining = sync::lock(&state).lru.len();
        drop(state);
        reclaim.shutdown();
        debug!(remaining, "directory cache shut down");
    }
}
