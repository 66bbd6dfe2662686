//! Synthetic concurrent workload against a [`DirCache`].
//!
//! Every worker thread walks the same set of directories with a different phase, so the threads
//! contend on hot directories while the total working set exceeds the cache capacity. Each step
//! is one of the three things a filesystem client does with the cache: serve a `readdir` or
//! `lookup` from a hit, populate on a miss, or invalidate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dircache::cache::reclaim::ReclaimError;
use dircache::config::DirCacheOption;
use dircache::fs::{
    DirCache, DirCacheStatsSnapshot, DirEntry, DirEntryList, FileType, InodeAttr, Ino, TimeSpec,
};
use thiserror::Error;
use tracing::{debug, info, info_span};

/// Invalidate in place every this many hits.
const CLEAR_EVERY: u64 = 17;
/// Drop the listing every this many hits.
const REMOVE_EVERY: u64 = 31;

#[derive(Debug, Error)]
pub enum SoakError {
    #[error("failed to start the directory cache: {0}")]
    Reclaim(#[from] ReclaimError),

    #[error("cache holds {nentries} entries in {dirs} directories, over its capacity of {capacity}")]
    CapacityExceeded {
        nentries: usize,
        dirs: usize,
        capacity: usize,
    },

    #[error("a worker thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, Copy)]
pub struct SoakParams {
    pub threads: usize,
    pub dirs: u64,
    pub entries: u64,
    pub rounds: u64,
}

#[derive(Debug)]
pub struct SoakReport {
    pub stats: DirCacheStatsSnapshot,
    pub nentries: usize,
    pub cached_dirs: usize,
    pub capacity: usize,
    pub elapsed: Duration,
}

fn attr(ino: Ino, mtime: TimeSpec) -> InodeAttr {
    InodeAttr {
        file_type: if ino % 5 == 0 {
            FileType::Directory
        } else {
            FileType::File
        },
        mode: 0o644,
        uid: 0,
        gid: 0,
        length: ino % 4096,
        nlink: 1,
        mtime,
        ctime: mtime,
    }
}

/// What the metadata service would return for `parent`.
fn list_directory(parent: Ino, entries: u64, mtime: TimeSpec) -> DirEntryList {
    DirEntryList::from_entries(
        mtime,
        (0..entries).map(|i| {
            let ino = parent * 1_000_000 + i;
            DirEntry::new(ino, format!("entry-{i}"), attr(ino, mtime))
        }),
    )
}

fn worker(cache: &DirCache, params: SoakParams, thread: u64) {
    let mut hits = 0u64;
    let mut seen = 0usize;

    for round in 0..params.rounds {
        let mtime = TimeSpec::new(round, 0);
        for step in 0..params.dirs {
            let parent = (step + thread * 7 + round) % params.dirs + 1;

            let Some(list) = cache.get(parent) else {
                cache.put(
                    parent,
                    Arc::new(list_directory(parent, params.entries, mtime)),
                );
                continue;
            };

            hits += 1;
            list.iterate(|_| seen += 1);
            let probe = parent * 1_000_000 + step % params.entries.max(1);
            let _ = list.get_with(probe, DirEntry::is_dir);

            if hits % REMOVE_EVERY == 0 {
                cache.remove(parent);
            } else if hits % CLEAR_EVERY == 0 || !list.is_fresh(mtime) {
                // The directory moved on: invalidate in place, then republish a fresh listing.
                list.clear();
                cache.put(
                    parent,
                    Arc::new(list_directory(parent, params.entries, mtime)),
                );
            }
        }
    }

    debug!(thread, hits, seen, "soak worker finished");
}

/// Run the workload and check the cache's capacity invariant at the end.
pub fn run(option: &DirCacheOption, params: SoakParams) -> Result<SoakReport, SoakError> {
    let _span = info_span!("soak", threads = params.threads, dirs = params.dirs).entered();
    let cache = DirCache::new(option)?;
    let started = Instant::now();

    let panicked = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..params.threads)
            .map(|thread| {
                let cache = &cache;
                scope.spawn(move || worker(cache, params, thread as u64))
            })
            .collect();
        handles
            .into_iter()
            .map(std::thread::ScopedJoinHandle::join)
            .filter(Result::is_err)
            .count()
    });
    if panicked > 0 {
        return Err(SoakError::WorkerPanicked);
    }

    let report = SoakReport {
        stats: cache.stats().snapshot(),
        nentries: cache.nentries(),
        cached_dirs: cache.len(),
        capacity: cache.capacity(),
        elapsed: started.elapsed(),
    };
    cache.shutdown();

    if report.nentries > report.capacity && report.cached_dirs > 1 {
        return Err(SoakError::CapacityExceeded {
            nentries: report.nentries,
            dirs: report.cached_dirs,
            capacity: report.capacity,
        });
    }

    info!(
        elapsed_ms = report.elapsed.as_millis(),
        nentries = report.nentries,
        cached_dirs = report.cached_dirs,
        "soak finished"
    );
    Ok(report)
}
