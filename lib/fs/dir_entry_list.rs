use std::ops::ControlFlow;

use rustc_hash::FxHashMap;

use super::{DirEntry, Ino, TimeSpec};
use crate::sync::{self, RwLock};

/// The guarded state of a [`DirEntryList`].
///
/// `entries` is an append-only arena: slots are only ever pushed or truncated all at once, so a
/// slot number handed out by `index` stays valid until the next `clear`.
#[derive(Debug, Default)]
struct Listing {
    mtime: TimeSpec,
    entries: Vec<DirEntry>,
    /// child inode -> slot in `entries`
    index: FxHashMap<Ino, usize>,
}

impl Listing {
    fn push(&mut self, entry: DirEntry) {
        debug_assert!(
            !self.index.contains_key(&entry.ino),
            "duplicate child inode {} added to a directory listing",
            entry.ino
        );
        self.index.insert(entry.ino, self.entries.len());
        self.entries.push(entry);
    }
}

/// The known children of one directory, as of one modification time.
///
/// Entries keep the order they were added in, which is the order the metadata service listed
/// them, so paginated `readdir` offsets stay stable. Lookups by child inode are O(1).
///
/// A list is built by the listing path and then published into a
/// [`DirCache`](super::DirCache). Once published it is shared behind an `Arc`: readers holding a
/// handle keep it alive even after the cache evicts it.
///
/// All methods take `&self`. Readers ([`len`](Self::len), [`get`](Self::get),
/// [`iterate`](Self::iterate)) share a read lock; [`add`](Self::add) and [`clear`](Self::clear)
/// take the write lock.
#[derive(Debug, Default)]
pub struct DirEntryList {
    listing: RwLock<Listing>,
}

impl DirEntryList {
    /// Creates an empty list with a zero mtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list for a directory last modified at `mtime`.
    #[must_use]
    pub fn with_mtime(mtime: TimeSpec) -> Self {
        Self {
            listing: RwLock::new(Listing {
                mtime,
                ..Listing::default()
            }),
        }
    }

    /// Creates a list from a complete listing batch.
    ///
    /// Child inodes in `entries` must be unique.
    pub fn from_entries(mtime: TimeSpec, entries: impl IntoIterator<Item = DirEntry>) -> Self {
        let entries = entries.into_iter();
        let mut listing = Listing {
            mtime,
            entries: Vec::with_capacity(entries.size_hint().0),
            index: FxHashMap::default(),
        };
        listing.index.reserve(listing.entries.capacity());
        for entry in entries {
            listing.push(entry);
        }
        Self {
            listing: RwLock::new(listing),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        sync::read(&self.listing).entries.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        sync::read(&self.listing).entries.is_empty()
    }

    /// Append `entry` to the listing.
    ///
    /// Only meant for populating a list that has not been published yet. Adding a child inode
    /// that is already present breaks the lookup index; debug builds assert on it.
    pub fn add(&self, entry: DirEntry) {
        sync::write(&self.listing).push(entry);
    }

    /// Calls `f` for every entry in listing order while holding the read lock.
    ///
    /// `f` must not call any method of this list, readers included. A nested read lock blocks
    /// behind a queued writer, so re-entering can deadlock. Collect what you need and look it up
    /// after `iterate` returns.
    pub fn iterate(&self, mut f: impl FnMut(&DirEntry)) {
        let listing = sync::read(&self.listing);
        for entry in &listing.entries {
            f(entry);
        }
    }

    /// Calls `f` with `(offset, entry)` for every entry starting at `offset`, until `f` breaks.
    ///
    /// Returns the offset to resume from: the offset of the entry `f` broke on, or
    /// `max(len, offset)` if it never broke, so an offset past the end comes back unchanged. This
    /// is the shape `readdir` wants when its reply buffer fills up midway.
    ///
    /// Like [`iterate`](Self::iterate), `f` must not call any method of this list.
    pub fn iterate_from(
        &self,
        offset: usize,
        mut f: impl FnMut(usize, &DirEntry) -> ControlFlow<()>,
    ) -> usize {
        let listing = sync::read(&self.listing);
        for (i, entry) in listing.entries.iter().enumerate().skip(offset) {
            if f(i, entry).is_break() {
                return i;
            }
        }
        listing.entries.len().max(offset)
    }

    /// Looks up a child by inode.
    #[must_use]
    pub fn get(&self, ino: Ino) -> Option<DirEntry> {
        self.get_with(ino, DirEntry::clone)
    }

    /// Looks up a child by inode and projects it through `f` under the read lock, avoiding a
    /// clone when only part of the entry is needed.
    pub fn get_with<R>(&self, ino: Ino, f: impl FnOnce(&DirEntry) -> R) -> Option<R> {
        let listing = sync::read(&self.listing);
        let slot = *listing.index.get(&ino)?;
        Some(f(&listing.entries[slot]))
    }

    /// Returns `true` if `ino` is a cached child.
    #[must_use]
    pub fn contains(&self, ino: Ino) -> bool {
        sync::read(&self.listing).index.contains_key(&ino)
    }

    /// Drops every entry. The mtime is kept.
    ///
    /// Used to invalidate a stale snapshot in place. Blocks until in-flight readers finish; they
    /// see an empty list on their next read.
    pub fn clear(&self) {
        let mut listing = sync::write(&self.listing);
        listing.entries.clear();
        listing.index.clear();
    }

    /// Records the directory's modification time this snapshot corresponds to.
    pub fn set_mtime(&self, mtime: TimeSpec) {
        sync::write(&self.listing).mtime = mtime;
    }

    /// The directory's modification time this snapshot corresponds to.
    #[must_use]
    pub fn mtime(&self) -> TimeSpec {
        sync::read(&self.listing).mtime
    }

    /// Returns `true` if this snapshot was taken at the directory's current `mtime`.
    #[must_use]
    pub fn is_fresh(&self, mtime: TimeSpec) -> bool {
        self.mtime() == mtime
    }
}
