//! Directory metadata as the cache sees it.
/// LRU cache of directory listings under a global entry budget.
pub mod dir_cache;
/// One directory's children, in listing order, with O(1) lookup by inode.
pub mod dir_entry_list;

pub use dir_cache::{DirCache, DirCacheStats, DirCacheStatsSnapshot};
pub use dir_entry_list::DirEntryList;

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Type representing an inode identifier. Used both as a cache key (the parent directory) and as
/// a child key within a listing.
pub type Ino = u64;

/// A modification timestamp with nanosecond resolution, as reported by the metadata service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSpec {
    /// Whole seconds since the Unix epoch.
    pub seconds: u64,
    /// Nanoseconds past `seconds`. Always below one billion.
    pub nanoseconds: u32,
}

impl TimeSpec {
    /// The Unix epoch.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Creates a timestamp. `nanoseconds` overflowing one second carries into `seconds`.
    #[must_use]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds: seconds + u64::from(nanoseconds / 1_000_000_000),
            nanoseconds: nanoseconds % 1_000_000_000,
        }
    }
}

impl From<SystemTime> for TimeSpec {
    fn from(time: SystemTime) -> Self {
        // Pre-epoch times do not occur on the metadata service; clamp instead of failing.
        let since_epoch = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self {
            seconds: since_epoch.as_secs(),
            nanoseconds: since_epoch.subsec_nanos(),
        }
    }
}

impl From<TimeSpec> for SystemTime {
    fn from(time: TimeSpec) -> Self {
        SystemTime::UNIX_EPOCH + Duration::new(time.seconds, time.nanoseconds)
    }
}

/// The type of an inode entry in the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FileType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
}

/// Attributes of a child inode, as returned by the metadata service alongside its name.
///
/// Opaque to the cache: it stores and returns them, never inspects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeAttr {
    /// The type of this inode.
    pub file_type: FileType,
    /// Unix permission bits.
    pub mode: u32,
    /// The user ID of the owner of this inode.
    pub uid: u32,
    /// The group ID of the owner of this inode.
    pub gid: u32,
    /// Size in bytes.
    pub length: u64,
    /// Number of hard links.
    pub nlink: u32,
    /// Last data modification.
    pub mtime: TimeSpec,
    /// Last status change.
    pub ctime: TimeSpec,
}

/// One child of a cached directory.
///
/// Immutable once built. A stale entry is never patched: the listing holding it is cleared or
/// replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode of the child.
    pub ino: Ino,
    /// The name of this entry within its parent directory, shared between clones.
    pub name: Arc<OsStr>,
    /// The child's attributes.
    pub attr: InodeAttr,
}

impl DirEntry {
    /// Creates an entry for child `ino` named `name`.
    pub fn new(ino: Ino, name: impl AsRef<OsStr>, attr: InodeAttr) -> Self {
        Self {
            ino,
            name: Arc::from(name.as_ref()),
            attr,
        }
    }

    /// Returns `true` if the child is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.attr.file_type == FileType::Directory
    }
}
