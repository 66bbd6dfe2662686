//! dircache shared library.
//!
//! An in-memory cache of directory listings for a distributed filesystem client. Listings are
//! kept per parent directory in a [`fs::DirEntryList`] and managed by a [`fs::DirCache`], an LRU
//! bounded by the total number of cached child entries.

/// Caching primitives for dircache.
pub mod cache;
/// Configuration options.
pub mod config;
/// Directory listings and the cache that holds them.
pub mod fs;
/// Synchronization shims.
pub mod sync;
