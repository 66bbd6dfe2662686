//! Synchronization primitives.
//!
//! Shims between loom and std synchronization primitives. Every lock, atomic, and shared handle
//! that takes part in the cache's concurrency goes through here so the two-level locking can be
//! model-checked. Immutable payloads, such as entry names, use `std::sync::Arc` directly.
pub mod atomic;

#[cfg(loom)]
pub use loom::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(loom))]
pub use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate is a single map or counter update, so a poisoned lock
/// never guards torn state.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Shared-lock `rwlock`, recovering from poisoning.
pub fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Exclusive-lock `rwlock`, recovering from poisoning.
pub fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
