//! Implements the LRU replacement policy.

use std::hash::Hash;

use hashlink::LinkedHashMap;

/// An LRU-ordered map. Tracks the least recently used keys so the owner can cull them when it
/// runs over budget.
///
/// The index is not synchronized. Owners that share it across threads wrap it in their own lock,
/// which is also what keeps the recency order a strict total order: every touch happens under
/// that lock.
#[derive(Debug)]
pub struct LruIndex<K, V> {
    /// The ordered set of keys, front is least recently used, back is most recently used.
    ordered_key_map: LinkedHashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for LruIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> LruIndex<K, V> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered_key_map: LinkedHashMap::new(),
        }
    }

    /// Insert or overwrite `key`, making it the most recently used.
    ///
    /// Returns the value previously stored under `key`, if any. The caller owns it from here on.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        // `LinkedHashMap::insert` moves an existing key to the back as well, so a replacement is
        // also a touch.
        self.ordered_key_map.insert(key, value)
    }

    /// Look up `key` and, on a hit, promote it to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.ordered_key_map.to_back(key).map(|v| &*v)
    }

    /// Look up `key` without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.ordered_key_map.get(key)
    }

    /// Returns `true` if `key` is present. Does not touch recency.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.ordered_key_map.contains_key(key)
    }

    /// Remove `key`, handing its value back to the caller.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.ordered_key_map.remove(key)
    }

    /// Remove the least recently used mapping.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        self.ordered_key_map.pop_front()
    }

    /// Peek at the least recently used mapping without removing it.
    #[must_use]
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        self.ordered_key_map.front()
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered_key_map.len()
    }

    /// Returns `true` if there are no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered_key_map.is_empty()
    }

    /// Keys from least to most recently used.
    pub fn keys_lru_order(&self) -> impl Iterator<Item = &K> {
        self.ordered_key_map.keys()
    }

    /// Drain every mapping, least recently used first.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        std::iter::from_fn(|| self.ordered_key_map.pop_front())
    }
}
