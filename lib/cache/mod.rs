/// LRU replacement index.
pub mod lru;
/// Bounded queue of values awaiting deferred teardown.
pub mod reclaim;
