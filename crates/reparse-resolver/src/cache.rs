//! The resolved-path cache: a sharded concurrent map so resolving one hot
//! path does not serialize behind an unrelated one (section 5's "per-bucket
//! reader/writer locks").

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::chain::ResolvedChain;

/// `(normalized source path, preserve-last-reparse-point)`, folded to a
/// stable hash key so the cache never stores a borrowed `CanonicalPath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    preserve_last_reparse_point: bool,
}

impl CacheKey {
    pub fn new(path_upper: &str, preserve_last_reparse_point: bool) -> Self {
        Self {
            path: path_upper.to_ascii_uppercase(),
            preserve_last_reparse_point,
        }
    }
}

const DEFAULT_SHARDS: usize = 16;

pub struct ResolvedPathCache {
    shards: Vec<RwLock<HashMap<CacheKey, ResolvedChain>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for ResolvedPathCache {
    fn default() -> Self {
        Self::with_shard_count(DEFAULT_SHARDS)
    }
}

impl ResolvedPathCache {
    pub fn with_shard_count(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(HashMap::new())).collect(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &RwLock<HashMap<CacheKey, ResolvedChain>> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolvedChain> {
        let shard = self.shard_for(key);
        let found = shard.read().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: CacheKey, chain: ResolvedChain) {
        let shard = self.shard_for(&key);
        shard.write().insert(key, chain);
    }

    /// Invalidates every cache entry whose source path is exactly `path`.
    /// Called on observed writes that could turn a path into a reparse
    /// point, and on any rename/delete touching it.
    pub fn invalidate(&self, path_upper: &str) {
        let upper = path_upper.to_ascii_uppercase();
        for shard in &self.shards {
            shard.write().retain(|k, _| k.path != upper);
        }
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{HopClassification, ResolvedHop};
    use sandbox_core::CanonicalPath;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = ResolvedPathCache::default();
        let key = CacheKey::new(r"C:\a\link", false);
        let chain = ResolvedChain {
            is_reparse_point: true,
            hops: vec![ResolvedHop {
                path: CanonicalPath::parse(&r"C:\final".encode_utf16().collect::<Vec<_>>()),
                classification: HopClassification::FullyResolved,
            }],
        };
        cache.insert(key.clone(), chain.clone());
        let found = cache.get(&key).unwrap();
        assert_eq!(found.hops.len(), chain.hops.len());
    }

    #[test]
    fn invalidate_removes_exact_path_only() {
        let cache = ResolvedPathCache::default();
        let key_a = CacheKey::new(r"C:\a\link", false);
        let key_b = CacheKey::new(r"C:\b\link", false);
        let chain = ResolvedChain {
            is_reparse_point: false,
            hops: vec![],
        };
        cache.insert(key_a.clone(), chain.clone());
        cache.insert(key_b.clone(), chain);
        cache.invalidate(r"C:\a\link");
        assert!(cache.get(&key_a).is_none());
        assert!(cache.get(&key_b).is_some());
    }
}
