//! Time-bounded memoization.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A map whose entries expire `ttl` after insertion.
///
/// Expired entries are dropped lazily on lookup. [`Self::invalidate`]
/// clears everything at once.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns a clone of the live value for `key`.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Like [`Self::get`], evaluated at `now`.
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let (value, inserted_at) = self.entries.get(key)?;
        if now.saturating_duration_since(*inserted_at) < self.ttl {
            return Some(value.clone());
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, (value, now));
    }

    /// Drops every entry.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, live or not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at("k", 1, t0);

        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at(("a", 1), "one", t0);
        cache.insert_at(("a", 2), "two", t0);

        assert_eq!(cache.get_at(&("a", 2), t0), Some("two"));
        assert_eq!(cache.get_at(&("b", 1), t0), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn project_and_directory_key_downloads() {
        use std::path::PathBuf;

        use ecosystem_map_mergin::ProjectPath;

        let mut cache = TtlCache::new(Duration::from_secs(10));
        let project: ProjectPath = "MLA Workspace/MLA637".parse().unwrap();
        let t0 = Instant::now();
        cache.insert_at((project.clone(), PathBuf::from("./MLA637")), "v3", t0);

        assert_eq!(
            cache.get_at(&(project.clone(), PathBuf::from("./MLA637")), t0),
            Some("v3")
        );
        assert_eq!(cache.get_at(&(project, PathBuf::from("./other")), t0), None);
    }

    #[test]
    fn invalidate_clears_everything() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate();
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_refreshes_timestamp() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("k", 1, t0);
        cache.insert_at("k", 2, t0 + Duration::from_secs(8));
        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(15)), Some(2));
    }
}
