use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Secondary index from a key to the set of object ids carrying it.
///
/// Keys whose id set becomes empty are dropped, so the index never grows
/// with keys that no longer match any object.
#[derive(Debug, Clone)]
pub struct Index<K> {
    buckets: HashMap<K, HashSet<i64>>,
}

impl<K> Default for Index<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Index<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, id: i64) {
        self.buckets.entry(key).or_default().insert(id);
    }

    pub fn remove<Q>(&mut self, key: &Q, id: i64)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(ids) = self.buckets.get_mut(key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    /// Ids stored under `key`, ascending.
    pub fn get<Q>(&self, key: &Q) -> Vec<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut ids: Vec<i64> = self
            .buckets
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Smallest id stored under `key`.
    pub fn first<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.get(key)?.iter().copied().min()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
