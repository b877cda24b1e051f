use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// A key→set(value) multimap, used for the points-to graph's `variables` root relation and for
/// def-site tracking in reaching-definitions/web analysis ("supporting utilities").
#[derive(Debug, Clone)]
pub struct Multimap<K, V> {
    entries: FxHashMap<K, FxHashSet<V>>,
}

impl<K, V> Default for Multimap<K, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<K, V> Multimap<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.entries.entry(key).or_default().insert(value)
    }

    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(set) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = set.remove(value);
        if set.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Removes every `(key, *)` entry, returning the values that were present.
    pub fn remove_key(&mut self, key: &K) -> FxHashSet<V> {
        self.entries.remove(key).unwrap_or_default()
    }

    pub fn get(&self, key: &K) -> Option<&FxHashSet<V>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.entries.get(key).is_some_and(|set| set.contains(value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &FxHashSet<V>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remove_prunes_empty_keys() {
        let mut map: Multimap<&str, i32> = Multimap::new();
        map.insert("a", 1);
        map.remove(&"a", &1);
        assert!(map.get(&"a").is_none());
        assert_eq!(map.keys().count(), 0);
    }
}
