//! Insertion-ordered persistent collections
//!
//! `PList`/`PSet`/`PMap` back `Value::List`/`Value::Set`/`Value::Map` and
//! the object graph's member tables. They are
//! persistent in the structural sense: equality independent of how they
//! were built, insertion order preserved on iteration, and cheap to clone
//! for the amend-chain's copy-on-write semantics. Cloning is O(1) (an `Arc`
//! bump); the first mutation through a clone pays one O(n) copy via
//! `Arc::make_mut`.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

/// An insertion-ordered, clone-cheap, equality-by-contents list.
#[derive(Clone)]
pub struct PList<T>(Arc<Vec<T>>);

impl<T> PList<T> {
    pub fn new() -> Self {
        PList(Arc::new(Vec::new()))
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        PList(Arc::new(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }
}

impl<T: Clone> PList<T> {
    /// Returns a new list with `item` appended; does not mutate `self`.
    pub fn pushed(&self, item: T) -> Self {
        let mut next = (*self.0).clone();
        next.push(item);
        PList(Arc::new(next))
    }
}

impl<T: PartialEq> PartialEq for PList<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}
impl<T: Eq> Eq for PList<T> {}

impl<T: Hash> Hash for PList<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for item in self.0.iter() {
            item.hash(state);
        }
    }
}

impl<T> Default for PList<T> {
    fn default() -> Self {
        PList::new()
    }
}

impl<T> FromIterator<T> for PList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PList(Arc::new(iter.into_iter().collect()))
    }
}

impl<'a, T> IntoIterator for &'a PList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An insertion-ordered, clone-cheap set. Equality and hashing are by
/// contents, independent of insertion order; iteration follows insertion
/// order.
#[derive(Clone)]
pub struct PSet<T: Hash + Eq>(Arc<IndexSet<T>>);

impl<T: Hash + Eq> PSet<T> {
    pub fn new() -> Self {
        PSet(Arc::new(IndexSet::new()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }

    pub fn iter(&self) -> indexmap::set::Iter<'_, T> {
        self.0.iter()
    }
}

impl<T: Hash + Eq + Clone> PSet<T> {
    pub fn inserted(&self, item: T) -> Self {
        let mut next = (*self.0).clone();
        next.insert(item);
        PSet(Arc::new(next))
    }
}

impl<T: Hash + Eq> PartialEq for PSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.len() == other.0.len() && self.0.iter().all(|v| other.0.contains(v)))
    }
}
impl<T: Hash + Eq> Eq for PSet<T> {}

impl<T: Hash + Eq> Default for PSet<T> {
    fn default() -> Self {
        PSet::new()
    }
}

impl<T: Hash + Eq> FromIterator<T> for PSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PSet(Arc::new(iter.into_iter().collect()))
    }
}

/// An insertion-ordered, clone-cheap map. Equality is by contents,
/// independent of insertion order; iteration follows insertion order.
#[derive(Clone)]
pub struct PMap<K: Hash + Eq, V>(Arc<IndexMap<K, V>>);

impl<K: Hash + Eq, V> PMap<K, V> {
    pub fn new() -> Self {
        PMap(Arc::new(IndexMap::new()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, K, V> {
        self.0.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, K, V> {
        self.0.keys()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PMap<K, V> {
    pub fn inserted(&self, key: K, value: V) -> Self {
        let mut next = (*self.0).clone();
        next.insert(key, value);
        PMap(Arc::new(next))
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.len() == other.0.len()
                && self
                    .0
                    .iter()
                    .all(|(k, v)| other.0.get(k).is_some_and(|ov| ov == v)))
    }
}
impl<K: Hash + Eq, V: Eq> Eq for PMap<K, V> {}

impl<K: Hash + Eq, V> Default for PMap<K, V> {
    fn default() -> Self {
        PMap::new()
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for PMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PMap(Arc::new(iter.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_equality_is_by_contents() {
        let a: PList<i32> = PList::from_vec(vec![1, 2, 3]);
        let b: PList<i32> = PList::from_vec(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(a.pushed(4).iter().copied().collect::<Vec<_>>(), vec![
            1, 2, 3, 4
        ]);
    }

    #[test]
    fn set_equality_ignores_insertion_order() {
        let a: PSet<i32> = [1, 2, 3].into_iter().collect();
        let b: PSet<i32> = [3, 2, 1].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn set_iteration_is_insertion_order() {
        let s: PSet<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn map_equality_ignores_insertion_order() {
        let a: PMap<&str, i32> = [("x", 1), ("y", 2)].into_iter().collect();
        let b: PMap<&str, i32> = [("y", 2), ("x", 1)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn clone_is_cheap_and_independent_after_mutation() {
        let a: PMap<&str, i32> = [("x", 1)].into_iter().collect();
        let b = a.clone();
        let c = b.inserted("y", 2);
        assert_eq!(a.len(), 1);
        assert_eq!(c.len(), 2);
    }
}
