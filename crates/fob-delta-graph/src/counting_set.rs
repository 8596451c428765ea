//! Reference-counted set used for inverse-dependency tracking.
//!
//! A parent can point at the same child through several dependency keys
//! ("parallel edges"). Every key contributes one `add`, and the parent only
//! disappears from the child's inverse dependencies once every key has been
//! removed again. Callers never see the counts through iteration or `len`.

use std::fmt;
use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};
use indexmap::map::Keys;
use rustc_hash::FxBuildHasher;

/// A multiset that exposes only its unique values.
#[derive(Clone)]
pub struct CountingSet<T: Hash + Eq> {
    counts: IndexMap<T, usize, FxBuildHasher>,
}

impl<T: Hash + Eq> CountingSet<T> {
    pub fn new() -> Self {
        Self {
            counts: IndexMap::default(),
        }
    }

    /// Increment the count of `value`, inserting it at 1 if absent.
    pub fn add(&mut self, value: T) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    /// Decrement the count of `value`, dropping it once it reaches zero.
    ///
    /// Removing a value that is not present is a no-op.
    pub fn remove<Q>(&mut self, value: &Q)
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        let Some(count) = self.counts.get_mut(value) else {
            return;
        };
        if *count <= 1 {
            // shift_remove keeps iteration in first-insertion order
            self.counts.shift_remove(value);
        } else {
            *count -= 1;
        }
    }

    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        self.counts.contains_key(value)
    }

    /// How many times `value` has been added without a matching removal.
    pub fn count<Q>(&self, value: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Number of unique values.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Iterate unique values in first-insertion order.
    pub fn iter(&self) -> Keys<'_, T, usize> {
        self.counts.keys()
    }
}

impl<T: Hash + Eq> Default for CountingSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> PartialEq for CountingSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.counts.len() == other.counts.len()
            && self
                .counts
                .iter()
                .all(|(value, count)| other.count(value) == *count)
    }
}

impl<T: Hash + Eq> Eq for CountingSet<T> {}

impl<T: Hash + Eq + fmt::Debug> fmt::Debug for CountingSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

impl<T: Hash + Eq> FromIterator<T> for CountingSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: Hash + Eq> Extend<T> for CountingSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

impl<'a, T: Hash + Eq> IntoIterator for &'a CountingSet<T> {
    type Item = &'a T;
    type IntoIter = Keys<'a, T, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_track_counts() {
        let mut set = CountingSet::new();
        set.add("a");
        set.add("a");
        set.add("b");

        assert_eq!(set.len(), 2);
        assert_eq!(set.count(&"a"), 2);

        set.remove(&"a");
        assert!(set.contains(&"a"));
        assert_eq!(set.count(&"a"), 1);

        set.remove(&"a");
        assert!(!set.contains(&"a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn removing_absent_value_is_noop() {
        let mut set: CountingSet<&str> = CountingSet::new();
        set.remove(&"missing");
        assert!(set.is_empty());

        set.add("x");
        set.remove(&"y");
        assert_eq!(set.count(&"x"), 1);
    }

    #[test]
    fn iteration_yields_unique_values_in_insertion_order() {
        let set: CountingSet<_> = ["b", "a", "b", "c", "a"].into_iter().collect();
        let values: Vec<_> = set.iter().copied().collect();
        assert_eq!(values, vec!["b", "a", "c"]);
    }

    #[test]
    fn equality_compares_counts() {
        let left: CountingSet<_> = ["a", "a"].into_iter().collect();
        let right: CountingSet<_> = ["a"].into_iter().collect();
        assert_ne!(left, right);

        let mut right = right;
        right.add("a");
        assert_eq!(left, right);
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set: CountingSet<_> = ["a", "b"].into_iter().collect();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.count(&"a"), 0);
    }
}
