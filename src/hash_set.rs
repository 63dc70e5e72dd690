use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::error::Error;
use crate::hash_map::equivalent_key;
use crate::hash_table::ArenaOrder;
use crate::hash_table::Config;
use crate::hash_table::Cursor;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;

/// A hash set backed by the bucket-chain [`HashTable`].
///
/// `HashSet<T, S>` is the table's set mode: every slot stores a `(T, ())`
/// pair, so there is no value column. Values must implement `Hash + Eq`, and
/// `S` hashes them.
/// Each element costs one slot word plus `Option<T>`.
#[derive(Clone)]
pub struct HashSet<T, S> {
    table: HashTable<T, ()>,
    hash_builder: S,
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set with 16 buckets, hashing with `hash_builder`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "std")]
    /// # {
    /// use std::collections::hash_map::RandomState;
    ///
    /// use chain_hash::hash_set::HashSet;
    ///
    /// let set: HashSet<u64, _> = HashSet::with_hasher(RandomState::new());
    /// assert!(set.is_empty());
    /// # }
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a new hash set with at least `capacity` buckets and the given
    /// hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Creates a new hash set from a [`Config`].
    ///
    /// # Errors
    ///
    /// Fails when the configuration cannot produce a usable table.
    pub fn with_config_and_hasher(config: Config, hash_builder: S) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::with_config(config, ArenaOrder)?,
            hash_builder,
        })
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns how many values the set holds before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns a reference to the set's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Removes all values, keeping the capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashSet;
    /// #
    /// let mut set: HashSet<_, DefaultHashBuilder> = HashSet::new();
    /// set.insert("a");
    /// set.clear();
    /// assert!(set.is_empty());
    /// assert!(!set.contains("a"));
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Compacts storage and shrinks the bucket index as far as the current
    /// length allows.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Reserves capacity for at least `additional` more values.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Adds a value to the set. Returns whether the value was newly inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashSet;
    /// #
    /// let mut set: HashSet<_, DefaultHashBuilder> = HashSet::new();
    /// assert!(set.insert(2));
    /// assert!(!set.insert(2));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert_slot(value, ());
                true
            }
        }
    }

    /// Returns `true` if the set contains the value.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, equivalent_key(value)).is_some()
    }

    /// Returns a reference to the stored value equal to `value`.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.get(hash, equivalent_key(value)).map(|(v, _)| v)
    }

    /// Removes a value. Returns whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::HashSet;
    /// #
    /// let mut set: HashSet<String, DefaultHashBuilder> = HashSet::new();
    /// set.insert("kept".to_string());
    /// assert_eq!(set.take("kept"), Some("kept".to_string()));
    /// assert_eq!(set.take("kept"), None);
    /// ```
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table
            .remove(hash, equivalent_key(value))
            .map(|(v, ())| v)
    }

    /// Adds a value, replacing an equal stored value. Returns the replaced
    /// value. The replaced value keeps its position in iteration order.
    pub fn replace(&mut self, value: T) -> Option<T> {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(mut entry) => Some(entry.replace_key(value)),
            TableEntry::Vacant(entry) => {
                entry.insert_slot(value, ());
                None
            }
        }
    }

    /// Returns an iterator over the values in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes all values, returning them as an iterator.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Retains only the values for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        let hash_builder = &self.hash_builder;
        self.table.retain(|v, _| f(v), |v| hash_builder.hash_one(v));
    }

    /// Creates a detached cursor positioned before the first value. See
    /// [`HashMap::cursor`](crate::HashMap::cursor).
    pub fn cursor(&self) -> Cursor {
        self.table.cursor()
    }

    /// Advances `cursor`, returning the value it now points at.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentModification`] if the set was structurally changed
    /// behind the cursor.
    pub fn cursor_next(&self, cursor: &mut Cursor) -> Result<Option<&T>, Error> {
        Ok(self
            .table
            .cursor_next(cursor)?
            .and_then(|slot| self.table.slot(slot))
            .map(|(v, _)| v))
    }

    /// Removes the value `cursor` last returned. The cursor stays valid.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentModification`] if the set was structurally changed
    /// behind the cursor.
    pub fn cursor_remove(&mut self, cursor: &mut Cursor) -> Result<Option<T>, Error> {
        let hash_builder = &self.hash_builder;
        Ok(self
            .table
            .cursor_remove(cursor, |v| hash_builder.hash_one(v))?
            .map(|(v, ())| v))
    }

    /// Runs the table's full consistency pass using this set's hasher.
    #[cfg(any(test, feature = "stats"))]
    pub fn check_invariants(&self) -> Result<(), crate::InvariantViolation> {
        self.table
            .check_invariants(|v| self.hash_builder.hash_one(v))
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty set with a default-constructed hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new hash set with at least `capacity` buckets using the
    /// default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S> Default for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowing iterator over a `HashSet`, in slot order.
pub struct Iter<'a, T> {
    inner: crate::hash_table::Iter<'a, T, (), ArenaOrder>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v, _)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// Iterator that empties a `HashSet`.
pub struct Drain<'a, T> {
    inner: crate::hash_table::Drain<'a, T, (), ArenaOrder>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(v, ())| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}

/// An owning iterator over the values of a `HashSet`.
pub struct IntoIter<T> {
    inner: crate::hash_table::IntoIter<T, (), ArenaOrder>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(v, ())| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T, S> IntoIterator for HashSet<T, S> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}
