//! An ordered map with optional eviction of its eldest entry.
//!
//! [`LinkedHashMap`] pairs the chain table with a [`LinkedOrder`] overlay.
//! In [`OrderMode::Insertion`] it iterates in first-insertion order; in
//! [`OrderMode::Access`] every [`get`](LinkedHashMap::get) and every value
//! replacement moves the entry to the back, which together with an
//! [`EvictionPolicy`] gives an LRU cache.

use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::error::Error;
use crate::hash_map::equivalent_key;
use crate::hash_table::Config;
use crate::hash_table::Cursor;
use crate::hash_table::DEFAULT_INITIAL_CAPACITY;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::SlotIndex;
use crate::linked_order::LinkedOrder;
use crate::linked_order::OrderMode;

/// Decides, after each insertion of a new key, whether the eldest entry
/// should be removed.
///
/// `len` is the number of entries including the one just inserted. The
/// eldest entry is the head of the order: least recently inserted, or least
/// recently accessed in access mode.
///
/// Closures of the form `FnMut(usize, &K, &V) -> bool` implement this trait.
pub trait EvictionPolicy<K, V> {
    /// Returns `true` to remove the eldest entry.
    fn should_evict(&mut self, len: usize, eldest_key: &K, eldest_value: &V) -> bool;
}

/// Never removes anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeverEvict;

impl<K, V> EvictionPolicy<K, V> for NeverEvict {
    #[inline]
    fn should_evict(&mut self, _len: usize, _eldest_key: &K, _eldest_value: &V) -> bool {
        false
    }
}

/// Keeps at most the given number of entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxEntries(pub usize);

impl<K, V> EvictionPolicy<K, V> for MaxEntries {
    #[inline]
    fn should_evict(&mut self, len: usize, _eldest_key: &K, _eldest_value: &V) -> bool {
        len > self.0
    }
}

impl<K, V, F> EvictionPolicy<K, V> for F
where
    F: FnMut(usize, &K, &V) -> bool,
{
    #[inline]
    fn should_evict(&mut self, len: usize, eldest_key: &K, eldest_value: &V) -> bool {
        self(len, eldest_key, eldest_value)
    }
}

/// A hash map that remembers insertion or access order.
///
/// # Examples
///
/// A three-entry LRU cache:
///
/// ```rust
/// use chain_hash::DefaultHashBuilder;
/// use chain_hash::LinkedHashMap;
/// use chain_hash::linked_hash_map::MaxEntries;
/// use chain_hash::linked_order::OrderMode;
///
/// let mut cache: LinkedHashMap<&str, u32, DefaultHashBuilder, _> =
///     LinkedHashMap::with_mode(OrderMode::Access).with_eviction(MaxEntries(3));
///
/// cache.insert("a", 1);
/// cache.insert("b", 2);
/// cache.insert("c", 3);
/// cache.get("a");
/// cache.insert("d", 4);
///
/// let keys: Vec<_> = cache.keys().copied().collect();
/// assert_eq!(keys, ["c", "a", "d"]);
/// ```
#[derive(Clone)]
pub struct LinkedHashMap<K, V, S, E = NeverEvict> {
    table: HashTable<K, V, LinkedOrder>,
    hash_builder: S,
    eviction: E,
}

impl<K, V, S, E> Debug for LinkedHashMap<K, V, S, E>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.table.iter().map(|(_, k, v)| (k, v)))
            .finish()
    }
}

impl<K, V, S, E> PartialEq for LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    /// Maps are equal when they hold the same entries, in any order.
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter()
            .all(|(k, v)| other.peek(k).is_some_and(|ov| v == ov))
    }
}

impl<K, V, S, E> Eq for LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> LinkedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an insertion-ordered map with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_mode_and_hasher(OrderMode::Insertion, hash_builder)
    }

    /// Creates a map in the given order mode with the given hasher builder.
    pub fn with_mode_and_hasher(mode: OrderMode, hash_builder: S) -> Self {
        Self::with_capacity_mode_and_hasher(DEFAULT_INITIAL_CAPACITY, mode, hash_builder)
    }

    /// Creates a map with at least `capacity` buckets.
    pub fn with_capacity_mode_and_hasher(capacity: usize, mode: OrderMode, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity_and_order(capacity, LinkedOrder::new(mode)),
            hash_builder,
            eviction: NeverEvict,
        }
    }

    /// Creates a map from a [`Config`].
    ///
    /// # Errors
    ///
    /// Fails when the configuration cannot produce a usable table.
    pub fn with_config_and_hasher(
        config: Config,
        mode: OrderMode,
        hash_builder: S,
    ) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::with_config(config, LinkedOrder::new(mode))?,
            hash_builder,
            eviction: NeverEvict,
        })
    }
}

impl<K, V, S> LinkedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an insertion-ordered map using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map in the given order mode using the default hasher
    /// builder.
    pub fn with_mode(mode: OrderMode) -> Self {
        Self::with_mode_and_hasher(mode, S::default())
    }
}

impl<K, V, S> Default for LinkedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, E> LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Replaces the eviction policy, keeping every entry.
    pub fn with_eviction<P>(self, eviction: P) -> LinkedHashMap<K, V, S, P>
    where
        P: EvictionPolicy<K, V>,
    {
        LinkedHashMap {
            table: self.table,
            hash_builder: self.hash_builder,
            eviction,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns how many entries the map holds before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the order mode.
    pub fn mode(&self) -> OrderMode {
        self.table.order().mode()
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the eviction policy.
    pub fn eviction(&self) -> &E {
        &self.eviction
    }

    /// Returns the eviction policy mutably.
    pub fn eviction_mut(&mut self) -> &mut E {
        &mut self.eviction
    }

    /// Removes every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Compacts storage and shrinks the bucket index. Order is preserved.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    fn find<Q>(&self, key: &Q) -> Option<SlotIndex>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, equivalent_key(key))
    }

    /// Returns the value for `key`, moving the entry to the back in access
    /// mode.
    ///
    /// Use [`peek`](Self::peek) to read without reordering.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let slot = self.find(key)?;
        self.table.touch(slot);
        self.table.slot(slot).map(|(_, v)| v)
    }

    /// Returns the value for `key` mutably, moving the entry to the back in
    /// access mode.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let slot = self.find(key)?;
        self.table.touch(slot);
        self.table.slot_mut(slot).map(|(_, v)| v)
    }

    /// Returns the value for `key` without touching the order.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let slot = self.find(key)?;
        self.table.slot(slot).map(|(_, v)| v)
    }

    /// Returns the value for `key` mutably without touching the order.
    pub fn peek_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let slot = self.find(key)?;
        self.table.slot_mut(slot).map(|(_, v)| v)
    }

    /// Returns `true` if the map contains `key`. Never reorders.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key).is_some()
    }

    /// Returns `true` if some entry holds `value`, scanning eldest first.
    /// Never reorders.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.table.iter().any(|(_, _, v)| v == value)
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, equivalent_key(key))
    }

    /// The eldest entry: least recently inserted, or least recently used in
    /// access mode.
    pub fn front(&self) -> Option<(&K, &V)> {
        self.table
            .order()
            .front()
            .and_then(|slot| self.table.slot(slot))
    }

    /// The newest entry.
    pub fn back(&self) -> Option<(&K, &V)> {
        self.table
            .order()
            .back()
            .and_then(|slot| self.table.slot(slot))
    }

    /// Removes and returns the eldest entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::LinkedHashMap;
    /// #
    /// let mut map: LinkedHashMap<_, _, DefaultHashBuilder> = LinkedHashMap::new();
    /// map.insert(3, "c");
    /// map.insert(1, "a");
    /// assert_eq!(map.pop_front(), Some((3, "c")));
    /// assert_eq!(map.pop_front(), Some((1, "a")));
    /// assert_eq!(map.pop_front(), None);
    /// ```
    pub fn pop_front(&mut self) -> Option<(K, V)> {
        let slot = self.table.order().front()?;
        self.remove_at(slot)
    }

    /// Removes and returns the newest entry.
    pub fn pop_back(&mut self) -> Option<(K, V)> {
        let slot = self.table.order().back()?;
        self.remove_at(slot)
    }

    fn remove_at(&mut self, slot: SlotIndex) -> Option<(K, V)> {
        let (key, _) = self.table.slot(slot)?;
        let hash = self.hash_builder.hash_one(key);
        self.table.remove_slot(slot, hash)
    }

    /// Returns an iterator over entries, eldest first.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over keys, eldest first.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over values, eldest first.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Removes every entry, yielding them eldest first.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Retains only the entries for which `f` returns `true`, visiting them
    /// eldest first. Does not reorder.
    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        let hash_builder = &self.hash_builder;
        self.table.retain(f, |k| hash_builder.hash_one(k));
    }

    /// Creates a detached cursor positioned before the eldest entry.
    ///
    /// In access mode a reordering [`get`](Self::get) counts as a structural
    /// change and invalidates the cursor; [`peek`](Self::peek) does not.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::Error;
    /// # use chain_hash::LinkedHashMap;
    /// # use chain_hash::linked_order::OrderMode;
    /// #
    /// let mut map: LinkedHashMap<u8, u8, DefaultHashBuilder> =
    ///     LinkedHashMap::with_mode(OrderMode::Access);
    /// map.insert(1, 1);
    /// map.insert(2, 2);
    ///
    /// let mut cursor = map.cursor();
    /// map.cursor_next(&mut cursor).unwrap();
    /// map.peek(&2);
    /// assert!(map.cursor_next(&mut cursor).is_ok());
    ///
    /// let mut cursor = map.cursor();
    /// map.get(&1);
    /// assert_eq!(map.cursor_next(&mut cursor), Err(Error::ConcurrentModification));
    /// ```
    pub fn cursor(&self) -> Cursor {
        self.table.cursor()
    }

    /// Advances `cursor`, returning the entry it now points at.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentModification`] if the map was structurally changed
    /// behind the cursor.
    pub fn cursor_next(&self, cursor: &mut Cursor) -> Result<Option<(&K, &V)>, Error> {
        Ok(self
            .table
            .cursor_next(cursor)?
            .and_then(|slot| self.table.slot(slot)))
    }

    /// Removes the entry `cursor` last returned. The cursor stays valid.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentModification`] if the map was structurally changed
    /// behind the cursor.
    pub fn cursor_remove(&mut self, cursor: &mut Cursor) -> Result<Option<(K, V)>, Error> {
        let hash_builder = &self.hash_builder;
        self.table
            .cursor_remove(cursor, |k| hash_builder.hash_one(k))
    }

    /// Returns chain statistics for the underlying table.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> crate::hash_table::DebugStats {
        self.table.debug_stats()
    }

    /// Runs the table and order consistency pass using this map's hasher.
    #[cfg(any(test, feature = "stats"))]
    pub fn check_invariants(&self) -> Result<(), crate::InvariantViolation> {
        self.table
            .check_invariants(|k| self.hash_builder.hash_one(k))
    }
}

impl<K, V, S, E> LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    S: BuildHasher,
    E: EvictionPolicy<K, V>,
{
    /// Inserts a key-value pair.
    ///
    /// A new key goes to the back of the order, after which the eviction
    /// policy is consulted once about the eldest entry. Replacing the value
    /// of an existing key returns the old value, moves the entry to the back
    /// in access mode, and never evicts.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::DefaultHashBuilder;
    /// # use chain_hash::LinkedHashMap;
    /// #
    /// let mut map: LinkedHashMap<_, _, DefaultHashBuilder> = LinkedHashMap::new();
    /// map.insert("x", 1);
    /// map.insert("y", 2);
    /// assert_eq!(map.insert("x", 10), Some(1));
    ///
    /// let keys: Vec<_> = map.keys().copied().collect();
    /// assert_eq!(keys, ["x", "y"]);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |k| k == &key) {
            TableEntry::Occupied(mut entry) => Some(entry.insert(value)),
            TableEntry::Vacant(entry) => {
                entry.insert_slot(key, value);
                self.evict_eldest();
                None
            }
        }
    }

    fn evict_eldest(&mut self) {
        let Some(slot) = self.table.eldest() else {
            return;
        };
        let Some((key, value)) = self.table.slot(slot) else {
            return;
        };
        if !self.eviction.should_evict(self.table.len(), key, value) {
            return;
        }

        let hash = self.hash_builder.hash_one(key);
        self.table.remove_slot(slot, hash);
        tracing::trace!(len = self.table.len(), "evicted eldest entry");
    }
}

impl<K, V, S, E> Extend<(K, V)> for LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    S: BuildHasher,
    E: EvictionPolicy<K, V>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for LinkedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, S, E> IntoIterator for &'a LinkedHashMap<K, V, S, E>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S, E> IntoIterator for LinkedHashMap<K, V, S, E> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

/// An iterator over the entries of a `LinkedHashMap`, eldest first.
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, K, V, LinkedOrder>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// An iterator over the keys of a `LinkedHashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `LinkedHashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// A draining iterator over a `LinkedHashMap`, eldest first.
pub struct Drain<'a, K, V> {
    inner: crate::hash_table::Drain<'a, K, V, LinkedOrder>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

/// An owning iterator over a `LinkedHashMap`, eldest first.
pub struct IntoIter<K, V> {
    inner: crate::hash_table::IntoIter<K, V, LinkedOrder>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
