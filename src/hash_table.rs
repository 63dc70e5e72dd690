//! The bucket-chain table engine.
//!
//! [`HashTable`] stores entries in a flat slot arena and threads same-bucket
//! collisions through a per-slot index word, so a chain costs one small word
//! per element instead of a heap node. Callers supply a precomputed `u64`
//! hash and an equality predicate for every operation; the keyed front ends
//! ([`HashMap`], [`HashSet`], [`LinkedHashMap`]) do this on your behalf.
//!
//! Iteration order and slot-lifecycle notifications are delegated to a
//! [`SlotOrder`]: [`ArenaOrder`] walks slot positions, while
//! [`LinkedOrder`] keeps a doubly linked overlay for insertion or access
//! order.
//!
//! [`HashMap`]: crate::HashMap
//! [`HashSet`]: crate::HashSet
//! [`LinkedHashMap`]: crate::LinkedHashMap
//! [`LinkedOrder`]: crate::linked_order::LinkedOrder

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::error::Error;
use crate::error::InvariantViolation;

/// Bucket count used when none, or a smaller one, is requested.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Load factor used by the infallible constructors.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Largest supported bucket count. Requests above it are clamped.
pub const MAXIMUM_CAPACITY: usize = 1 << 30;

/// Folds a 64-bit hash to 32 bits and applies the supplemental mix.
///
/// Bucket selection only looks at the low bits, so hashes that differ only
/// in their high bits would otherwise pile into the same chain.
#[inline(always)]
fn spread(hash: u64) -> u32 {
    let h = (hash ^ (hash >> 32)) as u32;
    h ^ (h >> 20) ^ (h >> 12) ^ (h >> 7) ^ (h >> 4)
}

#[inline(always)]
fn threshold_for(buckets: usize, load_factor: f32) -> usize {
    (buckets as f64 * load_factor as f64) as usize
}

#[inline(always)]
fn buckets_for(capacity: usize) -> usize {
    capacity
        .clamp(DEFAULT_INITIAL_CAPACITY, MAXIMUM_CAPACITY)
        .next_power_of_two()
}

/// Construction parameters for a table.
///
/// `initial_capacity` is a bucket count: it is rounded up to a power of two,
/// at least [`DEFAULT_INITIAL_CAPACITY`] and at most [`MAXIMUM_CAPACITY`].
/// The table holds `floor(buckets * load_factor)` entries before it grows.
///
/// # Examples
///
/// ```rust
/// use chain_hash::Config;
/// use chain_hash::hash_table::HashTable;
/// use chain_hash::hash_table::ArenaOrder;
///
/// let config = Config::new().initial_capacity(100).load_factor(0.5);
/// let table: HashTable<u32, u32> = HashTable::with_config(config, ArenaOrder).unwrap();
/// assert_eq!(table.buckets(), 128);
/// assert_eq!(table.capacity(), 64);
///
/// assert!(HashTable::<u32, u32>::with_config(Config::new().load_factor(1.5), ArenaOrder).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    initial_capacity: usize,
    load_factor: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// A configuration with 16 buckets and a load factor of 0.75.
    pub const fn new() -> Self {
        Config {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }

    /// Sets the requested bucket count.
    pub const fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the load factor, a fraction in `(0, 1]`.
    pub const fn load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    fn geometry(&self) -> Result<(usize, usize), Error> {
        let load_factor = self.load_factor;
        if !load_factor.is_finite() || load_factor <= 0.0 || load_factor > 1.0 {
            tracing::debug!(load_factor, "rejected load factor");
            return Err(Error::InvalidLoadFactor(load_factor));
        }

        let buckets = buckets_for(self.initial_capacity);
        let threshold = threshold_for(buckets, load_factor);
        if threshold == 0 {
            tracing::debug!(load_factor, buckets, "load factor leaves no slots");
            return Err(Error::ZeroThreshold {
                load_factor,
                buckets,
            });
        }

        Ok((buckets, threshold))
    }
}

/// Position of an entry in the slot arena.
///
/// Slot ids are stable while an entry stays in the table, including across
/// growth. Only [`HashTable::shrink_to_fit`] moves entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u32);

impl SlotIndex {
    pub(crate) const ZERO: SlotIndex = SlotIndex(0);

    #[inline(always)]
    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index < MAXIMUM_CAPACITY);
        SlotIndex(index as u32)
    }

    /// The slot position as a `usize`.
    #[inline(always)]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Points at a chain element and carries that element's hash fragment, so
/// a lookup can reject most candidates without touching the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link {
    slot: SlotIndex,
    fragment: u32,
}

/// Per-slot index word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SlotWord {
    /// Never used; only found at or above `first_empty`.
    #[default]
    Free,
    /// On the deleted-slot free list.
    Tombstone { next_free: Option<SlotIndex> },
    /// Occupied. `next: None` marks the end of the chain.
    Chained { next: Option<Link> },
}

impl SlotWord {
    #[inline(always)]
    fn is_occupied(self) -> bool {
        matches!(self, SlotWord::Chained { .. })
    }

    #[inline(always)]
    fn chain_next(self) -> Option<Link> {
        match self {
            SlotWord::Chained { next } => next,
            _ => {
                debug_assert!(false, "chain walked into a vacant slot: {self:?}");
                None
            }
        }
    }
}

/// Read-only view of which slots are occupied, handed to [`SlotOrder`]
/// traversal methods.
#[derive(Clone, Copy)]
pub struct Occupancy<'a> {
    words: &'a [SlotWord],
}

impl<'a> Occupancy<'a> {
    /// One past the highest slot that has ever been used.
    pub fn watermark(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` if `slot` currently holds an entry.
    pub fn is_occupied(&self, slot: SlotIndex) -> bool {
        self.words
            .get(slot.get())
            .is_some_and(|word| word.is_occupied())
    }

    /// The first occupied slot at or after position `from`.
    pub fn next_occupied(&self, from: usize) -> Option<SlotIndex> {
        self.words
            .get(from..)?
            .iter()
            .position(|word| word.is_occupied())
            .map(|offset| SlotIndex::new(from + offset))
    }
}

/// Slot-lifecycle hooks plus the traversal strategy of a [`HashTable`].
///
/// The table calls the `on_*` hooks after each change to its slots and asks
/// `first`/`next` for iteration order. All hooks default to doing nothing.
pub trait SlotOrder {
    /// A new entry was written to `slot`.
    fn on_insert(&mut self, _slot: SlotIndex) {}

    /// The value in `slot` was replaced. Returns `true` if iteration order
    /// changed, which counts as a structural modification.
    fn on_update(&mut self, _slot: SlotIndex) -> bool {
        false
    }

    /// The entry in `slot` was looked up through a reordering accessor.
    /// Returns `true` if iteration order changed.
    fn on_access(&mut self, _slot: SlotIndex) -> bool {
        false
    }

    /// The entry in `slot` was removed.
    fn on_remove(&mut self, _slot: SlotIndex) {}

    /// The entry in `from` was moved to the vacant slot `to` by compaction.
    fn on_relocate(&mut self, _from: SlotIndex, _to: SlotIndex) {}

    /// The arena now has `slots` slots. Called at construction, on growth
    /// and after compaction.
    fn on_resize(&mut self, _slots: usize) {}

    /// Every entry was removed.
    fn on_clear(&mut self) {}

    /// The first slot to visit, if any.
    fn first(&self, occupancy: Occupancy<'_>) -> Option<SlotIndex>;

    /// The slot visited after `slot`, if any.
    fn next(&self, occupancy: Occupancy<'_>, slot: SlotIndex) -> Option<SlotIndex>;

    /// The entry an eviction policy should consider removing.
    fn eldest(&self) -> Option<SlotIndex> {
        None
    }

    /// Validates internal links against the table. Used by
    /// [`HashTable::check_invariants`].
    fn check(&self, _occupancy: Occupancy<'_>, _len: usize) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

/// Visits entries by slot position, skipping tombstones.
///
/// Without deletions this is insertion order; a recycled tombstone puts the
/// new entry where the removed one was.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaOrder;

impl SlotOrder for ArenaOrder {
    #[inline]
    fn first(&self, occupancy: Occupancy<'_>) -> Option<SlotIndex> {
        occupancy.next_occupied(0)
    }

    #[inline]
    fn next(&self, occupancy: Occupancy<'_>, slot: SlotIndex) -> Option<SlotIndex> {
        occupancy.next_occupied(slot.get() + 1)
    }
}

/// Location of a matched element: its bucket, the slot whose word links to
/// it (`None` when it heads the chain), and its own slot.
#[derive(Clone, Copy, Debug)]
struct Probe {
    bucket: usize,
    prev: Option<SlotIndex>,
    slot: SlotIndex,
}

/// Chain length statistics for analysis.
///
/// Only available in tests or with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries.
    pub len: usize,
    /// Entries the table holds before growing.
    pub capacity: usize,
    /// Number of buckets.
    pub buckets: usize,
    /// Buckets heading a non-empty chain.
    pub used_buckets: usize,
    /// Length of the longest chain.
    pub longest_chain: usize,
    /// Slots on the tombstone list.
    pub tombstones: usize,
    /// Slots never used since the last clear or compaction.
    pub never_used: usize,
    /// `len / capacity`.
    pub load: f64,
    /// Mean chain length over non-empty buckets.
    pub average_chain: f64,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Chain Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load)",
            self.len,
            self.capacity,
            self.load * 100.0
        );
        println!(
            "Buckets: {}/{} in use, longest chain {}, mean chain {:.2}",
            self.used_buckets, self.buckets, self.longest_chain, self.average_chain
        );
        println!(
            "Slots: {} tombstoned, {} never used",
            self.tombstones, self.never_used
        );
    }
}

/// A hash table that chains collisions through flat index arrays.
///
/// `HashTable<K, V, O>` stores `(K, V)` pairs in a slot arena. Each bucket
/// holds an optional link to the head of its chain, and each occupied slot
/// holds an optional link to the next element of the same chain; links
/// carry the target's high hash bits for cheap rejection. Removed slots go
/// on a free list and are reused before the arena grows.
///
/// Like the other raw tables in the ecosystem, this type does not hash keys
/// itself: every operation takes the key's `u64` hash and an equality
/// predicate.
///
/// ## Performance Characteristics
///
/// - **Memory**: one slot word and one `Option<(K, V)>` per slot, one bucket
///   word per bucket.
/// - **Growth**: doubles the bucket count, splitting every chain in a single
///   pass without rehashing keys.
///
/// ## Example
///
/// ```rust
/// use chain_hash::hash_table::Entry;
/// use chain_hash::hash_table::HashTable;
///
/// let mut table: HashTable<u64, &str> = HashTable::new();
/// let hash = 0x9e37_79b9_7f4a_7c15;
///
/// match table.entry(hash, |&k| k == 7) {
///     Entry::Vacant(entry) => {
///         entry.insert(7, "seven");
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
///
/// assert_eq!(table.get(hash, |&k| k == 7), Some((&7, &"seven")));
/// assert_eq!(table.remove(hash, |&k| k == 7), Some((7, "seven")));
/// assert!(table.is_empty());
/// ```
#[derive(Clone)]
pub struct HashTable<K, V, O = ArenaOrder> {
    entries: Vec<Option<(K, V)>>,
    words: Vec<SlotWord>,
    buckets: Vec<Option<Link>>,

    len: usize,
    first_empty: usize,
    first_deleted: Option<SlotIndex>,
    load_factor: f32,
    mod_count: u64,

    order: O,
}

impl<K, V, O> Debug for HashTable<K, V, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let chains = (0..self.buckets.len())
            .filter(|&bucket| self.buckets[bucket].is_some())
            .map(|bucket| {
                let slots = self
                    .chain(bucket)
                    .map(|link| link.slot.get())
                    .collect::<Vec<_>>();
                (bucket, slots)
            })
            .collect::<Vec<_>>();

        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("capacity", &self.entries.len())
            .field("buckets", &self.buckets.len())
            .field("first_empty", &self.first_empty)
            .field("first_deleted", &self.first_deleted.map(SlotIndex::get))
            .field("chains", &chains)
            .finish()
    }
}

impl<K, V, O> HashTable<K, V, O> {
    fn chain(&self, bucket: usize) -> impl Iterator<Item = Link> + '_ {
        core::iter::successors(self.buckets[bucket], move |link| {
            self.words[link.slot.get()].chain_next()
        })
    }
}

impl<K, V, O> Default for HashTable<K, V, O>
where
    O: SlotOrder + Default,
{
    fn default() -> Self {
        Self::with_capacity_and_order(DEFAULT_INITIAL_CAPACITY, O::default())
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table with 16 buckets and a load factor of 0.75.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// Creates an empty table with at least `capacity` buckets and the
    /// default load factor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64, String> = HashTable::with_capacity(100);
    /// assert_eq!(table.buckets(), 128);
    /// assert_eq!(table.capacity(), 96);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_order(capacity, ArenaOrder)
    }
}

impl<K, V, O> HashTable<K, V, O>
where
    O: SlotOrder,
{
    /// Creates an empty table from a validated [`Config`].
    ///
    /// Fails if the load factor is out of range or leaves no usable slots.
    pub fn with_config(config: Config, order: O) -> Result<Self, Error> {
        let (buckets, threshold) = config.geometry()?;
        Ok(Self::from_geometry(
            buckets,
            threshold,
            config.load_factor,
            order,
        ))
    }

    /// Creates an empty table with at least `capacity` buckets, the default
    /// load factor, and the given ordering.
    pub fn with_capacity_and_order(capacity: usize, order: O) -> Self {
        let buckets = buckets_for(capacity);
        let threshold = threshold_for(buckets, DEFAULT_LOAD_FACTOR);
        Self::from_geometry(buckets, threshold, DEFAULT_LOAD_FACTOR, order)
    }

    fn from_geometry(buckets: usize, threshold: usize, load_factor: f32, mut order: O) -> Self {
        let mut entries = Vec::with_capacity(threshold);
        entries.resize_with(threshold, || None);
        order.on_resize(threshold);

        Self {
            entries,
            words: vec![SlotWord::Free; threshold],
            buckets: vec![None; buckets],
            len: 0,
            first_empty: 0,
            first_deleted: None,
            load_factor,
            mod_count: 0,
            order,
        }
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns how many entries the table holds before it grows.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of buckets, always a power of two.
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the load factor the table was created with.
    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Returns the ordering strategy.
    pub fn order(&self) -> &O {
        &self.order
    }

    #[cfg(test)]
    pub(crate) fn order_mut(&mut self) -> &mut O {
        &mut self.order
    }

    /// Returns the slot an eviction policy should consider, as reported by
    /// the ordering strategy.
    pub fn eldest(&self) -> Option<SlotIndex> {
        self.order.eldest()
    }

    #[inline(always)]
    fn mask(&self) -> u32 {
        (self.buckets.len() - 1) as u32
    }

    #[inline(always)]
    fn occupancy(&self) -> Occupancy<'_> {
        Occupancy {
            words: &self.words[..self.first_empty],
        }
    }

    #[inline(always)]
    fn bump(&mut self) {
        self.mod_count = self.mod_count.wrapping_add(1);
    }

    #[inline]
    fn occupied(&self, slot: SlotIndex) -> &(K, V) {
        match &self.entries[slot.get()] {
            Some(pair) => pair,
            None => unreachable!("slot {} is not occupied", slot.get()),
        }
    }

    #[inline]
    fn occupied_mut(&mut self, slot: SlotIndex) -> &mut (K, V) {
        match &mut self.entries[slot.get()] {
            Some(pair) => pair,
            None => unreachable!("slot {} is not occupied", slot.get()),
        }
    }

    /// Walks the chain for `hash`, comparing fragments before keys.
    #[inline]
    fn probe(&self, hash: u32, eq: impl Fn(&K) -> bool) -> Option<Probe> {
        let mask = self.mask();
        let bucket = (hash & mask) as usize;
        let fragment = hash & !mask;

        let mut prev = None;
        let mut cursor = self.buckets[bucket];
        while let Some(link) = cursor {
            if link.fragment == fragment {
                if let Some((key, _)) = &self.entries[link.slot.get()] {
                    if eq(key) {
                        return Some(Probe {
                            bucket,
                            prev,
                            slot: link.slot,
                        });
                    }
                }
            }
            prev = Some(link.slot);
            cursor = self.words[link.slot.get()].chain_next();
        }

        None
    }

    /// Finds the slot holding the entry that matches `eq`.
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<SlotIndex> {
        if self.len == 0 {
            return None;
        }
        self.probe(spread(hash), eq).map(|probe| probe.slot)
    }

    /// Returns the entry that matches `eq`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(42, |&k: &u64| k == 42).or_insert(42, "answer");
    ///
    /// assert_eq!(table.get(42, |&k| k == 42), Some((&42, &"answer")));
    /// assert_eq!(table.get(42, |&k| k == 41), None);
    /// ```
    pub fn get(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &V)> {
        let slot = self.find(hash, eq)?;
        let (key, value) = self.occupied(slot);
        Some((key, value))
    }

    /// Returns the entry that matches `eq`, with a mutable value.
    ///
    /// Does not notify the ordering strategy; see [`touch`](Self::touch).
    pub fn get_mut(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &mut V)> {
        let slot = self.find(hash, eq)?;
        let (key, value) = self.occupied_mut(slot);
        Some((&*key, value))
    }

    /// Returns the entry stored at `slot`, if it is occupied.
    pub fn slot(&self, slot: SlotIndex) -> Option<(&K, &V)> {
        self.entries
            .get(slot.get())?
            .as_ref()
            .map(|(key, value)| (key, value))
    }

    /// Returns the entry stored at `slot` with a mutable value, if it is
    /// occupied.
    pub fn slot_mut(&mut self, slot: SlotIndex) -> Option<(&K, &mut V)> {
        self.entries
            .get_mut(slot.get())?
            .as_mut()
            .map(|(key, value)| (&*key, value))
    }

    /// Reports an access to `slot` to the ordering strategy. In access order
    /// this moves the entry to the back and counts as a structural change.
    pub fn touch(&mut self, slot: SlotIndex) {
        debug_assert!(self.occupancy().is_occupied(slot));
        if self.order.on_access(slot) {
            self.bump();
        }
    }

    /// Gets the entry for the given hash and equality predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::hash_table::Entry;
    /// # use chain_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<&str, u32> = HashTable::new();
    /// let hash = 0xDEAD_BEEF;
    ///
    /// *table.entry(hash, |&k| k == "hits").or_insert("hits", 0) += 1;
    /// *table.entry(hash, |&k| k == "hits").or_insert("hits", 0) += 1;
    ///
    /// match table.entry(hash, |&k| k == "hits") {
    ///     Entry::Occupied(entry) => assert_eq!(entry.get(), &2),
    ///     Entry::Vacant(_) => unreachable!(),
    /// }
    /// ```
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Entry<'_, K, V, O> {
        let hash = spread(hash);
        match self.probe(hash, eq) {
            Some(probe) => Entry::Occupied(OccupiedEntry { table: self, probe }),
            None => Entry::Vacant(VacantEntry { table: self, hash }),
        }
    }

    /// Removes and returns the entry that matches `eq`.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        if self.len == 0 {
            return None;
        }
        let probe = self.probe(spread(hash), eq)?;
        Some(self.remove_at(probe))
    }

    /// Removes the entry stored at `slot`. `hash` must be the hash of the
    /// key in that slot.
    pub fn remove_slot(&mut self, slot: SlotIndex, hash: u64) -> Option<(K, V)> {
        let hash = spread(hash);
        let bucket = (hash & self.mask()) as usize;

        let mut prev = None;
        let mut cursor = self.buckets[bucket];
        while let Some(link) = cursor {
            if link.slot == slot {
                return Some(self.remove_at(Probe { bucket, prev, slot }));
            }
            prev = Some(link.slot);
            cursor = self.words[link.slot.get()].chain_next();
        }

        None
    }

    fn replace_value(&mut self, slot: SlotIndex, value: V) -> V {
        let old = core::mem::replace(&mut self.occupied_mut(slot).1, value);
        if self.order.on_update(slot) {
            self.bump();
        }
        old
    }

    fn insert_new(&mut self, hash: u32, key: K, value: V) -> SlotIndex {
        if self.len >= self.capacity() {
            self.grow();
        }

        let mask = self.mask();
        let bucket = (hash & mask) as usize;
        let slot = self.allocate();

        self.entries[slot.get()] = Some((key, value));
        self.words[slot.get()] = SlotWord::Chained {
            next: self.buckets[bucket],
        };
        self.buckets[bucket] = Some(Link {
            slot,
            fragment: hash & !mask,
        });

        self.len += 1;
        self.bump();
        self.order.on_insert(slot);
        slot
    }

    /// Takes a slot from the tombstone list, or else from the never-used
    /// region. The caller guarantees `len < capacity`.
    fn allocate(&mut self) -> SlotIndex {
        match self.first_deleted {
            Some(slot) => {
                self.first_deleted = match self.words[slot.get()] {
                    SlotWord::Tombstone { next_free } => next_free,
                    word => unreachable!("free list reached {word:?}"),
                };
                slot
            }
            None => {
                debug_assert!(self.first_empty < self.capacity());
                let slot = SlotIndex::new(self.first_empty);
                self.first_empty += 1;
                slot
            }
        }
    }

    fn remove_at(&mut self, probe: Probe) -> (K, V) {
        let Probe { bucket, prev, slot } = probe;

        let next = self.words[slot.get()].chain_next();
        match prev {
            Some(prev) => self.words[prev.get()] = SlotWord::Chained { next },
            None => self.buckets[bucket] = next,
        }

        if slot.get() + 1 == self.first_empty {
            self.first_empty -= 1;
            self.words[slot.get()] = SlotWord::Free;
        } else {
            self.words[slot.get()] = SlotWord::Tombstone {
                next_free: self.first_deleted,
            };
            self.first_deleted = Some(slot);
        }

        let pair = match self.entries[slot.get()].take() {
            Some(pair) => pair,
            None => unreachable!("removed slot {} was empty", slot.get()),
        };

        self.len -= 1;
        self.bump();
        self.order.on_remove(slot);
        pair
    }

    /// Doubles the bucket count, splitting each chain into the bucket it was
    /// in and the bucket `old_buckets` above it.
    fn grow(&mut self) {
        let old_buckets = self.buckets.len();
        assert!(
            old_buckets < MAXIMUM_CAPACITY,
            "hash table capacity overflow"
        );

        let new_buckets = old_buckets << 1;
        let new_mask = (new_buckets - 1) as u32;
        let split_bit = old_buckets as u32;
        let threshold = threshold_for(new_buckets, self.load_factor);

        let mut buckets = vec![None; new_buckets];
        for (index, head) in self.buckets.iter().enumerate() {
            let mut low: Option<Link> = None;
            let mut high: Option<Link> = None;

            let mut cursor = *head;
            while let Some(link) = cursor {
                cursor = self.words[link.slot.get()].chain_next();

                let target = if link.fragment & split_bit == 0 {
                    &mut low
                } else {
                    &mut high
                };
                self.words[link.slot.get()] = SlotWord::Chained { next: *target };
                *target = Some(Link {
                    slot: link.slot,
                    fragment: link.fragment & !new_mask,
                });
            }

            buckets[index] = low;
            buckets[index + old_buckets] = high;
        }

        self.buckets = buckets;
        self.entries.resize_with(threshold, || None);
        self.words.resize(threshold, SlotWord::Free);
        self.order.on_resize(threshold);

        tracing::trace!(
            from = old_buckets,
            to = new_buckets,
            len = self.len,
            "grew bucket index"
        );
    }

    /// Reserves room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len.saturating_add(additional);
        while self.capacity() < required {
            self.grow();
        }
    }

    /// Compacts the arena and shrinks the index as much as the load factor
    /// allows, never below 16 buckets.
    ///
    /// Occupied slots above `len` are moved into tombstoned holes (reported
    /// through [`SlotOrder::on_relocate`]), so slot ids may change. The index
    /// is rebuilt from stored hash fragments; keys are not rehashed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chain_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64, ()> = HashTable::new();
    /// for k in 0..1000u64 {
    ///     table.entry(k, |&x| x == k).or_insert(k, ());
    /// }
    /// for k in 10..1000u64 {
    ///     table.remove(k, |&x| x == k);
    /// }
    ///
    /// table.shrink_to_fit();
    /// assert_eq!(table.buckets(), 16);
    /// assert_eq!(table.len(), 10);
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let needed = self.len.max(1);
        let mut buckets = DEFAULT_INITIAL_CAPACITY;
        while buckets < self.buckets.len() && threshold_for(buckets, self.load_factor) < needed {
            buckets <<= 1;
        }

        if buckets == self.buckets.len() && self.first_empty == self.len {
            return;
        }
        self.rebuild(buckets);
    }

    fn rebuild(&mut self, new_buckets: usize) {
        // A bucket index plus the stored fragment is the full mixed hash.
        let mut hashes = vec![0u32; self.first_empty];
        for bucket in 0..self.buckets.len() {
            for link in self.chain(bucket) {
                hashes[link.slot.get()] = link.fragment | bucket as u32;
            }
        }

        let mut relocated = 0usize;
        let mut high = self.first_empty;
        for low in 0..self.len {
            if self.words[low].is_occupied() {
                continue;
            }
            loop {
                high -= 1;
                if self.words[high].is_occupied() {
                    break;
                }
            }
            debug_assert!(high >= self.len);

            self.entries.swap(low, high);
            hashes[low] = hashes[high];
            self.words[low] = self.words[high];
            self.words[high] = SlotWord::Free;
            self.order
                .on_relocate(SlotIndex::new(high), SlotIndex::new(low));
            relocated += 1;
        }

        let threshold = threshold_for(new_buckets, self.load_factor);
        let mask = (new_buckets - 1) as u32;
        debug_assert!(threshold >= self.len);

        self.entries.resize_with(threshold, || None);
        self.words.clear();
        self.words.resize(threshold, SlotWord::Free);
        self.buckets.clear();
        self.buckets.resize(new_buckets, None);

        for (slot, &hash) in hashes.iter().enumerate().take(self.len) {
            let bucket = (hash & mask) as usize;
            self.words[slot] = SlotWord::Chained {
                next: self.buckets[bucket],
            };
            self.buckets[bucket] = Some(Link {
                slot: SlotIndex::new(slot),
                fragment: hash & !mask,
            });
        }

        self.first_empty = self.len;
        self.first_deleted = None;
        self.order.on_resize(threshold);
        self.bump();

        tracing::trace!(
            buckets = new_buckets,
            len = self.len,
            relocated,
            "compacted table"
        );
    }

    /// Removes all entries, keeping the current capacity.
    pub fn clear(&mut self) {
        for entry in &mut self.entries[..self.first_empty] {
            *entry = None;
        }
        self.words[..self.first_empty].fill(SlotWord::Free);
        self.buckets.fill(None);

        self.len = 0;
        self.first_empty = 0;
        self.first_deleted = None;
        self.bump();
        self.order.on_clear();
    }

    /// Returns an iterator over `(slot, key, value)` in the table's order.
    pub fn iter(&self) -> Iter<'_, K, V, O> {
        Iter {
            table: self,
            next: self.order.first(self.occupancy()),
            remaining: self.len,
        }
    }

    /// Removes and yields every entry in the table's order.
    ///
    /// The table is emptied as soon as the drain is created. Pairs the
    /// iterator does not yield are dropped with it, and leaking the iterator
    /// leaks them without touching the table.
    pub fn drain(&mut self) -> Drain<'_, K, V, O> {
        let mut slots = Vec::with_capacity(self.len);
        let mut next = self.order.first(self.occupancy());
        while let Some(slot) = next {
            slots.push(slot);
            next = self.order.next(self.occupancy(), slot);
        }

        let mut entries = Vec::with_capacity(self.entries.len());
        entries.resize_with(self.entries.len(), || None);
        let entries = core::mem::replace(&mut self.entries, entries);
        self.clear();

        Drain {
            entries,
            slots: slots.into_iter(),
            marker: PhantomData,
        }
    }

    /// Keeps only the pairs for which `f` returns `true`, visiting them in
    /// the table's order. `hash` must return the hash each key was inserted
    /// with.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool, hash: impl Fn(&K) -> u64) {
        let mut next = self.order.first(self.occupancy());
        while let Some(slot) = next {
            next = self.order.next(self.occupancy(), slot);

            let (key, value) = self.occupied_mut(slot);
            if !f(key, value) {
                let hash = hash(key);
                let removed = self.remove_slot(slot, hash);
                debug_assert!(removed.is_some(), "slot {} is not chained", slot.get());
            }
        }
    }

    /// Creates a detached cursor positioned before the first entry.
    ///
    /// Unlike [`iter`](Self::iter), a cursor does not borrow the table, so
    /// the table can be modified while it is alive. Any structural change
    /// not made through [`cursor_remove`](Self::cursor_remove) invalidates
    /// it.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            next: self.order.first(self.occupancy()),
            current: None,
            expected: self.mod_count,
        }
    }

    /// Advances `cursor` and returns the slot it now points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrentModification`] if the table changed
    /// structurally since the cursor was created or last removed through.
    pub fn cursor_next(&self, cursor: &mut Cursor) -> Result<Option<SlotIndex>, Error> {
        if cursor.expected != self.mod_count {
            return Err(Error::ConcurrentModification);
        }

        cursor.current = cursor.next;
        let Some(slot) = cursor.next else {
            return Ok(None);
        };
        cursor.next = self.order.next(self.occupancy(), slot);
        Ok(Some(slot))
    }

    /// Removes the entry `cursor` last returned. `hash` computes the hash of
    /// its key. Returns `Ok(None)` if there is no such entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrentModification`] if the table changed
    /// structurally behind the cursor's back.
    pub fn cursor_remove(
        &mut self,
        cursor: &mut Cursor,
        hash: impl FnOnce(&K) -> u64,
    ) -> Result<Option<(K, V)>, Error> {
        if cursor.expected != self.mod_count {
            return Err(Error::ConcurrentModification);
        }

        let Some(slot) = cursor.current.take() else {
            return Ok(None);
        };
        let Some(Some((key, _))) = self.entries.get(slot.get()) else {
            return Ok(None);
        };

        let hash = hash(key);
        let removed = self.remove_slot(slot, hash);
        cursor.expected = self.mod_count;
        Ok(removed)
    }

    /// Returns the number of buckets with each chain length: index `n` holds
    /// the count of buckets whose chain has `n` elements.
    #[cfg(any(test, feature = "stats"))]
    pub fn chain_histogram(&self) -> Vec<usize> {
        let mut hist = vec![0usize; 1];
        for bucket in 0..self.buckets.len() {
            let length = self.chain(bucket).count();
            if length >= hist.len() {
                hist.resize(length + 1, 0);
            }
            hist[length] += 1;
        }
        hist
    }

    /// Returns chain and slot statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.chain_histogram();
        let used_buckets = self.buckets.len() - hist[0];

        DebugStats {
            len: self.len,
            capacity: self.capacity(),
            buckets: self.buckets.len(),
            used_buckets,
            longest_chain: hist.len() - 1,
            tombstones: self.first_empty - self.len,
            never_used: self.capacity() - self.first_empty,
            load: self.len as f64 / self.capacity() as f64,
            average_chain: if used_buckets == 0 {
                0.0
            } else {
                self.len as f64 / used_buckets as f64
            },
        }
    }

    /// Pretty-prints the chain-length histogram as a horizontal bar chart.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_chain_histogram(&self) {
        let hist = self.chain_histogram();
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("chain histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!(
            "chain histogram ({} entries, {} buckets):",
            self.len,
            self.buckets.len()
        );
        for (length, &count) in hist.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{:>3} | {} ({})", length, "█".repeat(width), count);
        }
    }

    /// Runs a full consistency pass over the index, the free list and the
    /// ordering strategy. `hash` must be the hash function the entries were
    /// inserted with.
    #[cfg(any(test, feature = "stats"))]
    pub fn check_invariants(&self, hash: impl Fn(&K) -> u64) -> Result<(), InvariantViolation> {
        let buckets = self.buckets.len();
        let threshold = self.entries.len();
        if !buckets.is_power_of_two() || threshold == 0 || self.words.len() != threshold {
            return Err(InvariantViolation::Geometry {
                buckets,
                slots: threshold,
            });
        }
        if self.len > self.first_empty || self.first_empty > threshold {
            return Err(InvariantViolation::Watermark {
                len: self.len,
                first_empty: self.first_empty,
                threshold,
            });
        }

        let mask = self.mask();
        let mut seen = vec![false; threshold];
        let mut reachable = 0usize;
        for bucket in 0..buckets {
            let mut steps = 0usize;
            for link in self.chain(bucket) {
                steps += 1;
                if steps > self.len {
                    return Err(InvariantViolation::UnterminatedChain { bucket });
                }

                let slot = link.slot.get();
                let key = match self.entries.get(slot) {
                    Some(Some((key, _))) if slot < self.first_empty && !seen[slot] => key,
                    _ => return Err(InvariantViolation::DanglingLink { bucket, slot }),
                };
                seen[slot] = true;

                let full = spread(hash(key));
                if (full & mask) as usize != bucket || link.fragment != full & !mask {
                    return Err(InvariantViolation::FragmentMismatch {
                        slot,
                        stored: link.fragment,
                        expected: full & !mask,
                    });
                }
                reachable += 1;
            }
        }
        if reachable != self.len {
            return Err(InvariantViolation::LenMismatch {
                reachable,
                len: self.len,
            });
        }

        let expected = self.first_empty - self.len;
        let mut found = 0usize;
        let mut cursor = self.first_deleted;
        while let Some(slot) = cursor {
            found += 1;
            cursor = match self.words.get(slot.get()) {
                Some(SlotWord::Tombstone { next_free })
                    if found <= expected && slot.get() < self.first_empty =>
                {
                    *next_free
                }
                _ => return Err(InvariantViolation::FreeListMiscount { found, expected }),
            };
        }
        if found != expected {
            return Err(InvariantViolation::FreeListMiscount { found, expected });
        }

        let never_used_clean = self.words[self.first_empty..]
            .iter()
            .all(|word| *word == SlotWord::Free)
            && self.entries[self.first_empty..]
                .iter()
                .all(|entry| entry.is_none());
        if !never_used_clean {
            return Err(InvariantViolation::Watermark {
                len: self.len,
                first_empty: self.first_empty,
                threshold,
            });
        }

        self.order.check(self.occupancy(), self.len)
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// Constructed by [`HashTable::entry`].
pub enum Entry<'a, K, V, O> {
    /// The key is not present in the table.
    Vacant(VacantEntry<'a, K, V, O>),
    /// The key is present in the table.
    Occupied(OccupiedEntry<'a, K, V, O>),
}

impl<'a, K, V, O> Entry<'a, K, V, O>
where
    O: SlotOrder,
{
    /// Inserts `key` and `value` if the entry is vacant and returns the
    /// value, existing or new.
    pub fn or_insert(self, key: K, value: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key, value),
        }
    }

    /// Like [`or_insert`](Self::or_insert), building the pair only when the
    /// entry is vacant.
    pub fn or_insert_with(self, default: impl FnOnce() -> (K, V)) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (key, value) = default();
                entry.insert(key, value)
            }
        }
    }

    /// Modifies the value in place if the entry is occupied.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }
}

/// A vacant entry in a [`HashTable`].
pub struct VacantEntry<'a, K, V, O> {
    table: &'a mut HashTable<K, V, O>,
    hash: u32,
}

impl<'a, K, V, O> VacantEntry<'a, K, V, O>
where
    O: SlotOrder,
{
    /// Inserts the pair, growing the table first if it is full, and returns
    /// the slot it landed in.
    pub fn insert_slot(self, key: K, value: V) -> SlotIndex {
        self.table.insert_new(self.hash, key, value)
    }

    /// Inserts the pair and returns a mutable reference to the value.
    pub fn insert(self, key: K, value: V) -> &'a mut V {
        let table = self.table;
        let slot = table.insert_new(self.hash, key, value);
        &mut table.occupied_mut(slot).1
    }
}

/// An occupied entry in a [`HashTable`].
pub struct OccupiedEntry<'a, K, V, O> {
    table: &'a mut HashTable<K, V, O>,
    probe: Probe,
}

impl<'a, K, V, O> OccupiedEntry<'a, K, V, O>
where
    O: SlotOrder,
{
    /// The slot holding the entry.
    pub fn slot(&self) -> SlotIndex {
        self.probe.slot
    }

    /// The key in the entry.
    pub fn key(&self) -> &K {
        &self.table.occupied(self.probe.slot).0
    }

    /// The value in the entry.
    pub fn get(&self) -> &V {
        &self.table.occupied(self.probe.slot).1
    }

    /// A mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.table.occupied_mut(self.probe.slot).1
    }

    /// Converts the entry into a mutable reference to its value.
    pub fn into_mut(self) -> &'a mut V {
        let table = self.table;
        &mut table.occupied_mut(self.probe.slot).1
    }

    /// Replaces the value, notifies the ordering strategy of the update, and
    /// returns the old value.
    pub fn insert(&mut self, value: V) -> V {
        self.table.replace_value(self.probe.slot, value)
    }

    /// Replaces the stored key and returns the old one. The new key must
    /// hash and compare equal to the old key.
    pub fn replace_key(&mut self, key: K) -> K {
        core::mem::replace(&mut self.table.occupied_mut(self.probe.slot).0, key)
    }

    /// Removes the entry and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.table.remove_at(self.probe)
    }

    /// Removes the entry and returns the value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }
}

/// A borrowing iterator over a [`HashTable`], created by
/// [`HashTable::iter`].
pub struct Iter<'a, K, V, O> {
    table: &'a HashTable<K, V, O>,
    next: Option<SlotIndex>,
    remaining: usize,
}

impl<'a, K, V, O> Iterator for Iter<'a, K, V, O>
where
    O: SlotOrder,
{
    type Item = (SlotIndex, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let table = self.table;
        self.next = table.order.next(table.occupancy(), slot);
        self.remaining -= 1;

        let (key, value) = table.occupied(slot);
        Some((slot, key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, O> ExactSizeIterator for Iter<'_, K, V, O> where O: SlotOrder {}

impl<K, V, O> FusedIterator for Iter<'_, K, V, O> where O: SlotOrder {}

/// A draining iterator over a [`HashTable`], created by
/// [`HashTable::drain`].
pub struct Drain<'a, K, V, O>
where
    O: SlotOrder,
{
    entries: Vec<Option<(K, V)>>,
    slots: vec::IntoIter<SlotIndex>,
    marker: PhantomData<&'a mut HashTable<K, V, O>>,
}

impl<K, V, O> Iterator for Drain<'_, K, V, O>
where
    O: SlotOrder,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slots.next()?;
        self.entries[slot.get()].take()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl<K, V, O> ExactSizeIterator for Drain<'_, K, V, O> where O: SlotOrder {}

impl<K, V, O> FusedIterator for Drain<'_, K, V, O> where O: SlotOrder {}

/// An owning iterator over a [`HashTable`], yielding pairs in the table's
/// order.
pub struct IntoIter<K, V, O> {
    table: HashTable<K, V, O>,
    next: Option<SlotIndex>,
    remaining: usize,
}

impl<K, V, O> Iterator for IntoIter<K, V, O>
where
    O: SlotOrder,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        self.next = self.table.order.next(self.table.occupancy(), slot);
        self.remaining -= 1;
        self.table.entries[slot.get()].take()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, O> ExactSizeIterator for IntoIter<K, V, O> where O: SlotOrder {}

impl<K, V, O> IntoIterator for HashTable<K, V, O>
where
    O: SlotOrder,
{
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, O>;

    fn into_iter(self) -> Self::IntoIter {
        let next = self.order.first(self.occupancy());
        let remaining = self.len;
        IntoIter {
            table: self,
            next,
            remaining,
        }
    }
}

/// A detached iteration position over a [`HashTable`].
///
/// Created by [`HashTable::cursor`] and advanced with
/// [`HashTable::cursor_next`]. A cursor remembers the table's structural
/// change count and refuses to advance once it no longer matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    next: Option<SlotIndex>,
    current: Option<SlotIndex>,
    expected: u64,
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn hash_string_key(state: &HashState, key: &str) -> u64 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        h.finish()
    }

    fn insert(state: &HashState, table: &mut HashTable<u64, i32>, k: u64, v: i32) -> SlotIndex {
        match table.entry(hash_key(state, k), |&x| x == k) {
            Entry::Vacant(entry) => entry.insert_slot(k, v),
            Entry::Occupied(_) => panic!("unexpected occupied for {k}: {table:#?}"),
        }
    }

    #[test]
    fn spread_matches_reference_mix() {
        assert_eq!(spread(0), 0);
        let h: u32 = 0x1234_5678;
        let expected = h ^ (h >> 20) ^ (h >> 12) ^ (h >> 7) ^ (h >> 4);
        assert_eq!(spread(h as u64), expected);
        // The high word folds into the low word.
        assert_eq!(spread(1u64 << 32), spread(1));
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..32u64 {
            insert(&state, &mut table, k, (k as i32) * 2);
            let hash = hash_key(&state, k);
            assert_eq!(
                table.get(hash, |&x| x == k),
                Some((&k, &((k as i32) * 2))),
                "{:#?}",
                table
            );
        }

        assert_eq!(table.len(), 32);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.get(hash, |&x| x == k).map(|(_, v)| *v), Some(k as i32 * 2));
        }

        let miss_hash = hash_key(&state, 999);
        assert!(table.get(miss_hash, |&x| x == 999).is_none());
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        let k = 42u64;
        let hash = hash_key(&state, k);
        insert(&state, &mut table, k, 7);

        match table.entry(hash, |&x| x == k) {
            Entry::Occupied(mut occ) => {
                assert_eq!(occ.key(), &42);
                let prev = occ.insert(11);
                assert_eq!(prev, 7, "{:#?}", table);
            }
            Entry::Vacant(_) => panic!("should be occupied: {k}#{hash:016X} in {table:#?}"),
        }
        assert_eq!(table.get(hash, |&x| x == k), Some((&42, &11)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn get_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..5u64 {
            insert(&state, &mut table, k, 1);
        }

        for k in 0..5u64 {
            if let Some((_, v)) = table.get_mut(hash_key(&state, k), |&x| x == k) {
                *v += 9;
            }
        }
        for k in 0..5u64 {
            let (_, v) = table.get(hash_key(&state, k), |&x| x == k).unwrap();
            assert_eq!(*v, 10);
        }
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..8u64 {
            insert(&state, &mut table, k, k as i32);
        }
        assert_eq!(table.len(), 8);

        for k in [0u64, 3, 7] {
            let removed = table
                .remove(hash_key(&state, k), |&x| x == k)
                .expect("should remove");
            assert_eq!(removed, (k, k as i32));
        }
        assert_eq!(table.len(), 5);
        assert!(table.remove(hash_key(&state, 1000), |&x| x == 1000).is_none());
        assert!(table.remove(hash_key(&state, 3), |&x| x == 3).is_none());
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<u64, i32> = HashTable::new();
        let hash = 0;
        for k in 0..65u64 {
            match table.entry(hash, |&x| x == k) {
                Entry::Vacant(v) => {
                    v.insert(k, k as i32);
                }
                Entry::Occupied(_) => unreachable!(),
            }
        }

        assert_eq!(table.len(), 65);
        assert_eq!(table.debug_stats().longest_chain, 65);
        for k in 0..65u64 {
            assert_eq!(
                table.get(hash, |&x| x == k),
                Some((&k, &(k as i32))),
                "{:#?}",
                table
            );
        }

        // Head, middle and tail of one long chain.
        for k in [64u64, 30, 0] {
            assert_eq!(table.remove(hash, |&x| x == k), Some((k, k as i32)));
        }
        assert_eq!(table.len(), 62);
        table.check_invariants(|_| 0).unwrap();
        for k in (1..64u64).filter(|k| *k != 30) {
            assert!(table.find(hash, |&x| x == k).is_some());
        }
    }

    #[test]
    fn thirteen_inserts_grow_exactly_once() {
        let state = HashState::default();
        let config = Config::new().initial_capacity(16).load_factor(0.75);
        let mut table: HashTable<u64, i32> = HashTable::with_config(config, ArenaOrder).unwrap();
        assert_eq!(table.buckets(), 16);
        assert_eq!(table.capacity(), 12);

        for k in 0..12u64 {
            insert(&state, &mut table, k, k as i32);
        }
        assert_eq!(table.buckets(), 16);

        insert(&state, &mut table, 12, 12);
        assert_eq!(table.buckets(), 32);
        assert_eq!(table.capacity(), 24);

        for k in 0..13u64 {
            assert_eq!(
                table.get(hash_key(&state, k), |&x| x == k),
                Some((&k, &(k as i32)))
            );
        }
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn growth_keeps_every_key_across_many_thresholds() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..5000u64 {
            insert(&state, &mut table, k, k as i32);
        }
        assert_eq!(table.buckets(), 8192);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
        for k in 0..5000u64 {
            assert_eq!(
                table.get(hash_key(&state, k), |&x| x == k).map(|(_, v)| *v),
                Some(k as i32)
            );
        }
    }

    #[test]
    fn tombstones_are_reused_last_in_first_out() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        let slots: Vec<SlotIndex> = (0..6u64)
            .map(|k| insert(&state, &mut table, k, 0))
            .collect();
        assert_eq!(slots, (0..6).map(SlotIndex::new).collect::<Vec<_>>());

        table.remove(hash_key(&state, 1), |&x| x == 1).unwrap();
        table.remove(hash_key(&state, 3), |&x| x == 3).unwrap();
        assert_eq!(table.debug_stats().tombstones, 2);

        assert_eq!(insert(&state, &mut table, 100, 0), SlotIndex::new(3));
        assert_eq!(insert(&state, &mut table, 101, 0), SlotIndex::new(1));
        assert_eq!(insert(&state, &mut table, 102, 0), SlotIndex::new(6));
        assert_eq!(table.debug_stats().tombstones, 0);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn removing_last_allocated_slot_retracts_watermark() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..3u64 {
            insert(&state, &mut table, k, 0);
        }

        table.remove(hash_key(&state, 2), |&x| x == 2).unwrap();
        let stats = table.debug_stats();
        assert_eq!(stats.tombstones, 0);
        assert_eq!(stats.never_used, table.capacity() - 2);

        assert_eq!(insert(&state, &mut table, 9, 0), SlotIndex::new(2));
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn deletion_frees_capacity_for_new_keys() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..12u64 {
            insert(&state, &mut table, k, 0);
        }
        for k in 0..12u64 {
            table.remove(hash_key(&state, k), |&x| x == k).unwrap();
        }
        for k in 100..112u64 {
            insert(&state, &mut table, k, 1);
        }
        assert_eq!(table.buckets(), 16);
        assert_eq!(table.len(), 12);

        // Churn well past the threshold without ever exceeding it.
        for round in 0..50u64 {
            let victim = 100 + (round % 12);
            let fresh = 1000 + round;
            if table.remove(hash_key(&state, victim), |&x| x == victim).is_some() {
                insert(&state, &mut table, fresh, 2);
            }
        }
        assert_eq!(table.buckets(), 16);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn arena_order_iteration_follows_slots() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..6u64 {
            insert(&state, &mut table, k, k as i32);
        }
        table.remove(hash_key(&state, 2), |&x| x == 2).unwrap();
        insert(&state, &mut table, 42, 42);

        let keys: Vec<u64> = table.iter().map(|(_, k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 42, 3, 4, 5]);
        assert_eq!(table.iter().len(), 6);
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 10..20u64 {
            insert(&state, &mut table, k, (k as i32) + 1);
        }
        let collected: Vec<u64> = table.iter().map(|(_, k, _)| *k).collect();
        assert_eq!(collected.len(), 10, "{:#?}", table);
        for k in 10..20u64 {
            assert!(collected.contains(&k));
        }

        let drained: Vec<(u64, i32)> = table.drain().collect();
        assert_eq!(drained.len(), 10);
        assert_eq!(table.len(), 0);
        for k in 10..20u64 {
            assert!(table.find(hash_key(&state, k), |&x| x == k).is_none());
        }
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn into_iter_yields_every_pair() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..30u64 {
            insert(&state, &mut table, k, k as i32);
        }
        table.remove(hash_key(&state, 4), |&x| x == 4).unwrap();

        let iter = table.into_iter();
        assert_eq!(iter.len(), 29);
        let mut pairs: Vec<(u64, i32)> = iter.collect();
        pairs.sort();
        let expected: Vec<(u64, i32)> = (0..30u64)
            .filter(|&k| k != 4)
            .map(|k| (k, k as i32))
            .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn dropped_drain_still_empties_table() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..10u64 {
            insert(&state, &mut table, k, 0);
        }
        {
            let mut drain = table.drain();
            assert!(drain.next().is_some());
        }
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
        insert(&state, &mut table, 3, 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn leaked_drain_leaves_table_consistent() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..4u64 {
            insert(&state, &mut table, k, k as i32);
        }

        let mut drain = table.drain();
        assert_eq!(drain.len(), 4);
        assert!(drain.next().is_some());
        assert_eq!(drain.len(), 3);
        core::mem::forget(drain);

        let contained = (0..4u64)
            .filter(|&k| table.find(hash_key(&state, k), |&x| x == k).is_some())
            .count();
        assert_eq!(table.len(), contained);
        assert_eq!(table.len(), 0);
        assert_eq!(table.iter().count(), 0);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();

        for k in 10..30u64 {
            insert(&state, &mut table, k, k as i32);
        }
        assert_eq!(table.iter().count(), 20);
        assert_eq!(table.len(), 20);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn retain_removes_in_table_order() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..40u64 {
            insert(&state, &mut table, k, k as i32);
        }
        table.remove(hash_key(&state, 5), |&x| x == 5).unwrap();

        let mut visited = Vec::new();
        table.retain(
            |&k, v| {
                visited.push(k);
                *v += 1;
                k % 3 != 0
            },
            |&k| hash_key(&state, k),
        );

        assert_eq!(visited.len(), 39);
        assert!(visited.windows(2).all(|w| w[0] < w[1]), "{visited:?}");
        assert_eq!(table.len(), (0..40u64).filter(|&k| k != 5 && k % 3 != 0).count());
        for k in 0..40u64 {
            let found = table.get(hash_key(&state, k), |&x| x == k);
            if k == 5 || k % 3 == 0 {
                assert!(found.is_none(), "{k}");
            } else {
                assert_eq!(found, Some((&k, &(k as i32 + 1))));
            }
        }
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn cursor_detects_structural_change() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..4u64 {
            insert(&state, &mut table, k, 0);
        }

        let mut cursor = table.cursor();
        assert_eq!(table.cursor_next(&mut cursor), Ok(Some(SlotIndex::new(0))));

        insert(&state, &mut table, 99, 0);
        assert_eq!(
            table.cursor_next(&mut cursor),
            Err(Error::ConcurrentModification)
        );
    }

    #[test]
    fn value_update_is_not_structural() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        insert(&state, &mut table, 1, 0);
        insert(&state, &mut table, 2, 0);

        let mut cursor = table.cursor();
        table.cursor_next(&mut cursor).unwrap();
        if let Entry::Occupied(mut entry) = table.entry(hash_key(&state, 1), |&x| x == 1) {
            entry.insert(5);
        }
        assert!(table.cursor_next(&mut cursor).is_ok());
    }

    #[test]
    fn cursor_remove_keeps_iterating() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..20u64 {
            insert(&state, &mut table, k, k as i32);
        }

        let mut cursor = table.cursor();
        let mut visited = 0;
        while let Some(slot) = table.cursor_next(&mut cursor).unwrap() {
            visited += 1;
            let (key, _) = table.slot(slot).unwrap();
            if key % 2 == 0 {
                let removed = table
                    .cursor_remove(&mut cursor, |&k| hash_key(&state, k))
                    .unwrap();
                assert!(removed.is_some());
            }
        }
        assert_eq!(visited, 20);
        assert_eq!(table.len(), 10);
        assert!(table.iter().all(|(_, k, _)| k % 2 == 1));

        // Nothing left to remove once the cursor is exhausted.
        assert_eq!(
            table.cursor_remove(&mut cursor, |&k| hash_key(&state, k)),
            Ok(None)
        );
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn clear_keeps_capacity() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..100u64 {
            insert(&state, &mut table, k, 0);
        }
        let buckets = table.buckets();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.buckets(), buckets);
        assert_eq!(table.debug_stats().never_used, table.capacity());
        for k in 0..100u64 {
            assert!(table.find(hash_key(&state, k), |&x| x == k).is_none());
        }
        assert_eq!(insert(&state, &mut table, 7, 0), SlotIndex::new(0));
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn shrink_to_fit_compacts_and_rebuilds() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..200u64 {
            insert(&state, &mut table, k, k as i32);
        }
        for k in (0..200u64).filter(|k| k % 20 != 0) {
            table.remove(hash_key(&state, k), |&x| x == k).unwrap();
        }
        assert_eq!(table.len(), 10);

        table.shrink_to_fit();
        assert_eq!(table.buckets(), 16);
        assert_eq!(table.capacity(), 12);
        let stats = table.debug_stats();
        assert_eq!(stats.tombstones, 0);
        assert_eq!(stats.never_used, 2);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();

        for k in (0..200u64).step_by(20) {
            assert_eq!(
                table.get(hash_key(&state, k), |&x| x == k),
                Some((&k, &(k as i32)))
            );
        }
        let keys: Vec<u64> = table.iter().map(|(_, k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys.len(), 10);
        assert_eq!(sorted, (0..200u64).step_by(20).collect::<Vec<_>>());
    }

    #[test]
    fn shrink_to_fit_empty_table() {
        let mut table: HashTable<u64, i32> = HashTable::with_capacity(1024);
        table.shrink_to_fit();
        assert_eq!(table.buckets(), 16);
        assert_eq!(table.capacity(), 12);
        table.check_invariants(|_| 0).unwrap();
    }

    #[test]
    fn reserve_grows_ahead_of_time() {
        let mut table: HashTable<u64, i32> = HashTable::new();
        table.reserve(100);
        assert!(table.capacity() >= 100);
        assert_eq!(table.buckets(), 256);
        table.reserve(10);
        assert_eq!(table.buckets(), 256);
    }

    #[test]
    fn config_rejects_bad_load_factors() {
        for lf in [f32::NAN, f32::INFINITY, 0.0, -0.5, 1.5] {
            let result = HashTable::<u64, i32>::with_config(Config::new().load_factor(lf), ArenaOrder);
            let err = result.unwrap_err();
            assert!(matches!(err, Error::InvalidLoadFactor(_)), "{err}");
            assert!(err.is_configuration());
        }

        let err = HashTable::<u64, i32>::with_config(Config::new().load_factor(0.05), ArenaOrder)
            .unwrap_err();
        assert_eq!(
            err,
            Error::ZeroThreshold {
                load_factor: 0.05,
                buckets: 16
            }
        );
        assert!(err.is_configuration());
        assert!(!Error::ConcurrentModification.is_configuration());

        let table =
            HashTable::<u64, i32>::with_config(Config::new().load_factor(1.0), ArenaOrder).unwrap();
        assert_eq!(table.capacity(), 16);
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        assert_eq!(HashTable::<u8, u8>::with_capacity(0).buckets(), 16);
        assert_eq!(HashTable::<u8, u8>::with_capacity(16).buckets(), 16);
        assert_eq!(HashTable::<u8, u8>::with_capacity(17).buckets(), 32);
        assert_eq!(HashTable::<u8, u8>::with_capacity(1000).buckets(), 1024);
    }

    #[test]
    fn clone_is_independent() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..20u64 {
            insert(&state, &mut table, k, k as i32);
        }
        let mut copy = table.clone();
        copy.remove(hash_key(&state, 5), |&x| x == 5).unwrap();
        insert(&state, &mut copy, 500, 0);

        assert_eq!(table.len(), 20);
        assert!(table.find(hash_key(&state, 5), |&x| x == 5).is_some());
        assert!(table.find(hash_key(&state, 500), |&x| x == 500).is_none());
        assert_eq!(copy.len(), 20);
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
        copy.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn string_keys() {
        let state = HashState::default();
        let mut table: HashTable<String, usize> = HashTable::new();
        let keys = ["hello", "world", "foo", "bar", "baz"];
        for (i, k) in keys.iter().enumerate() {
            table
                .entry(hash_string_key(&state, k), |x| x == *k)
                .or_insert_with(|| (k.to_string(), i));
        }
        assert_eq!(table.len(), keys.len());

        let removed = table.remove(hash_string_key(&state, "foo"), |x| x == "foo");
        assert_eq!(removed, Some(("foo".to_string(), 2)));
        for (i, k) in keys.iter().enumerate().filter(|(_, k)| **k != "foo") {
            assert_eq!(
                table
                    .get(hash_string_key(&state, k), |x| x == *k)
                    .map(|(_, v)| *v),
                Some(i)
            );
        }
        table
            .check_invariants(|k| hash_string_key(&state, k))
            .unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn randomized_against_hashbrown() {
        let state = HashState::default();
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        let mut table: HashTable<u64, u64> = HashTable::new();
        let mut model = hashbrown::HashMap::new();

        for step in 0..20_000u32 {
            let key = rng.random_range(0..2_000u64);
            let hash = hash_key(&state, key);
            match rng.random_range(0..10u8) {
                0..=5 => {
                    let value = rng.random::<u64>();
                    let old = match table.entry(hash, |&x| x == key) {
                        Entry::Occupied(mut entry) => Some(entry.insert(value)),
                        Entry::Vacant(entry) => {
                            entry.insert(key, value);
                            None
                        }
                    };
                    assert_eq!(old, model.insert(key, value));
                }
                6..=8 => {
                    assert_eq!(
                        table.remove(hash, |&x| x == key).map(|(_, v)| v),
                        model.remove(&key)
                    );
                }
                _ => {
                    assert_eq!(
                        table.get(hash, |&x| x == key).map(|(_, v)| *v),
                        model.get(&key).copied()
                    );
                }
            }
            assert_eq!(table.len(), model.len());
            if step % 1000 == 0 {
                table
                    .check_invariants(|&k| hash_key(&state, k))
                    .unwrap();
            }
        }

        for (key, value) in &model {
            assert_eq!(
                table.get(hash_key(&state, *key), |x| x == key).map(|(_, v)| v),
                Some(value)
            );
        }
        table.check_invariants(|&k| hash_key(&state, k)).unwrap();
    }

    #[test]
    fn corrupted_fragment_is_reported() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::new();
        insert(&state, &mut table, 1, 1);
        let bucket = table.buckets.iter().position(Option::is_some).unwrap();
        if let Some(link) = &mut table.buckets[bucket] {
            link.fragment ^= 1 << 31;
        }
        assert!(matches!(
            table.check_invariants(|&k| hash_key(&state, k)),
            Err(InvariantViolation::FragmentMismatch { .. })
        ));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[cfg(feature = "std")]
    fn histogram_output() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::with_capacity(1 << 14);
        for k in 0..table.capacity() as u64 {
            insert(&state, &mut table, k, k as i32);
        }
        let hist = table.chain_histogram();
        assert_eq!(
            hist.iter().enumerate().map(|(n, c)| n * c).sum::<usize>(),
            table.len()
        );
        assert_eq!(hist.iter().sum::<usize>(), table.buckets());

        table.print_chain_histogram();
        table.debug_stats().print();
    }
}
