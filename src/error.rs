//! Error types for the `chain-hash` crate

/// Errors reported by table construction and by cursors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The load factor is NaN, infinite, or outside `(0, 1]`.
    #[error("illegal load factor {0}: expected a finite value in (0, 1]")]
    InvalidLoadFactor(f32),

    /// The load factor is valid but leaves no usable slots for the requested
    /// bucket count.
    #[error("load factor {load_factor} yields no usable slots for {buckets} buckets")]
    ZeroThreshold {
        /// The rejected load factor.
        load_factor: f32,
        /// The bucket count the capacity was rounded up to.
        buckets: usize,
    },

    /// The table was structurally modified after a [`Cursor`] was created,
    /// other than through the cursor's own removal primitive.
    ///
    /// Iteration cannot continue; create a new cursor to restart.
    ///
    /// [`Cursor`]: crate::hash_table::Cursor
    #[error("table was structurally modified during iteration")]
    ConcurrentModification,
}

impl Error {
    /// Returns `true` for errors raised while validating a [`Config`].
    ///
    /// [`Config`]: crate::Config
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidLoadFactor(_) | Error::ZeroThreshold { .. }
        )
    }
}

/// A broken internal invariant found by the diagnostic consistency pass.
///
/// Never produced by correct use of the public API; see
/// [`HashTable::check_invariants`].
///
/// [`HashTable::check_invariants`]: crate::HashTable::check_invariants
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InvariantViolation {
    /// The bucket count is not a power of two, or the slot count is zero.
    #[error("bad geometry: {buckets} buckets, {slots} slots")]
    Geometry {
        /// Number of buckets.
        buckets: usize,
        /// Number of slots.
        slots: usize,
    },

    /// `len <= first_empty <= threshold` does not hold.
    #[error("watermarks out of order: len {len}, first empty {first_empty}, threshold {threshold}")]
    Watermark {
        /// Occupied slot count.
        len: usize,
        /// Start of the never-used region.
        first_empty: usize,
        /// Slot capacity.
        threshold: usize,
    },

    /// A chain reaches a slot that is not occupied.
    #[error("bucket {bucket} links to unoccupied slot {slot}")]
    DanglingLink {
        /// Bucket whose chain is broken.
        bucket: usize,
        /// Slot the chain points at.
        slot: usize,
    },

    /// A chain is longer than the number of occupied slots, so it cannot
    /// terminate.
    #[error("chain of bucket {bucket} does not terminate")]
    UnterminatedChain {
        /// Bucket whose chain loops.
        bucket: usize,
    },

    /// A stored hash fragment disagrees with the bucket mask or with the
    /// key's hash.
    #[error("slot {slot} stores fragment {stored:#010x}, expected {expected:#010x}")]
    FragmentMismatch {
        /// Slot holding the key.
        slot: usize,
        /// Fragment found in the index.
        stored: u32,
        /// Fragment derived from the key's hash.
        expected: u32,
    },

    /// The number of slots reachable from buckets differs from `len`.
    #[error("{reachable} slots reachable from buckets, len is {len}")]
    LenMismatch {
        /// Slots found by walking every chain.
        reachable: usize,
        /// Recorded occupied count.
        len: usize,
    },

    /// The tombstone list is malformed or has the wrong length.
    #[error("tombstone list holds {found} slots, expected {expected}")]
    FreeListMiscount {
        /// Slots found on the list.
        found: usize,
        /// `first_empty - len`.
        expected: usize,
    },

    /// The order overlay does not form one cycle over exactly the occupied
    /// slots.
    #[error("order overlay broken at slot {slot}: {reason}")]
    OrderOverlay {
        /// Slot where the inconsistency was detected.
        slot: usize,
        /// What was wrong.
        reason: &'static str,
    },
}
