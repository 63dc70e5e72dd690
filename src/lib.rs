#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;

pub mod hash_table;

pub mod linked_order;

/// A hash map built on the bucket-chain [`HashTable`].
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

pub mod linked_hash_map;

/// A hash set built on the bucket-chain [`HashTable`].
///
/// Elements are stored as keys with unit values.
pub mod hash_set;

pub use error::Error;
pub use error::InvariantViolation;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::ArenaOrder;
pub use hash_table::Config;
pub use hash_table::Cursor;
#[cfg(any(test, feature = "stats"))]
pub use hash_table::DebugStats;
pub use hash_table::HashTable;
pub use hash_table::SlotIndex;
pub use hash_table::SlotOrder;
pub use linked_hash_map::EvictionPolicy;
pub use linked_hash_map::LinkedHashMap;
pub use linked_hash_map::MaxEntries;
pub use linked_hash_map::NeverEvict;
pub use linked_order::LinkedOrder;
pub use linked_order::OrderMode;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used when none is named.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used when none is named.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    }
}
