//! A doubly linked order overlay for [`HashTable`].
//!
//! [`LinkedOrder`] keeps one `(before, after)` pair per slot, forming a
//! circular list over the occupied slots. The list head is the eldest entry
//! and `head.before` is the newest, so appending is O(1) and iteration
//! visits entries oldest first.
//!
//! [`HashTable`]: crate::HashTable

use alloc::vec::Vec;

use crate::error::InvariantViolation;
use crate::hash_table::Occupancy;
use crate::hash_table::SlotIndex;
use crate::hash_table::SlotOrder;

/// Which events move an entry to the back of a [`LinkedOrder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderMode {
    /// Entries keep the position of their first insertion. Replacing a
    /// value does not move it.
    #[default]
    Insertion,
    /// Every reordering read and every value replacement moves the entry to
    /// the back, so the head is the least recently used entry.
    Access,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Links {
    before: SlotIndex,
    after: SlotIndex,
}

const UNLINKED: Links = Links {
    before: SlotIndex::ZERO,
    after: SlotIndex::ZERO,
};

/// Circular doubly linked list over occupied slots.
///
/// # Examples
///
/// ```rust
/// use chain_hash::hash_table::HashTable;
/// use chain_hash::linked_order::LinkedOrder;
/// use chain_hash::linked_order::OrderMode;
///
/// let mut table: HashTable<u32, (), LinkedOrder> =
///     HashTable::with_capacity_and_order(16, LinkedOrder::new(OrderMode::Access));
/// for k in [1u32, 2, 3] {
///     table.entry(k as u64, |&x| x == k).or_insert(k, ());
/// }
///
/// let slot = table.find(2, |&x| x == 2).unwrap();
/// table.touch(slot);
///
/// let keys: Vec<u32> = table.iter().map(|(_, k, _)| *k).collect();
/// assert_eq!(keys, [1, 3, 2]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct LinkedOrder {
    links: Vec<Links>,
    head: Option<SlotIndex>,
    mode: OrderMode,
}

impl LinkedOrder {
    /// An empty overlay in the given mode.
    pub fn new(mode: OrderMode) -> Self {
        Self {
            links: Vec::new(),
            head: None,
            mode,
        }
    }

    /// The overlay's mode.
    pub fn mode(&self) -> OrderMode {
        self.mode
    }

    /// The oldest slot.
    pub fn front(&self) -> Option<SlotIndex> {
        self.head
    }

    /// The newest slot.
    pub fn back(&self) -> Option<SlotIndex> {
        self.head.map(|head| self.links[head.get()].before)
    }

    fn append(&mut self, slot: SlotIndex) {
        match self.head {
            None => {
                self.links[slot.get()] = Links {
                    before: slot,
                    after: slot,
                };
                self.head = Some(slot);
            }
            Some(head) => {
                let tail = self.links[head.get()].before;
                self.links[slot.get()] = Links {
                    before: tail,
                    after: head,
                };
                self.links[tail.get()].after = slot;
                self.links[head.get()].before = slot;
            }
        }
    }

    fn unlink(&mut self, slot: SlotIndex) {
        let Links { before, after } = self.links[slot.get()];
        if after == slot {
            self.head = None;
            return;
        }

        self.links[before.get()].after = after;
        self.links[after.get()].before = before;
        if self.head == Some(slot) {
            self.head = Some(after);
        }
    }

    fn move_to_back(&mut self, slot: SlotIndex) -> bool {
        if self.mode == OrderMode::Insertion {
            return false;
        }
        self.unlink(slot);
        self.append(slot);
        true
    }
}

impl SlotOrder for LinkedOrder {
    fn on_insert(&mut self, slot: SlotIndex) {
        self.append(slot);
    }

    fn on_update(&mut self, slot: SlotIndex) -> bool {
        self.move_to_back(slot)
    }

    fn on_access(&mut self, slot: SlotIndex) -> bool {
        self.move_to_back(slot)
    }

    fn on_remove(&mut self, slot: SlotIndex) {
        self.unlink(slot);
    }

    fn on_relocate(&mut self, from: SlotIndex, to: SlotIndex) {
        let Links { before, after } = self.links[from.get()];
        if after == from {
            self.links[to.get()] = Links {
                before: to,
                after: to,
            };
        } else {
            self.links[to.get()] = Links { before, after };
            self.links[before.get()].after = to;
            self.links[after.get()].before = to;
        }

        if self.head == Some(from) {
            self.head = Some(to);
        }
    }

    fn on_resize(&mut self, slots: usize) {
        self.links.resize(slots, UNLINKED);
    }

    fn on_clear(&mut self) {
        self.head = None;
    }

    #[inline]
    fn first(&self, _occupancy: Occupancy<'_>) -> Option<SlotIndex> {
        self.head
    }

    #[inline]
    fn next(&self, _occupancy: Occupancy<'_>, slot: SlotIndex) -> Option<SlotIndex> {
        let after = self.links[slot.get()].after;
        if Some(after) == self.head {
            None
        } else {
            Some(after)
        }
    }

    fn eldest(&self) -> Option<SlotIndex> {
        self.head
    }

    fn check(&self, occupancy: Occupancy<'_>, len: usize) -> Result<(), InvariantViolation> {
        let Some(head) = self.head else {
            if len == 0 {
                return Ok(());
            }
            return Err(InvariantViolation::OrderOverlay {
                slot: 0,
                reason: "no head but table is not empty",
            });
        };

        let mut visited = 0usize;
        let mut cursor = head;
        loop {
            if !occupancy.is_occupied(cursor) {
                return Err(InvariantViolation::OrderOverlay {
                    slot: cursor.get(),
                    reason: "links a vacant slot",
                });
            }
            visited += 1;
            if visited > len {
                return Err(InvariantViolation::OrderOverlay {
                    slot: cursor.get(),
                    reason: "cycle is longer than the table",
                });
            }

            let after = self.links[cursor.get()].after;
            if self.links[after.get()].before != cursor {
                return Err(InvariantViolation::OrderOverlay {
                    slot: after.get(),
                    reason: "before link disagrees with after link",
                });
            }
            if after == head {
                break;
            }
            cursor = after;
        }

        if visited != len {
            return Err(InvariantViolation::OrderOverlay {
                slot: head.get(),
                reason: "cycle is shorter than the table",
            });
        }
        Ok(())
    }
}
