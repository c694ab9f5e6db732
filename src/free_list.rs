//! The free list: dead slots available for reuse, ordered by `(size, offset)`.
//!
//! Kept as a plain `BTreeMap` keyed by `(size, offset)` rather than a `BTreeSet` of slots
//! so that a best-fit search is just a `range` query starting at `(need, 0)`.

use crate::slot::SlotRef;
use std::collections::BTreeMap;

/// Dead slots sorted by size then offset, ready for reuse by the allocator.
#[derive(Default)]
pub struct FreeList {
	entries: BTreeMap<(u32, u64), SlotRef>,
}

impl FreeList {
	/// Creates an empty free list.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of dead slots currently tracked.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether the free list is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Inserts a slot that has just been freed.
	pub fn insert(&mut self, slot: SlotRef) {
		let key = (slot.slot.size, slot.slot.offset);
		self.entries.insert(key, slot);
	}

	/// Removes every slot, returning them for the caller to wait-unlocked and drop.
	pub fn drain(&mut self) -> Vec<SlotRef> {
		std::mem::take(&mut self.entries)
			.into_values()
			.collect()
	}

	/// Finds the best-fit candidate for `need` bytes: the smallest slot whose size is at
	/// least `need`, skipping any slot still held by an in-flight reader. Removes and
	/// returns the first qualifying candidate, or `None` if no unlocked slot is big enough.
	pub fn take_best_fit(&mut self, need: u32) -> Option<SlotRef> {
		let candidate_key = self
			.entries
			.range((need, 0)..)
			.find(|(_, slot)| !slot.lock.is_locked())
			.map(|(key, _)| *key)?;
		self.entries.remove(&candidate_key)
	}

	/// Iterator over the free list in `(size, offset)` order, for invariant checks and tests.
	pub fn iter(&self) -> impl Iterator<Item = &SlotRef> {
		self.entries.values()
	}
}
