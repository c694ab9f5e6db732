//! Resolves "I need N bytes" into a [`SlotRef`], either by reusing a free-list candidate
//! or by extending the file at the append pointer.
//!
//! The append pointer (`file_pos`) and the free list are guarded by the same mutex: both
//! are mutated only while holding this lock, keeping the allocator and the free list under
//! one monitor.

use crate::file_io::FileBackend;
use crate::free_list::FreeList;
use crate::slot::{Slot, SlotHandle, SlotRef, NO_EXPIRY};
use std::sync::{Arc, Mutex};

struct State {
	free: FreeList,
	file_pos: u64,
}

/// Owns the free list and the append pointer, and turns allocation requests into slots.
pub struct Allocator {
	state: Mutex<State>,
}

impl Allocator {
	/// Creates an allocator with an empty free list and the given initial append pointer
	/// (4, just past the magic header, for a freshly created file).
	pub fn new(initial_file_pos: u64) -> Self {
		Self {
			state: Mutex::new(State {
				free: FreeList::new(),
				file_pos: initial_file_pos,
			}),
		}
	}

	/// Current append pointer, for invariant checks and tests.
	pub fn file_pos(&self) -> u64 {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).file_pos
	}

	/// Number of dead slots currently tracked.
	pub fn free_len(&self) -> usize {
		self.state
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.free
			.len()
	}

	/// Resolves `need` bytes into a slot: best-fit from the free list, skipping locked
	/// candidates, falling back to extending the file at the append pointer.
	pub fn allocate(&self, need: u32) -> SlotRef {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(reused) = state.free.take_best_fit(need) {
			return reused;
		}

		let slot = Slot {
			offset: state.file_pos,
			size: need,
			key_len: 0,
			data_len: 0,
			expiry_time: NO_EXPIRY,
		};
		state.file_pos += need as u64;
		Arc::new(SlotHandle::new(slot))
	}

	/// Marks `slot` dead on disk and returns it to the free list.
	///
	/// The on-disk write happens outside the free-list monitor (there is no invariant
	/// requiring it to be synchronized with the free list, only that it happens before the
	/// slot becomes visible to the allocator); the free-list insertion is what requires the
	/// monitor.
	pub fn free(&self, file: &FileBackend, slot: SlotRef) -> std::io::Result<()> {
		file.mark_free(slot.slot.offset)?;
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.free.insert(slot);
		Ok(())
	}

	/// Used during index rebuild: a slot already marked dead on disk is inserted directly,
	/// without re-writing the zeroed `keyLen` field.
	pub fn seed_free(&self, slot: SlotRef) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.free.insert(slot);
	}

	/// Advances the append pointer past a slot discovered during rebuild.
	pub fn observe_rebuilt_slot(&self, slot: &Slot) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.file_pos = state.file_pos.max(slot.end_offset());
	}

	/// Drains every dead slot for `clear()`, holding the allocator's lock across the call
	/// to `f` so that a concurrent `allocate` (which needs the same lock) cannot run
	/// between the drain and the `file_pos` reset. `f` is expected to wait for in-flight
	/// readers on each drained slot and then truncate/reset the underlying file; only once
	/// `f` returns is `file_pos` reset to `new_file_pos`, still under the same lock.
	pub fn clear_while_locked<R>(&self, new_file_pos: u64, f: impl FnOnce(Vec<SlotRef>) -> R) -> R {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		let drained = state.free.drain();
		let result = f(drained);
		state.file_pos = new_file_pos;
		result
	}

	/// Iterator over the free list in `(size, offset)` order; only for invariant checks,
	/// must be called while no other thread can mutate the allocator (e.g. in tests).
	pub fn with_free_list<R>(&self, f: impl FnOnce(&FreeList) -> R) -> R {
		let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		f(&state.free)
	}
}
