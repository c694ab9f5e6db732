//! On-disk slot descriptor and the per-slot reader lock.
//!
//! A [`Slot`] describes a fixed region of the data file. It never changes once created:
//! moving a slot between the index and the free list never edits its offset or size, only
//! which collection holds it. The only mutable part of a slot is its reader count, which
//! lives in [`ReaderLock`] so it can be shared (via `Arc`) between whichever collection
//! currently references the slot and any in-flight reader.

use std::sync::{Condvar, Mutex};

/// Size in bytes of the fixed on-disk header: size, keyLen, dataLen, expiryTime.
pub const HEADER_SIZE: u32 = 20;

/// Sentinel expiry meaning "never expires".
pub const NO_EXPIRY: i64 = -1;

/// Magic bytes at offset 0 of the data file.
pub const MAGIC: &[u8; 4] = b"FCS1";

/// An immutable descriptor of one region of the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
	/// Byte offset of this slot's header within the data file.
	pub offset: u64,
	/// Total size on disk, including the header, key and value bytes.
	pub size: u32,
	/// Length of the serialized key, or 0 if this slot is logically free.
	pub key_len: u32,
	/// Length of the serialized value.
	pub data_len: u32,
	/// Absolute expiry timestamp in milliseconds since the epoch, or [`NO_EXPIRY`].
	pub expiry_time: i64,
}

impl Slot {
	/// Smallest total size that can hold a record with the given key/value lengths.
	pub fn needed_size(key_len: usize, data_len: usize) -> u32 {
		HEADER_SIZE + key_len as u32 + data_len as u32
	}

	/// Offset at which this slot's key bytes begin.
	pub fn key_offset(&self) -> u64 {
		self.offset + HEADER_SIZE as u64
	}

	/// Offset at which this slot's value bytes begin.
	pub fn data_offset(&self) -> u64 {
		self.offset + HEADER_SIZE as u64 + self.key_len as u64
	}

	/// Offset of the one-past-the-end byte of this slot.
	pub fn end_offset(&self) -> u64 {
		self.offset + self.size as u64
	}

	/// Whether this slot's stored expiry has passed as of `now_ms`.
	pub fn is_expired(&self, now_ms: i64) -> bool {
		self.expiry_time > 0 && self.expiry_time < now_ms
	}
}

/// Per-slot reader count with a condition variable for `waitUnlocked`.
///
/// Shared between the index/free-list entry and any thread currently reading the slot's
/// bytes off disk. `lock`/`unlock` bracket a single positional read; `is_locked` is the
/// non-blocking predicate the allocator uses to skip free slots that are still being read.
#[derive(Debug, Default)]
pub struct ReaderLock {
	readers: Mutex<u32>,
	unlocked: Condvar,
}

impl ReaderLock {
	/// Creates a fresh, unlocked reader count.
	pub fn new() -> Self {
		Self::default()
	}

	/// Increments the reader count. Must be paired with [`ReaderLock::unlock`].
	pub fn lock(&self) {
		let mut readers = self.readers.lock().unwrap_or_else(|e| e.into_inner());
		*readers += 1;
	}

	/// Decrements the reader count, waking any thread blocked in [`ReaderLock::wait_unlocked`].
	pub fn unlock(&self) {
		let mut readers = self.readers.lock().unwrap_or_else(|e| e.into_inner());
		debug_assert!(*readers > 0, "unlock called without a matching lock");
		*readers = readers.saturating_sub(1);
		if *readers == 0 {
			self.unlocked.notify_all();
		}
	}

	/// Non-blocking check for whether any reader currently holds this slot.
	pub fn is_locked(&self) -> bool {
		*self.readers.lock().unwrap_or_else(|e| e.into_inner()) > 0
	}

	/// Blocks the calling thread until the reader count reaches zero.
	///
	/// Spurious wakeups (and, on this platform, no interrupt mechanism at all) are handled
	/// by re-checking the predicate in a loop, same as the Java original's re-setting of
	/// the interrupt flag and continuing to wait.
	pub fn wait_unlocked(&self) {
		let guard = self.readers.lock().unwrap_or_else(|e| e.into_inner());
		let _guard = self
			.unlocked
			.wait_while(guard, |readers| *readers > 0)
			.unwrap_or_else(|e| e.into_inner());
	}
}

/// A [`Slot`] paired with its reader lock, shared by reference between the index and the
/// free list so both collections (and any in-flight reader) observe the same lock state.
#[derive(Debug)]
pub struct SlotHandle {
	/// The immutable descriptor.
	pub slot: Slot,
	/// The slot's reader count.
	pub lock: ReaderLock,
}

impl SlotHandle {
	/// Wraps a slot in a fresh, unlocked handle.
	pub fn new(slot: Slot) -> Self {
		Self {
			slot,
			lock: ReaderLock::new(),
		}
	}
}

/// Shared handle to a slot, as stored in the index and free list.
pub type SlotRef = std::sync::Arc<SlotHandle>;

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn lock_unlock_roundtrip() {
		let lock = ReaderLock::new();
		assert!(!lock.is_locked());
		lock.lock();
		assert!(lock.is_locked());
		lock.unlock();
		assert!(!lock.is_locked());
	}

	#[test]
	fn wait_unlocked_blocks_until_drained() {
		let lock = Arc::new(ReaderLock::new());
		lock.lock();

		let waiter = {
			let lock = Arc::clone(&lock);
			thread::spawn(move || lock.wait_unlocked())
		};

		thread::sleep(Duration::from_millis(50));
		assert!(!waiter.is_finished());

		lock.unlock();
		waiter.join().unwrap();
	}

	#[test]
	fn slot_offsets() {
		let slot = Slot {
			offset: 100,
			size: 50,
			key_len: 10,
			data_len: 20,
			expiry_time: NO_EXPIRY,
		};
		assert_eq!(slot.key_offset(), 120);
		assert_eq!(slot.data_offset(), 130);
		assert_eq!(slot.end_offset(), 150);
		assert!(!slot.is_expired(i64::MAX));
	}

	#[test]
	fn expiry_semantics() {
		let expires_soon = Slot {
			offset: 0,
			size: 0,
			key_len: 0,
			data_len: 0,
			expiry_time: 1_000,
		};
		assert!(expires_soon.is_expired(2_000));
		assert!(!expires_soon.is_expired(500));

		let never = Slot {
			expiry_time: NO_EXPIRY,
			..expires_soon
		};
		assert!(!never.is_expired(i64::MAX));
	}
}
