//! The in-memory key → slot index.
//!
//! Backed by [`lru::LruCache`] rather than a hand-rolled linked hash map: it already gives
//! O(1) `get`/`put`/victim-selection via an intrusive doubly linked list, and `push`
//! returns exactly the entry that was displaced — either the previous slot for the same
//! key (a replace) or the least-recently-used slot evicted to make room (an eviction) —
//! which lines up with the two outcomes `store` has to distinguish between.

use crate::slot::SlotRef;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Outcome of inserting into the index: the slot displaced for the *same* key (a plain
/// replace, never counted as an eviction) and the slot evicted to stay under the cap (only
/// possible in bounded mode, and only when the key was new).
pub struct PutOutcome {
	/// Previous slot for the same key, if this was a replace.
	pub replaced: Option<SlotRef>,
	/// Slot evicted to make room, if this insert grew the index past its cap.
	pub evicted: Option<SlotRef>,
}

/// Key → slot map, access-ordered when bounded.
pub struct Index<K: Hash + Eq + Clone> {
	inner: Mutex<LruCache<K, SlotRef>>,
}

impl<K: Hash + Eq + Clone> Index<K> {
	/// Creates an index. `cap` activates bounded mode with LRU eviction.
	pub fn new(cap: Option<NonZeroUsize>) -> Self {
		let cache = match cap {
			Some(cap) => LruCache::new(cap),
			None => LruCache::unbounded(),
		};
		Self {
			inner: Mutex::new(cache),
		}
	}

	/// Inserts `slot` for `key`, reporting whatever was displaced.
	pub fn put(&self, key: K, slot: SlotRef) -> PutOutcome {
		let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		match guard.push(key.clone(), slot) {
			None => PutOutcome {
				replaced: None,
				evicted: None,
			},
			Some((displaced_key, displaced_slot)) if displaced_key == key => PutOutcome {
				replaced: Some(displaced_slot),
				evicted: None,
			},
			Some((_, displaced_slot)) => PutOutcome {
				replaced: None,
				evicted: Some(displaced_slot),
			},
		}
	}

	/// Looks up `key`, promoting it to most-recently-used on a hit. If the slot has
	/// expired as of `now_ms` it is removed from the index (but not yet freed — the caller
	/// does that outside any lock) and returned as the `Err` side so the caller can tell
	/// "expired" apart from "missing" and from "found".
	pub fn load_and_lock(&self, key: &K, now_ms: i64) -> LoadResult {
		let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let Some(slot_ref) = guard.get(key) else {
			return LoadResult::Missing;
		};
		if slot_ref.slot.is_expired(now_ms) {
			let expired = guard.pop(key).expect("just observed via get");
			return LoadResult::Expired(expired);
		}
		slot_ref.lock.lock();
		LoadResult::Found(SlotRef::clone(slot_ref))
	}

	/// Removes and returns the slot for `key`, if present. Does not promote.
	pub fn remove(&self, key: &K) -> Option<SlotRef> {
		let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard.pop(key)
	}

	/// Whether `key` is present. Does not promote and does no I/O.
	pub fn contains_key(&self, key: &K) -> bool {
		let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard.contains(key)
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard.len()
	}

	/// Whether the index currently holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Snapshot of every live key, LRU-to-MRU order, minus `exclude`.
	pub fn keys_excluding(&self, exclude: Option<&std::collections::HashSet<K>>) -> Vec<K> {
		let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard
			.iter()
			.map(|(k, _)| k.clone())
			.filter(|k| exclude.is_none_or(|ex| !ex.contains(k)))
			.collect()
	}

	/// Snapshot of up to `n` `(key, slot)` pairs. Order is whatever the underlying map
	/// walks in and is not part of the contract (see `DESIGN.md`), so callers must not
	/// rely on these being the most- or least-recently used entries.
	pub fn sample(&self, n: usize) -> Vec<(K, SlotRef)> {
		let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard
			.iter()
			.take(n)
			.map(|(k, v)| (k.clone(), SlotRef::clone(v)))
			.collect()
	}

	/// Snapshot of every live `(key, slot)` pair.
	pub fn all(&self) -> Vec<(K, SlotRef)> {
		let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		guard
			.iter()
			.map(|(k, v)| (k.clone(), SlotRef::clone(v)))
			.collect()
	}

	/// Removes every entry whose slot has expired as of `now_ms`, returning the freed
	/// slots for the caller to hand to the allocator's `free`.
	pub fn purge_expired(&self, now_ms: i64) -> Vec<SlotRef> {
		let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let expired_keys: Vec<K> = guard
			.iter()
			.filter(|(_, slot)| slot.slot.is_expired(now_ms))
			.map(|(k, _)| k.clone())
			.collect();
		expired_keys
			.into_iter()
			.filter_map(|k| guard.pop(&k))
			.collect()
	}

	/// Drains every entry, returning the slots so the caller can wait for in-flight
	/// readers to drain and then free the underlying file region.
	///
	/// Unlike [`Index::remove`] and friends, this keeps the index mutex held for the
	/// *entire* call to `f`, not just for the drain itself: `Store::clear` nests the
	/// allocator's equivalent `clear_while_locked` inside `f`, so the combined critical
	/// section blocks any concurrent `store`/`load`/`remove` from touching the index or
	/// allocating against the old `file_pos` until the data file has actually been
	/// truncated and reset. Releasing and re-acquiring the lock in pieces would let a
	/// concurrent `store` allocate against the stale `file_pos` and insert a slot into the
	/// index that the truncation then silently invalidates.
	pub fn clear_while_locked<R>(&self, f: impl FnOnce(Vec<SlotRef>) -> R) -> R {
		let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		let mut drained = Vec::with_capacity(guard.len());
		while let Some((_, slot)) = guard.pop_lru() {
			drained.push(slot);
		}
		f(drained)
	}
}

/// Outcome of [`Index::load_and_lock`].
pub enum LoadResult {
	/// No entry for that key.
	Missing,
	/// Entry found and locked (its reader count was incremented); caller must unlock it.
	Found(SlotRef),
	/// Entry was present but expired; it has already been removed from the index. Caller
	/// must still call `free` on it.
	Expired(SlotRef),
}
