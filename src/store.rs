//! The store engine: orchestrates the index, free list, allocator and file layer behind
//! the public contract (`store`, `load`, `remove`, `clear`, `purge`, …) and enforces the
//! two-monitor locking protocol: the index first, then the free list.

use crate::allocator::Allocator;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::file_io::{decode_header, FileBackend};
use crate::index::{Index, LoadResult};
use crate::legacy::{LegacyImporter, NoLegacyStore};
use crate::marshaller::Marshaller;
use crate::slot::{Slot, SlotHandle, SlotRef, HEADER_SIZE};
use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

/// A single-file, append-allocate cache store.
///
/// Generic over the key type `K` (must be hashable, as the "key-equivalence" collaborator
/// is just `Hash + Eq` in this implementation), the value type `V`, and a marshaller `M`
/// capable of serializing both.
pub struct Store<K, V, M>
where
	K: Hash + Eq + Clone,
	M: Marshaller<K> + Marshaller<V>,
{
	file: FileBackend,
	allocator: Allocator,
	index: Index<K>,
	marshaller: M,
	config: StoreConfig,
	purges_run: AtomicU64,
	_value: PhantomData<V>,
}

impl<K, V, M> Store<K, V, M>
where
	K: Hash + Eq + Clone,
	M: Marshaller<K> + Marshaller<V>,
{
	/// Opens (or creates) the data file and either rebuilds the index from it or
	/// initializes a fresh one, with no legacy store to import from.
	pub fn start(config: StoreConfig, marshaller: M) -> Result<Self, StoreError> {
		Self::start_with_legacy::<NoLegacyStore>(config, marshaller, None)
	}

	/// Like [`Store::start`], but first drains `legacy` (if given) and `store`s every
	/// entry it yields before rebuilding or initializing the index.
	pub fn start_with_legacy<L>(
		config: StoreConfig,
		marshaller: M,
		legacy: Option<&mut L>,
	) -> Result<Self, StoreError>
	where
		L: LegacyImporter<K, V>,
	{
		let dir = PathBuf::from(config.resolved_location());
		std::fs::create_dir_all(&dir).map_err(|source| StoreError::DirectoryCannotBeCreated {
			path: dir.clone(),
			source,
		})?;
		let path = dir.join(format!("{}.dat", config.cache_name));
		let file = FileBackend::open_or_create(&path)?;

		let mut store = Self {
			file,
			allocator: Allocator::new(4),
			index: Index::new(config.bounded_cap()),
			marshaller,
			config,
			purges_run: AtomicU64::new(0),
			_value: PhantomData,
		};

		if let Some(legacy) = legacy {
			store.import_legacy(legacy)?;
		}

		if store.file.has_magic()? {
			store.rebuild_index()?;
		} else {
			store.clear()?;
		}

		tracing::info!(
			path = %store.file.path().display(),
			entries = store.index.len(),
			free_slots = store.allocator.free_len(),
			"store started"
		);

		Ok(store)
	}

	fn import_legacy<L>(&mut self, legacy: &mut L) -> Result<(), StoreError>
	where
		L: LegacyImporter<K, V>,
	{
		let mut imported = 0usize;
		loop {
			let entry = legacy
				.next_entry()
				.map_err(StoreError::LegacyUpgrade)?;
			let Some(entry) = entry else { break };
			self.store_with_expiry(entry.key, entry.value, entry.expiry_time)?;
			imported += 1;
		}
		if imported > 0 {
			tracing::info!(imported, "imported entries from legacy store");
		}
		Ok(())
	}

	/// Walks the file from just past the magic header, reconstructing the index and free
	/// list. Tolerant of the file ending mid-header; a header with an impossible size is
	/// treated as corruption and halts the scan (bytes from there on will be overwritten
	/// by future appends).
	fn rebuild_index(&mut self) -> Result<(), StoreError> {
		let mut offset = 4u64;
		let mut live = 0usize;
		let mut dead = 0usize;

		loop {
			let Some(header) = self.file.read_header(offset)? else {
				break;
			};
			let (size, key_len, data_len, expiry_time) = decode_header(&header);

			if size < HEADER_SIZE {
				tracing::warn!(offset, size, "corrupt slot header, halting rebuild");
				return Err(StoreError::Corrupt {
					offset,
					reason: format!("slot size {} is smaller than header size {}", size, HEADER_SIZE),
				});
			}

			let slot = Slot {
				offset,
				size,
				key_len,
				data_len,
				expiry_time,
			};
			self.allocator.observe_rebuilt_slot(&slot);

			if key_len > 0 {
				let key_bytes = self.file.read_at(slot.key_offset(), key_len as usize)?;
				let key = self.marshaller.from_bytes(&key_bytes)?;
				let outcome = self.index.put(key, SlotRef::new(SlotHandle::new(slot)));
				if let Some(evicted) = outcome.evicted {
					tracing::warn!(
						offset = evicted.slot.offset,
						"bounded cap lower than persisted entry count, evicting during rebuild"
					);
					self.allocator.free(&self.file, evicted)?;
				}
				live += 1;
			} else {
				self.allocator.seed_free(SlotRef::new(SlotHandle::new(slot)));
				dead += 1;
			}

			offset += size as u64;
		}

		tracing::info!(live, dead, "rebuilt index from data file");
		Ok(())
	}

	/// Stores `value` under `key` with no expiry.
	pub fn store(&self, key: K, value: V) -> Result<(), StoreError> {
		self.store_with_expiry(key, value, crate::slot::NO_EXPIRY)
	}

	/// Stores `value` under `key`, expiring at the given absolute millisecond timestamp
	/// (or [`crate::slot::NO_EXPIRY`] for "never").
	pub fn store_with_expiry(
		&self,
		key: K,
		value: V,
		expiry_time: i64,
	) -> Result<(), StoreError> {
		let key_bytes = self.marshaller.to_bytes(&key)?;
		let value_bytes = self.marshaller.to_bytes(&value)?;
		let need = Slot::needed_size(key_bytes.len(), value_bytes.len());

		let handle = self.allocator.allocate(need);
		let slot = Slot {
			key_len: key_bytes.len() as u32,
			data_len: value_bytes.len() as u32,
			expiry_time,
			..handle.slot
		};
		let handle = SlotRef::new(SlotHandle::new(slot));

		self.file.write_record(&slot, &key_bytes, &value_bytes)?;

		let outcome = self.index.put(key, handle);
		let displaced = match outcome.replaced {
			Some(prev) => Some(prev),
			None => {
				if let Some(victim) = &outcome.evicted {
					tracing::debug!(offset = victim.slot.offset, "evicted least-recently-used entry");
				}
				outcome.evicted
			}
		};

		if let Some(displaced) = displaced {
			self.allocator.free(&self.file, displaced)?;
		}

		Ok(())
	}

	/// Loads the value for `key`, or `None` if absent or expired.
	///
	/// A hit promotes the key to most-recently-used in bounded mode. The reader lock is
	/// held only across the positional read; deserialization happens after it is released.
	pub fn load(&self, key: &K) -> Result<Option<V>, StoreError> {
		match self.index.load_and_lock(key, now_ms()) {
			LoadResult::Missing => Ok(None),
			LoadResult::Expired(slot) => {
				tracing::debug!(offset = slot.slot.offset, "slot expired on load");
				self.allocator.free(&self.file, slot)?;
				Ok(None)
			}
			LoadResult::Found(slot) => {
				let read = self.file.read_value(&slot.slot);
				slot.lock.unlock();
				let bytes = read?;
				Ok(Some(self.marshaller.from_bytes(&bytes)?))
			}
		}
	}

	/// Removes `key`, returning whether an entry was present.
	pub fn remove(&self, key: &K) -> Result<bool, StoreError> {
		match self.index.remove(key) {
			Some(slot) => {
				self.allocator.free(&self.file, slot)?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Whether `key` has a live entry. Consults the index only; no I/O.
	pub fn contains_key(&self, key: &K) -> bool {
		self.index.contains_key(key)
	}

	/// Snapshot of every live key, minus `exclude`.
	pub fn load_all_keys(&self, exclude: Option<&HashSet<K>>) -> Vec<K> {
		self.index.keys_excluding(exclude)
	}

	/// Loads every live, non-expired entry. Entries that expire mid-iteration are skipped
	/// rather than causing the call to fail.
	pub fn load_all(&self) -> Result<Vec<(K, V)>, StoreError> {
		self.load_snapshot(self.index.all())
	}

	/// Loads at most `n` entries. Returns whatever `n` entries the index's internal order
	/// yields first (see `DESIGN.md`); callers must treat this as an unordered sample, not
	/// a most- or least-recently-used selection.
	pub fn load_n(&self, n: usize) -> Result<Vec<(K, V)>, StoreError> {
		self.load_snapshot(self.index.sample(n))
	}

	fn load_snapshot(&self, candidates: Vec<(K, SlotRef)>) -> Result<Vec<(K, V)>, StoreError> {
		let mut out = Vec::with_capacity(candidates.len());
		for (key, slot) in candidates {
			if let Some(value) = self.load(&key)? {
				out.push((key, value));
			} else {
				let _ = slot; // already freed by `load` if it had expired
			}
		}
		Ok(out)
	}

	/// Blocks until every in-flight reader drains, then clears the index and free list and
	/// truncates the file back to just the magic header.
	///
	/// Acquires the index monitor, then the free-list monitor, and holds *both* for the
	/// entire critical section — draining, waiting out readers, and truncating the file —
	/// not just for the initial drain. Releasing either lock early would let a concurrent
	/// `store` allocate against the about-to-be-reset `file_pos` and insert a slot the
	/// truncation then silently invalidates, so `clear_while_locked` nests the allocator's
	/// call inside the index's for the whole operation.
	pub fn clear(&self) -> Result<(), StoreError> {
		self.index.clear_while_locked(|index_slots| -> Result<(), StoreError> {
			for slot in &index_slots {
				slot.lock.wait_unlocked();
			}
			self.allocator
				.clear_while_locked(4, |free_slots| -> std::io::Result<()> {
					for slot in &free_slots {
						slot.lock.wait_unlocked();
					}
					self.file.reset()
				})?;
			Ok(())
		})?;
		tracing::info!("store cleared");
		Ok(())
	}

	/// Removes every entry whose expiry has passed, freeing their slots.
	///
	/// Returns the number of entries purged. Intended to be invoked periodically by a
	/// scheduler external to this crate (see [`crate::config::StoreConfig::purge_synchronously`]).
	pub fn purge(&self) -> Result<usize, StoreError> {
		let expired = self.index.purge_expired(now_ms());
		let count = expired.len();
		for slot in expired {
			self.allocator.free(&self.file, slot)?;
		}
		self.purges_run.fetch_add(1, Ordering::Relaxed);
		if count > 0 {
			tracing::debug!(count, "purge swept expired entries");
		}
		Ok(count)
	}

	/// Number of entries currently live in the index.
	pub fn len(&self) -> usize {
		self.index.len()
	}

	/// Whether the index currently holds no entries.
	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// Current append pointer, for tests and invariant checks.
	pub fn file_pos(&self) -> u64 {
		self.allocator.file_pos()
	}

	/// Number of dead slots in the free list, for tests and invariant checks.
	pub fn free_slot_count(&self) -> usize {
		self.allocator.free_len()
	}

	/// Closes the store. The file handle and in-memory structures are dropped with `self`;
	/// this method exists to give `stop` a name in the public contract.
	pub fn stop(self) {}

	/// Always fails: streaming import is not supported by this store.
	pub fn from_stream<R: std::io::Read>(&self, _reader: R) -> Result<(), StoreError> {
		Err(StoreError::Unsupported("fromStream"))
	}

	/// Always fails: streaming export is not supported by this store.
	pub fn to_stream<W: std::io::Write>(&self, _writer: W) -> Result<(), StoreError> {
		Err(StoreError::Unsupported("toStream"))
	}
}
