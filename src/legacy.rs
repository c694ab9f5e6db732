//! Legacy import plug-in.
//!
//! Migrating an older on-disk format is not this crate's concern — only the contract for
//! plugging one in is: an iterator of `(key, value, expiry)` triples, consumed once at
//! `start` by re-`store`-ing every yielded entry. The importer decides for itself whether
//! a legacy store is present at all; if none is, it should yield nothing.

/// One entry recovered from a legacy store.
pub struct LegacyEntry<K, V> {
	/// The entry's key.
	pub key: K,
	/// The entry's value.
	pub value: V,
	/// Absolute expiry timestamp in milliseconds since the epoch, or [`crate::slot::NO_EXPIRY`].
	pub expiry_time: i64,
}

/// Supplies entries recovered from a legacy on-disk format.
///
/// Implementations typically wrap a one-shot scan of the old format; `next_entry` returning
/// `Ok(None)` signals the import is complete (not merely that this particular call found
/// nothing), matching a fused iterator.
pub trait LegacyImporter<K, V> {
	/// Returns the next recovered entry, or `None` once the legacy source is exhausted.
	///
	/// # Errors
	///
	/// Returns an error if the legacy store could not be read; the store wraps this as
	/// [`crate::error::StoreError::LegacyUpgrade`] and aborts `start`.
	fn next_entry(&mut self) -> Result<Option<LegacyEntry<K, V>>, String>;
}

/// A [`LegacyImporter`] that never yields anything, for callers with no legacy source to
/// migrate from.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLegacyStore;

impl<K, V> LegacyImporter<K, V> for NoLegacyStore {
	fn next_entry(&mut self) -> Result<Option<LegacyEntry<K, V>>, String> {
		Ok(None)
	}
}
