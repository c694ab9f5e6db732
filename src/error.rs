//! Error types surfaced by the store.
//!
//! Every public operation on [`crate::Store`] returns `Result<_, StoreError>`. There is a
//! single error type with a `cause` discriminant rather than one error enum per operation.

use std::path::PathBuf;
use thiserror::Error;

/// The single error type surfaced by all public store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Underlying file or channel I/O failed.
	#[error("store I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The parent directory for the data file could not be created.
	#[error("cannot create directory {path}: {source}")]
	DirectoryCannotBeCreated {
		/// Directory that failed to be created.
		path: PathBuf,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},

	/// The marshaller failed to serialize or deserialize a key or value.
	#[error("serialization error: {0}")]
	Serialization(String),

	/// Importing entries from a legacy store failed.
	#[error("legacy upgrade failed: {0}")]
	LegacyUpgrade(String),

	/// The operation is advertised but not implemented by this store.
	#[error("unsupported operation: {0}")]
	Unsupported(&'static str),

	/// The data file is corrupt beyond the point recovery is willing to continue.
	#[error("data file corrupt at offset {offset}: {reason}")]
	Corrupt {
		/// Byte offset at which corruption was detected.
		offset: u64,
		/// Human-readable description of the violated invariant.
		reason: String,
	},
}
