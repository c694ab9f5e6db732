//! A single-file, append-allocate cache store.
//!
//! This crate implements the persistent tier behind an in-memory cache: a single data file
//! holding fixed-header records, an in-memory index mapping keys to on-disk slots, a
//! best-fit allocator over a free list of dead slots, and a reader-locking protocol that
//! lets `store` overwrite a slot while a concurrent `load` is still reading its old bytes.
//!
//! Concurrency here is plain OS threads and `std::sync` primitives, not async — callers
//! drive [`Store`] from whatever executor (or none) they like; it blocks the calling thread
//! for the duration of each operation's I/O.
//!
//! # Example
//!
//! ```no_run
//! use fcstore::{JsonMarshaller, Store, StoreConfig};
//!
//! let config = StoreConfig::new("/var/lib/myapp/cache", "widgets").with_max_entries(10_000);
//! let store: Store<String, String, _> = Store::start(config, JsonMarshaller)?;
//!
//! store.store("a".to_string(), "hello".to_string())?;
//! assert_eq!(store.load(&"a".to_string())?, Some("hello".to_string()));
//! # Ok::<(), fcstore::StoreError>(())
//! ```

mod allocator;
mod file_io;
mod free_list;
mod index;
mod slot;

pub mod config;
pub mod error;
pub mod legacy;
pub mod marshaller;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use legacy::{LegacyEntry, LegacyImporter, NoLegacyStore};
pub use marshaller::{JsonMarshaller, Marshaller};
pub use slot::NO_EXPIRY;
pub use store::Store;
