//! The serializer boundary.
//!
//! The store treats keys and values as opaque bytes; turning them into bytes and back is
//! the host cache's job, represented here as a capability object rather than a global so
//! it can be swapped per store instance at construction time.

use crate::error::StoreError;

/// Converts a value of type `T` to and from bytes.
///
/// Implementations should not panic on malformed input; return `Err` instead, which the
/// store wraps as [`StoreError::Serialization`].
pub trait Marshaller<T>: Send + Sync {
	/// Serializes `value` to bytes.
	fn to_bytes(&self, value: &T) -> Result<Vec<u8>, StoreError>;

	/// Deserializes bytes back into a `T`.
	fn from_bytes(&self, bytes: &[u8]) -> Result<T, StoreError>;
}

/// A [`Marshaller`] built on `serde_json`, suitable for any `T: Serialize + DeserializeOwned`.
///
/// Not the only valid marshaller — just the one this crate ships so the store is usable
/// out of the box without a host cache supplying its own wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaller;

impl<T> Marshaller<T> for JsonMarshaller
where
	T: serde::Serialize + serde::de::DeserializeOwned,
{
	fn to_bytes(&self, value: &T) -> Result<Vec<u8>, StoreError> {
		serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
	}

	fn from_bytes(&self, bytes: &[u8]) -> Result<T, StoreError> {
		serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
	}
}
