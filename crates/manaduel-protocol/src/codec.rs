//! Codec trait for moving records in and out of the shared store.
//!
//! The store holds a JSON tree, so a codec here converts between typed
//! records and `serde_json::Value` rather than raw bytes. Keeping it behind
//! a trait lets a deployment swap in a codec with a different field naming
//! or versioning scheme without touching the room controller.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ProtocolError;

/// Converts records to and from store values.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a record into a store value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the record cannot be
    /// represented (e.g. a map with non-string keys).
    fn encode<T: Serialize>(&self, value: &T) -> Result<Value, ProtocolError>;

    /// Deserializes a store value into a record.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the value is missing required
    /// fields or has the wrong types.
    fn decode<T: DeserializeOwned>(
        &self,
        value: &Value,
    ) -> Result<T, ProtocolError>;
}

/// The default [`Codec`], a thin wrapper over `serde_json`'s value
/// conversions.
///
/// ```rust
/// use manaduel_protocol::{Allocation, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let alloc = Allocation { attack: 6, shield: 0, channel: 2, regen: 0 };
/// let value = codec.encode(&alloc).unwrap();
/// let back: Allocation = codec.decode(&value).unwrap();
/// assert_eq!(alloc, back);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Value, ProtocolError> {
        serde_json::to_value(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        value: &Value,
    ) -> Result<T, ProtocolError> {
        T::deserialize(value).map_err(ProtocolError::Decode)
    }
}
