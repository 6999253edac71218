//! Error types for the protocol layer.
//!
//! A `ProtocolError` means a record could not be turned into, or read
//! back from, the store's JSON representation, or an identifier failed
//! validation. It never describes game-rule violations: those are coerced,
//! not rejected.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a record into a store value failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A store value did not have the shape of the expected record.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identifier (room code, participant id) is not usable.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
