//! Unified error type for Manaduel.

use manaduel_protocol::ProtocolError;
use manaduel_room::RoomError;
use manaduel_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// A store-level error (not connected, unavailable, bad path).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record or identifier could not be encoded, decoded, or parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, wrong state, not the starter).
    #[error(transparent)]
    Room(#[from] RoomError),
}
