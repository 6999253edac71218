//! Error types for the room layer.
//!
//! Losing a phase race, or finding a seat empty at resolution time, is not
//! an error: [`try_advance`](crate::RoomController::try_advance) reports
//! those as [`Advance`](crate::Advance) values.

use manaduel_protocol::{ParticipantId, ProtocolError, RoomCode};
use manaduel_store::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Nothing is stored under this room code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The caller holds neither a fighter seat nor an observer slot.
    #[error("participant {0} not in room {1}")]
    NotInRoom(ParticipantId, RoomCode),

    /// Only the earliest-joined fighter may start the duel.
    #[error("participant {0} is not the starter of room {1}")]
    NotStarter(ParticipantId, RoomCode),

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// Starting needs two fighters.
    #[error("room {0} needs two fighters")]
    NotEnoughParticipants(RoomCode),

    /// The round driver has stopped and no longer takes commands.
    #[error("driver for room {0} is not running")]
    Unavailable(RoomCode),

    /// A stored record could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The shared store failed the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}
