//! Room records for Manaduel.
//!
//! This crate defines what a duel looks like in the shared store:
//!
//! - **Types** ([`RoomSnapshot`], [`Participant`], [`Allocation`], [`Tick`],
//!   [`RoundOutcome`], etc.): the records every client reads and writes.
//! - **Paths** ([`paths`]): where each record lives in the tree.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into store values and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! It knows nothing about combat rules or the round state machine; those
//! live in `manaduel-combat` and `manaduel-room`.

mod codec;
mod error;
pub mod paths;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Allocation, DEFAULT_NAME, DRAW, Observer, Participant, ParticipantId,
    Phase, RoomCode, RoomSnapshot, RoomStatus, RoundOutcome, SeatPair, Tick,
    Winner, display_name, log_key,
};
