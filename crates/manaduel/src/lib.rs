//! # Manaduel
//!
//! Two-player mana duels with no game server.
//!
//! Every participant runs the same engine against a shared, remotely
//! hosted store. Rounds are resolved by whichever client wins a
//! compare-and-swap on the round's phase, so exactly one resolution happens
//! per round no matter how many clients are polling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manaduel::prelude::*;
//!
//! # async fn demo() -> Result<(), DuelError> {
//! let backend = MemoryBackend::new();
//! let alice = DuelClient::builder(backend.client())
//!     .participant("alice")
//!     .connect()
//!     .await?;
//! let bob = DuelClient::builder(backend.client())
//!     .participant("bob")
//!     .connect()
//!     .await?;
//!
//! let (room, _seat) = alice.join("arena", "Alice", JoinRole::Fighter).await?;
//! bob.join("arena", "Bob", JoinRole::Fighter).await?;
//!
//! // The first fighter to join starts the duel; allocations are accepted
//! // once round 1 is in its plan phase.
//! room.start().await?;
//! room.submit(&RawAllocation::new(6, 0, 0, 0)).await?;
//! let driver = alice.drive(&room);
//! let winner = driver.finished().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod logging;

pub use client::{DuelClient, DuelClientBuilder};
pub use error::DuelError;
pub use logging::init_tracing;

pub use manaduel_combat as combat;
pub use manaduel_protocol as protocol;
pub use manaduel_room as room;
pub use manaduel_store as store;
pub use manaduel_tick as tick;

/// Everything needed to run a duel client.
pub mod prelude {
    pub use crate::{DuelClient, DuelClientBuilder, DuelError, init_tracing};
    pub use manaduel_combat::{DuelRules, RawAllocation};
    pub use manaduel_protocol::{
        Allocation, Participant, ParticipantId, Phase, RoomCode, RoomSnapshot,
        RoomStatus, RoundOutcome, Tick, Winner,
    };
    pub use manaduel_room::{
        Advance, DriverHandle, DriverStats, JoinRole, RoomConfig, RoomController,
        RoomError, RoomWatch, Seat,
    };
    pub use manaduel_store::{MemoryBackend, MemoryStore, SharedStore, StoreError};
    pub use manaduel_tick::{Clock, ManualClock, PollConfig, SystemClock, TokioClock};
}
