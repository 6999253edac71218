//! Room configuration and the duel state machine.

use std::fmt;

use manaduel_combat::DuelRules;
use manaduel_protocol::{Phase, RoomSnapshot, RoomStatus};
use manaduel_tick::PollConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every client of a room.
///
/// All clients of one room must agree on `plan_duration_ms` and `rules`,
/// since any of them may seed a plan phase or resolve a round. `poll` is
/// local to each client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Length of each plan phase in milliseconds.
    pub plan_duration_ms: u64,

    /// How this client polls for the plan deadline.
    pub poll: PollConfig,

    /// Combat constants.
    pub rules: DuelRules,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            plan_duration_ms: 10_000,
            poll: PollConfig::default(),
            rules: DuelRules::default(),
        }
    }
}

impl RoomConfig {
    /// Shortest plan phase accepted by [`validated`](Self::validated).
    pub const MIN_PLAN_DURATION_MS: u64 = 100;

    /// Clamps out-of-range values, logging each fix.
    pub fn validated(mut self) -> Self {
        if self.plan_duration_ms < Self::MIN_PLAN_DURATION_MS {
            warn!(
                plan_duration_ms = self.plan_duration_ms,
                min = Self::MIN_PLAN_DURATION_MS,
                "plan duration too short, clamping"
            );
            self.plan_duration_ms = Self::MIN_PLAN_DURATION_MS;
        }
        self.poll = self.poll.validated();
        self.rules = self.rules.validated();
        self
    }
}

// ---------------------------------------------------------------------------
// DuelState
// ---------------------------------------------------------------------------

/// Where a room is in its lifecycle, as derived from a snapshot.
///
/// ```text
/// Lobby → Planning ⇄ Resolving → Finished
/// ```
///
/// `Resolving → Planning` starts the next round; `Resolving → Finished`
/// happens only when a resolution produced a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuelState {
    Lobby,
    Planning,
    Resolving,
    Finished,
}

impl DuelState {
    /// Reads the state off a room snapshot.
    ///
    /// An `active` room without a tick is treated as `Lobby`; it cannot be
    /// advanced until someone starts it properly.
    pub fn of(room: &RoomSnapshot) -> Self {
        match (room.status, room.tick.map(|t| t.phase)) {
            (RoomStatus::Finished, _) => Self::Finished,
            (RoomStatus::Active, Some(Phase::Plan)) => Self::Planning,
            (RoomStatus::Active, Some(Phase::Resolving)) => Self::Resolving,
            _ => Self::Lobby,
        }
    }

    /// `true` while a fighter may still claim an empty seat.
    pub fn is_joinable(self) -> bool {
        !matches!(self, Self::Finished)
    }
}

impl fmt::Display for DuelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Planning => write!(f, "Planning"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
