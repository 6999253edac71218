//! Record types stored in the shared tree.
//!
//! Everything a duel needs to persist lives in one subtree per room:
//!
//! ```text
//! room/{code}                      RoomSnapshot (status, created_at, tick, winner)
//! room/{code}/participants/{id}    Participant (one per fighter seat)
//! room/{code}/observers/{id}       Observer
//! room/{code}/log/{round key}      RoundOutcome (append-only)
//! ```
//!
//! Field names are `snake_case` on the wire. Optional fields are omitted
//! when absent because the store treats `null` as "delete".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

/// Name given to participants who join without one.
pub const DEFAULT_NAME: &str = "Arcane Mage";

/// The literal stored in `winner` when both fighters fall in the same round.
pub const DRAW: &str = "draw";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one client (fighter or observer) within a room.
///
/// Usually the auth provider's user id. It doubles as a store path segment,
/// so it may not contain `/`, and it may not be `"draw"` since that value
/// is reserved in [`Winner`].
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Validates and wraps a raw id.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let id = raw.trim();
        if id.is_empty() || id.contains('/') || id == DRAW {
            return Err(ProtocolError::InvalidId(format!(
                "participant id {raw:?}"
            )));
        }
        Ok(Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room's join code. Codes are case-insensitive and stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes (trim + lowercase) and validates a code.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_lowercase();
        if code.is_empty() || code.contains('/') {
            return Err(ProtocolError::InvalidId(format!("room code {raw:?}")));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// A fighter's split of mana across the four actions for one round.
///
/// Stored values are always sanitized: `regen` is a tier (0, 7 or 12) and
/// [`spent`](Self::spent) never exceeds the mana the fighter had when the
/// allocation was submitted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct Allocation {
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub shield: u32,
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub regen: u32,
}

impl Allocation {
    /// The empty allocation every fighter starts each plan phase with.
    pub const ZERO: Self = Self {
        attack: 0,
        shield: 0,
        channel: 0,
        regen: 0,
    };

    /// Total mana committed by this allocation.
    pub fn spent(&self) -> u32 {
        self.attack
            .saturating_add(self.shield)
            .saturating_add(self.channel)
            .saturating_add(self.regen)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

// ---------------------------------------------------------------------------
// Participant / Observer
// ---------------------------------------------------------------------------

/// One fighter seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default = "default_name")]
    pub name: String,
    pub hp: u32,
    pub mana: u32,
    pub max_mana: u32,
    /// Mana produced by the channel action of the latest resolution.
    #[serde(default)]
    pub stored: u32,
    /// Permanent regen gained from regen-tier investments. Never decreases.
    #[serde(default)]
    pub regen_bonus: u32,
    #[serde(default)]
    pub allocation: Allocation,
    /// Join time in milliseconds since the Unix epoch. Orders the seats.
    pub joined_at: u64,
}

impl Participant {
    /// A freshly seated fighter: no allocation, no bonus, nothing stored.
    pub fn seeded(
        name: &str,
        hp: u32,
        mana: u32,
        max_mana: u32,
        joined_at: u64,
    ) -> Self {
        Self {
            name: display_name(name),
            hp,
            mana: mana.min(max_mana),
            max_mana,
            stored: 0,
            regen_bonus: 0,
            allocation: Allocation::ZERO,
            joined_at,
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.hp == 0
    }
}

/// A read-only member of the room. Observers never hold an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    #[serde(default = "default_name")]
    pub name: String,
    pub joined_at: u64,
}

impl Observer {
    pub fn new(name: &str, joined_at: u64) -> Self {
        Self {
            name: display_name(name),
            joined_at,
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_owned()
}

/// Trims a user-supplied name, falling back to [`DEFAULT_NAME`].
pub fn display_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        default_name()
    } else {
        trimmed.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Room status, phase, tick
// ---------------------------------------------------------------------------

/// Room lifecycle. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Lobby,
    Active,
    Finished,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Phase of an active round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fighters may freely edit their allocation until `ends_at`.
    Plan,
    /// One client has won the right to resolve the round.
    Resolving,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Resolving => write!(f, "resolving"),
        }
    }
}

/// The shared round clock of an active room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Starts at 1 and increases by exactly 1 per resolution.
    pub round: u32,
    pub phase: Phase,
    /// Plan-phase deadline, milliseconds since the Unix epoch.
    pub ends_at: u64,
    /// When the plan → resolving transition was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

impl Tick {
    /// A plan phase for `round` ending `plan_ms` after `now`.
    pub fn plan(round: u32, now: u64, plan_ms: u64) -> Self {
        Self {
            round,
            phase: Phase::Plan,
            ends_at: now.saturating_add(plan_ms),
            resolved_at: None,
        }
    }

    /// `true` once the plan deadline has passed.
    pub fn is_due(&self, now: u64) -> bool {
        self.phase == Phase::Plan && now >= self.ends_at
    }

    /// Milliseconds left in the plan phase (0 once due or resolving).
    pub fn remaining_ms(&self, now: u64) -> u64 {
        match self.phase {
            Phase::Plan => self.ends_at.saturating_sub(now),
            Phase::Resolving => 0,
        }
    }

    /// This tick moved into the resolving phase at `now`.
    pub fn resolving(self, now: u64) -> Self {
        Self {
            phase: Phase::Resolving,
            resolved_at: Some(now),
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// Winner
// ---------------------------------------------------------------------------

/// Final result of a duel.
///
/// On the wire this is a bare string: the winning participant's id, or
/// `"draw"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Winner {
    Participant(ParticipantId),
    Draw,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Participant(id) => write!(f, "{id}"),
            Self::Draw => f.write_str(DRAW),
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Participant(id) => serializer.serialize_str(id.as_str()),
            Self::Draw => serializer.serialize_str(DRAW),
        }
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == DRAW {
            return Ok(Self::Draw);
        }
        ParticipantId::parse(&raw)
            .map(Self::Participant)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Round outcome (log entry)
// ---------------------------------------------------------------------------

/// A value for each of the two seats, `a` being the earlier joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeatPair<T> {
    pub a: T,
    pub b: T,
}

/// One entry of the append-only room log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// The round this entry resolved.
    pub round: u32,
    /// Seat A and seat B ids, in that order.
    pub participants: SeatPair<ParticipantId>,
    /// Human-readable one-line summary.
    pub summary: String,
    /// Effective attack (allocation plus threshold bonus).
    pub attack: SeatPair<u32>,
    /// Effective shield (allocation plus threshold bonus).
    pub shield: SeatPair<u32>,
    /// Damage *taken* by each seat.
    pub damage: SeatPair<u32>,
    /// Mana carried into the next round by channelling.
    pub stored: SeatPair<u32>,
    /// Regen bonus in effect after this round.
    pub regen_bonus: SeatPair<u32>,
}

/// Store key for the log entry of `round`. Zero-padded so keys sort in
/// round order.
pub fn log_key(round: u32) -> String {
    format!("{round:08}")
}

// ---------------------------------------------------------------------------
// Room snapshot
// ---------------------------------------------------------------------------

/// The full `room/{code}` subtree as read in one go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub status: RoomStatus,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<Tick>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participants: BTreeMap<ParticipantId, Participant>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub observers: BTreeMap<ParticipantId, Observer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub log: BTreeMap<String, RoundOutcome>,
}

impl RoomSnapshot {
    /// A new, empty lobby.
    pub fn lobby(created_at: u64) -> Self {
        Self {
            status: RoomStatus::Lobby,
            created_at,
            tick: None,
            winner: None,
            participants: BTreeMap::new(),
            observers: BTreeMap::new(),
            log: BTreeMap::new(),
        }
    }

    /// Fighters in seat order: earliest `joined_at` first, ties by id.
    pub fn fighters(&self) -> Vec<(&ParticipantId, &Participant)> {
        let mut fighters: Vec<_> = self.participants.iter().collect();
        fighters.sort_by(|(id_a, a), (id_b, b)| {
            a.joined_at.cmp(&b.joined_at).then_with(|| id_a.cmp(id_b))
        });
        fighters
    }

    /// The two eligible fighters, or `None` if a seat is empty.
    pub fn seats(&self) -> Option<[(&ParticipantId, &Participant); 2]> {
        match self.fighters().as_slice() {
            [a, b, ..] => Some([*a, *b]),
            _ => None,
        }
    }

    /// The fighter allowed to start the duel (seat A).
    pub fn starter(&self) -> Option<&ParticipantId> {
        self.fighters().first().map(|(id, _)| *id)
    }

    /// Log entries in round order.
    pub fn log_entries(&self) -> impl Iterator<Item = &RoundOutcome> {
        self.log.values()
    }

    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.log.values().next_back()
    }

    pub fn is_finished(&self) -> bool {
        self.status == RoomStatus::Finished
    }

    /// The current phase, or `None` when the room is not active.
    pub fn phase(&self) -> Option<Phase> {
        match self.status {
            RoomStatus::Active => self.tick.map(|t| t.phase),
            _ => None,
        }
    }
}
