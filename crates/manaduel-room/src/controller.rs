//! The per-room round controller.
//!
//! Every client of a room runs its own [`RoomController`] against the same
//! shared store. There is no server and no leader: the only thing that
//! keeps two clients from resolving the same round is the store's
//! compare-and-swap.
//!
//! # Round protocol
//!
//! 1. While the tick is in `plan` and its deadline has not passed, nothing
//!    happens.
//! 2. Once the deadline passes, every polling client tries to flip the tick
//!    to `resolving` with a compare-and-swap that re-checks the phase, the
//!    round number and the deadline inside the store's atomic section.
//!    Exactly one attempt commits.
//! 3. Only the client whose attempt committed computes the outcome. It
//!    writes it with a second compare-and-swap on the whole room that only
//!    applies while the tick is still `resolving` for that same round, so a
//!    delayed or repeated write can never apply a round twice.
//! 4. If a seat is empty at that point, nothing is written and the room
//!    stays in `resolving`. The holder retries on every poll until a second
//!    fighter is seated again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use manaduel_combat::{Outcome, RawAllocation, compute_outcome, sanitize};
use manaduel_protocol::{
    Allocation, Codec, JsonCodec, Observer, Participant, ParticipantId,
    RoomCode, RoomSnapshot, RoomStatus, RoundOutcome, Tick, Winner, log_key,
    paths,
};
use manaduel_store::{SharedStore, StoreError, StorePath, Subscription};
use manaduel_tick::Clock;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{DuelState, RoomConfig, RoomError};

/// What a client asks for when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRole {
    /// Take a fighter seat if one is free, otherwise watch.
    Fighter,
    /// Watch only.
    Observer,
}

/// What a client got when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Fighter,
    Observer,
}

/// Result of one [`RoomController::try_advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The duel has not started.
    Idle,
    /// The plan phase of `round` is still running.
    Waiting { round: u32, remaining_ms: u64 },
    /// Another client moved `round` to `resolving` first.
    Lost { round: u32 },
    /// `round` is being resolved by another client.
    Pending { round: u32 },
    /// This client holds `round` but a seat is empty; nothing was written.
    Skipped { round: u32 },
    /// This client resolved a round. `winner` is set if the duel ended.
    Resolved {
        outcome: RoundOutcome,
        winner: Option<Winner>,
    },
    /// The duel is over.
    Finished { winner: Option<Winner> },
}

/// What the resolution transaction decided.
enum Resolution {
    Applied {
        entry: RoundOutcome,
        winner: Option<Winner>,
    },
    /// Fewer than two fighters are seated.
    Short,
    /// The tick is no longer `resolving` for this round.
    Stale,
}

/// Drives one room on behalf of one participant.
pub struct RoomController<S: SharedStore, C: Clock> {
    code: RoomCode,
    me: ParticipantId,
    config: RoomConfig,
    store: Arc<S>,
    clock: C,
    codec: JsonCodec,
    /// Round this client moved to `resolving` and has not yet written.
    /// 0 when none, since rounds start at 1.
    held_round: AtomicU32,
}

impl<S: SharedStore, C: Clock> RoomController<S, C> {
    pub fn new(
        code: RoomCode,
        me: ParticipantId,
        config: RoomConfig,
        store: Arc<S>,
        clock: C,
    ) -> Self {
        Self {
            code,
            me,
            config: config.validated(),
            store,
            clock,
            codec: JsonCodec,
            held_round: AtomicU32::new(0),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.me
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Joins the room, creating it in `lobby` if the code is unused.
    ///
    /// A fighter seat is granted while the duel is not finished and fewer
    /// than two fighters are seated; otherwise the caller becomes an
    /// observer. Joining again while already seated changes nothing.
    pub async fn join(&self, name: &str, role: JoinRole) -> Result<Seat, RoomError> {
        let now = self.clock.now_ms();
        let rules = &self.config.rules;
        let me = &self.me;

        let (committed, (seat, created)) = self
            .update_room(|room| {
                let created = room.is_none();
                let mut room = room.unwrap_or_else(|| RoomSnapshot::lobby(now));

                if room.participants.contains_key(me) {
                    return Ok((None, (Seat::Fighter, false)));
                }

                let seat_free = role == JoinRole::Fighter
                    && DuelState::of(&room).is_joinable()
                    && room.participants.len() < 2;
                if seat_free {
                    room.observers.remove(me);
                    room.participants.insert(
                        me.clone(),
                        Participant::seeded(
                            name,
                            rules.start_hp,
                            rules.start_mana,
                            rules.max_mana,
                            now,
                        ),
                    );
                    return Ok((Some(room), (Seat::Fighter, created)));
                }

                if room.observers.contains_key(me) {
                    return Ok((None, (Seat::Observer, false)));
                }
                room.observers.insert(me.clone(), Observer::new(name, now));
                Ok((Some(room), (Seat::Observer, created)))
            })
            .await?;

        if created && committed {
            info!(room = %self.code, "room created");
        }
        if committed {
            info!(room = %self.code, participant = %self.me, ?seat, "joined room");
        } else {
            debug!(room = %self.code, participant = %self.me, ?seat, "already in room");
        }
        Ok(seat)
    }

    /// Gives up this client's seat or observer slot.
    pub async fn leave(&self) -> Result<(), RoomError> {
        let code = &self.code;
        let me = &self.me;

        self.update_room(|room| {
            let mut room = room.ok_or_else(|| RoomError::NotFound(code.clone()))?;
            let was_fighter = room.participants.remove(me).is_some();
            let was_observer = room.observers.remove(me).is_some();
            if !was_fighter && !was_observer {
                return Err(RoomError::NotInRoom(me.clone(), code.clone()));
            }
            Ok((Some(room), ()))
        })
        .await?;

        info!(room = %self.code, participant = %self.me, "left room");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lobby → plan
    // -----------------------------------------------------------------------

    /// Starts the duel: `lobby → active`, round 1 in `plan`.
    ///
    /// Only the starter (the earliest-joined fighter) may call this, and
    /// only with both seats filled.
    pub async fn start(&self) -> Result<Tick, RoomError> {
        let now = self.clock.now_ms();
        let plan_ms = self.config.plan_duration_ms;
        let code = &self.code;
        let me = &self.me;

        let (_, tick) = self
            .update_room(|room| {
                let mut room = room.ok_or_else(|| RoomError::NotFound(code.clone()))?;

                let state = DuelState::of(&room);
                if state != DuelState::Lobby {
                    return Err(RoomError::InvalidState(format!(
                        "cannot start a room in state {state}"
                    )));
                }
                if !room.participants.contains_key(me) {
                    return Err(RoomError::NotInRoom(me.clone(), code.clone()));
                }
                match room.seats() {
                    None => return Err(RoomError::NotEnoughParticipants(code.clone())),
                    Some([(starter, _), _]) if starter != me => {
                        return Err(RoomError::NotStarter(me.clone(), code.clone()));
                    }
                    Some(_) => {}
                }

                let tick = Tick::plan(1, now, plan_ms);
                room.status = RoomStatus::Active;
                room.tick = Some(tick);
                Ok((Some(room), tick))
            })
            .await?;

        info!(room = %self.code, ends_at = tick.ends_at, "duel started");
        Ok(tick)
    }

    // -----------------------------------------------------------------------
    // Plan phase
    // -----------------------------------------------------------------------

    /// Stores this fighter's allocation for the current round.
    ///
    /// The input is sanitized against the fighter's current mana and the
    /// sanitized value is returned. Later submissions in the same plan
    /// phase replace earlier ones.
    pub async fn submit(&self, raw: &RawAllocation) -> Result<Allocation, RoomError> {
        let code = &self.code;
        let me = &self.me;

        let (_, alloc) = self
            .update_room(|room| {
                let mut room = room.ok_or_else(|| RoomError::NotFound(code.clone()))?;

                let state = DuelState::of(&room);
                if state != DuelState::Planning {
                    return Err(RoomError::InvalidState(format!(
                        "allocations are only accepted while planning, room is {state}"
                    )));
                }
                let fighter = room
                    .participants
                    .get_mut(me)
                    .ok_or_else(|| RoomError::NotInRoom(me.clone(), code.clone()))?;

                let alloc = sanitize(raw, fighter.mana);
                if fighter.allocation == alloc {
                    return Ok((None, alloc));
                }
                fighter.allocation = alloc;
                Ok((Some(room), alloc))
            })
            .await?;

        debug!(
            room = %self.code,
            participant = %self.me,
            attack = alloc.attack,
            shield = alloc.shield,
            channel = alloc.channel,
            regen = alloc.regen,
            "allocation submitted"
        );
        Ok(alloc)
    }

    // -----------------------------------------------------------------------
    // Plan → resolving → plan | finished
    // -----------------------------------------------------------------------

    /// One poll step. Safe to call from any number of clients at once.
    pub async fn try_advance(&self) -> Result<Advance, RoomError> {
        let room = self.snapshot().await?;
        let now = self.clock.now_ms();

        let advance = match (DuelState::of(&room), room.tick) {
            (DuelState::Finished, _) => Advance::Finished { winner: room.winner },
            (DuelState::Planning, Some(tick)) if !tick.is_due(now) => Advance::Waiting {
                round: tick.round,
                remaining_ms: tick.remaining_ms(now),
            },
            (DuelState::Planning, Some(tick)) => {
                if self.claim_resolution(tick.round).await? {
                    self.resolve_round(tick.round).await?
                } else {
                    Advance::Lost { round: tick.round }
                }
            }
            (DuelState::Resolving, Some(tick)) => {
                if self.held_round.load(Ordering::SeqCst) == tick.round {
                    self.resolve_round(tick.round).await?
                } else {
                    Advance::Pending { round: tick.round }
                }
            }
            _ => Advance::Idle,
        };

        trace!(room = %self.code, ?advance, "advance");
        Ok(advance)
    }

    /// Flips the tick of `round` from `plan` to `resolving` if its deadline
    /// has passed. Returns `true` if this call made the flip.
    async fn claim_resolution(&self, round: u32) -> Result<bool, RoomError> {
        let codec = &self.codec;
        let clock = &self.clock;

        let (committed, ()) = self
            .transact(&paths::tick(&self.code), |current| {
                let Some(value) = current else {
                    return Ok((None, ()));
                };
                let tick: Tick = codec.decode(value)?;
                let now = clock.now_ms();
                if tick.round != round || !tick.is_due(now) {
                    return Ok((None, ()));
                }
                Ok((Some(codec.encode(&tick.resolving(now))?), ()))
            })
            .await?;

        if committed {
            self.held_round.store(round, Ordering::SeqCst);
            debug!(room = %self.code, round, "won resolution");
        } else {
            debug!(room = %self.code, round, "lost resolution race");
        }
        Ok(committed)
    }

    /// Applies the outcome of `round`. Only called by the holder of that
    /// round.
    async fn resolve_round(&self, round: u32) -> Result<Advance, RoomError> {
        let now = self.clock.now_ms();
        let plan_ms = self.config.plan_duration_ms;
        let rules = &self.config.rules;
        let code = &self.code;

        let (committed, resolution) = self
            .update_room(|room| {
                let mut room = room.ok_or_else(|| RoomError::NotFound(code.clone()))?;

                let live = DuelState::of(&room) == DuelState::Resolving
                    && room.tick.is_some_and(|t| t.round == round);
                if !live {
                    return Ok((None, Resolution::Stale));
                }
                let Some([(id_a, a), (id_b, b)]) = room.seats() else {
                    return Ok((None, Resolution::Short));
                };

                let Outcome {
                    next_a,
                    next_b,
                    winner,
                    entry,
                } = compute_outcome(id_a, a, id_b, b, round, rules);
                let (id_a, id_b) = (id_a.clone(), id_b.clone());

                room.participants.insert(id_a, next_a);
                room.participants.insert(id_b, next_b);
                room.log.insert(log_key(round), entry.clone());
                match &winner {
                    Some(w) => {
                        room.status = RoomStatus::Finished;
                        room.winner = Some(w.clone());
                    }
                    None => room.tick = Some(Tick::plan(round + 1, now, plan_ms)),
                }
                Ok((Some(room), Resolution::Applied { entry, winner }))
            })
            .await?;

        match (committed, resolution) {
            (true, Resolution::Applied { entry, winner }) => {
                self.release(round);
                info!(room = %self.code, round, summary = %entry.summary, "round resolved");
                if let Some(w) = &winner {
                    info!(room = %self.code, round, winner = %w, "duel finished");
                }
                Ok(Advance::Resolved {
                    outcome: entry,
                    winner,
                })
            }
            (_, Resolution::Short) => {
                debug!(room = %self.code, round, "seat empty, resolution skipped");
                Ok(Advance::Skipped { round })
            }
            _ => {
                self.release(round);
                warn!(room = %self.code, round, "held round already moved on");
                Ok(Advance::Lost { round })
            }
        }
    }

    fn release(&self, round: u32) {
        let _ = self
            .held_round
            .compare_exchange(round, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// Reads the whole room.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let value = self
            .store
            .read(&paths::room(&self.code))
            .await?
            .ok_or_else(|| RoomError::NotFound(self.code.clone()))?;
        Ok(self.codec.decode(&value)?)
    }

    /// Subscribes to the room. The first snapshot is the current state.
    pub async fn watch(&self) -> Result<RoomWatch, RoomError> {
        let subscription = self.store.subscribe(&paths::room(&self.code)).await?;
        Ok(RoomWatch {
            code: self.code.clone(),
            subscription,
            codec: self.codec,
        })
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Compare-and-swap on the room record with typed decode/encode.
    ///
    /// `decide` gets the current room (or `None` if absent) and returns the
    /// room to write (or `None` to leave it untouched) plus a value to hand
    /// back to the caller.
    async fn update_room<T, F>(&self, mut decide: F) -> Result<(bool, T), RoomError>
    where
        T: Send,
        F: FnMut(Option<RoomSnapshot>) -> Result<(Option<RoomSnapshot>, T), RoomError> + Send,
    {
        let codec = &self.codec;
        self.transact(&paths::room(&self.code), |current| {
            let room = current
                .map(|value| codec.decode::<RoomSnapshot>(value))
                .transpose()?;
            let (next, out) = decide(room)?;
            let next = next.map(|room| codec.encode(&room)).transpose()?;
            Ok((next, out))
        })
        .await
    }

    /// Compare-and-swap whose update function may fail or return a value.
    async fn transact<T, F>(&self, path: &StorePath, mut decide: F) -> Result<(bool, T), RoomError>
    where
        T: Send,
        F: FnMut(Option<&Value>) -> Result<(Option<Value>, T), RoomError> + Send,
    {
        let mut verdict: Option<Result<T, RoomError>> = None;
        let outcome = self
            .store
            .compare_and_swap(path, |current| match decide(current) {
                Ok((next, out)) => {
                    verdict = Some(Ok(out));
                    next
                }
                Err(err) => {
                    verdict = Some(Err(err));
                    None
                }
            })
            .await?;

        match verdict {
            Some(result) => result.map(|out| (outcome.committed, out)),
            None => Err(StoreError::Unavailable(format!(
                "compare-and-swap on {path} never ran its update"
            ))
            .into()),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomWatch
// ---------------------------------------------------------------------------

/// A live feed of room snapshots.
///
/// Values that are absent or fail to decode are skipped.
pub struct RoomWatch {
    code: RoomCode,
    subscription: Subscription,
    codec: JsonCodec,
}

impl RoomWatch {
    /// Waits for the next snapshot. `None` once the store side closed.
    pub async fn next(&mut self) -> Option<RoomSnapshot> {
        loop {
            let value = self.subscription.recv().await?;
            if value.is_null() {
                continue;
            }
            match self.codec.decode(&value) {
                Ok(room) => return Some(room),
                Err(err) => warn!(room = %self.code, error = %err, "undecodable room update"),
            }
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }
}
