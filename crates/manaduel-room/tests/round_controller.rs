//! Integration tests for the round controller over the in-memory store.
//!
//! Each test plays several clients against one `MemoryBackend`, the same
//! way separate processes would share a remote store.

use std::sync::Arc;

use futures_util::future::join_all;
use manaduel_combat::RawAllocation;
use manaduel_protocol::{
    Allocation, Phase, ParticipantId, RoomCode, RoomStatus, Winner, log_key, paths,
};
use manaduel_room::{Advance, JoinRole, RoomConfig, RoomController, RoomError, Seat};
use manaduel_store::{MemoryBackend, MemoryStore, SharedStore, StoreError};
use manaduel_tick::{Clock, ManualClock, PollConfig};
use serde_json::{Map, json};

type Controller = RoomController<MemoryStore, ManualClock>;

const T0: u64 = 1_700_000_000_000;
const PLAN_MS: u64 = 1_000;

// =========================================================================
// Helpers
// =========================================================================

fn config() -> RoomConfig {
    RoomConfig {
        plan_duration_ms: PLAN_MS,
        poll: PollConfig {
            interval_ms: 50,
            initial_jitter_ms: 0,
            ..PollConfig::default()
        },
        ..RoomConfig::default()
    }
}

fn pid(raw: &str) -> ParticipantId {
    ParticipantId::parse(raw).unwrap()
}

async fn client(backend: &MemoryBackend, clock: &ManualClock, id: &str) -> Controller {
    let store = backend.client();
    store.connect().await.unwrap();
    RoomController::new(
        RoomCode::parse("arena").unwrap(),
        pid(id),
        config(),
        Arc::new(store),
        clock.clone(),
    )
}

/// Alice and Bob seated (Alice first), duel started at `T0 + 1`.
async fn started_duel() -> (MemoryBackend, ManualClock, Controller, Controller) {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    let bob = client(&backend, &clock, "bob").await;

    assert_eq!(alice.join("Alice", JoinRole::Fighter).await.unwrap(), Seat::Fighter);
    clock.advance(1);
    assert_eq!(bob.join("Bob", JoinRole::Fighter).await.unwrap(), Seat::Fighter);
    alice.start().await.unwrap();

    (backend, clock, alice, bob)
}

async fn set_hp(controller: &Controller, id: &str, hp: u32) {
    let mut fields = Map::new();
    fields.insert("hp".into(), json!(hp));
    controller
        .store()
        .update_fields(&paths::participant(controller.code(), &pid(id)), fields)
        .await
        .unwrap();
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_first_join_creates_lobby() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;

    let seat = alice.join("  ", JoinRole::Fighter).await.unwrap();
    assert_eq!(seat, Seat::Fighter);

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.status, RoomStatus::Lobby);
    assert_eq!(room.created_at, T0);
    let me = &room.participants[&pid("alice")];
    assert_eq!(me.name, "Arcane Mage");
    assert_eq!((me.hp, me.mana, me.max_mana), (30, 10, 20));
    assert_eq!(me.regen_bonus, 0);
    assert!(me.allocation.is_zero());
}

#[tokio::test]
async fn test_room_codes_are_case_insensitive() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    alice.join("Alice", JoinRole::Fighter).await.unwrap();

    let store = backend.client();
    store.connect().await.unwrap();
    let shouting = RoomController::new(
        RoomCode::parse("ARENA").unwrap(),
        pid("bob"),
        config(),
        Arc::new(store),
        clock.clone(),
    );
    shouting.join("Bob", JoinRole::Fighter).await.unwrap();

    assert_eq!(alice.snapshot().await.unwrap().participants.len(), 2);
}

#[tokio::test]
async fn test_third_fighter_becomes_observer() {
    let (backend, clock, alice, _bob) = started_duel().await;
    let carol = client(&backend, &clock, "carol").await;

    let seat = carol.join("Carol", JoinRole::Fighter).await.unwrap();
    assert_eq!(seat, Seat::Observer);

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.participants.len(), 2);
    assert_eq!(room.observers[&pid("carol")].name, "Carol");
}

#[tokio::test]
async fn test_rejoin_keeps_existing_record() {
    let (_backend, _clock, alice, _bob) = started_duel().await;
    set_hp(&alice, "alice", 12).await;

    let seat = alice.join("Someone Else", JoinRole::Fighter).await.unwrap();
    assert_eq!(seat, Seat::Fighter);

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.participants[&pid("alice")].hp, 12);
    assert_eq!(room.participants[&pid("alice")].name, "Alice");
}

#[tokio::test]
async fn test_observer_can_take_free_seat_later() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;

    assert_eq!(alice.join("Alice", JoinRole::Observer).await.unwrap(), Seat::Observer);
    assert_eq!(alice.join("Alice", JoinRole::Fighter).await.unwrap(), Seat::Fighter);

    let room = alice.snapshot().await.unwrap();
    assert!(room.observers.is_empty());
    assert!(room.participants.contains_key(&pid("alice")));
}

#[tokio::test]
async fn test_leave_removes_record() {
    let (_backend, _clock, alice, bob) = started_duel().await;

    bob.leave().await.unwrap();
    let room = alice.snapshot().await.unwrap();
    assert!(!room.participants.contains_key(&pid("bob")));

    let result = bob.leave().await;
    assert!(matches!(result, Err(RoomError::NotInRoom(..))));
}

// =========================================================================
// Starting
// =========================================================================

#[tokio::test]
async fn test_start_requires_two_fighters() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    alice.join("Alice", JoinRole::Fighter).await.unwrap();

    let result = alice.start().await;
    assert!(matches!(result, Err(RoomError::NotEnoughParticipants(_))));
    assert_eq!(alice.snapshot().await.unwrap().status, RoomStatus::Lobby);
}

#[tokio::test]
async fn test_only_starter_can_start() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    let bob = client(&backend, &clock, "bob").await;
    let carol = client(&backend, &clock, "carol").await;

    alice.join("Alice", JoinRole::Fighter).await.unwrap();
    clock.advance(5);
    bob.join("Bob", JoinRole::Fighter).await.unwrap();
    carol.join("Carol", JoinRole::Observer).await.unwrap();

    assert!(matches!(bob.start().await, Err(RoomError::NotStarter(..))));
    assert!(matches!(carol.start().await, Err(RoomError::NotInRoom(..))));

    let tick = alice.start().await.unwrap();
    assert_eq!(tick.round, 1);
    assert_eq!(tick.phase, Phase::Plan);
    assert_eq!(tick.ends_at, T0 + 5 + PLAN_MS);

    assert!(matches!(alice.start().await, Err(RoomError::InvalidState(_))));
}

#[tokio::test]
async fn test_start_unknown_room_is_not_found() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;

    assert!(matches!(alice.start().await, Err(RoomError::NotFound(_))));
    assert!(matches!(alice.snapshot().await, Err(RoomError::NotFound(_))));
}

// =========================================================================
// Submitting
// =========================================================================

#[tokio::test]
async fn test_submit_sanitizes_against_current_mana() {
    let (_backend, _clock, alice, _bob) = started_duel().await;

    let alloc = alice.submit(&RawAllocation::new(10, 10, 0, 0)).await.unwrap();
    assert_eq!(alloc, Allocation { attack: 5, shield: 5, channel: 0, regen: 0 });

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.participants[&pid("alice")].allocation, alloc);
}

#[tokio::test]
async fn test_submit_last_write_wins() {
    let (_backend, _clock, alice, _bob) = started_duel().await;

    alice.submit(&RawAllocation::new(3, 0, 0, 0)).await.unwrap();
    alice.submit(&RawAllocation::new(0, 4, 0, 0)).await.unwrap();

    let room = alice.snapshot().await.unwrap();
    assert_eq!(
        room.participants[&pid("alice")].allocation,
        Allocation { shield: 4, ..Allocation::ZERO }
    );
}

#[tokio::test]
async fn test_submit_rejected_outside_plan_phase() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    alice.join("Alice", JoinRole::Fighter).await.unwrap();

    let result = alice.submit(&RawAllocation::new(1, 0, 0, 0)).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));
}

#[tokio::test]
async fn test_observer_cannot_submit() {
    let (backend, clock, _alice, _bob) = started_duel().await;
    let carol = client(&backend, &clock, "carol").await;
    carol.join("Carol", JoinRole::Observer).await.unwrap();

    let result = carol.submit(&RawAllocation::new(1, 0, 0, 0)).await;
    assert!(matches!(result, Err(RoomError::NotInRoom(..))));
}

// =========================================================================
// Advancing
// =========================================================================

#[tokio::test]
async fn test_advance_idle_in_lobby() {
    let backend = MemoryBackend::new();
    let clock = ManualClock::new(T0);
    let alice = client(&backend, &clock, "alice").await;
    alice.join("Alice", JoinRole::Fighter).await.unwrap();

    assert_eq!(alice.try_advance().await.unwrap(), Advance::Idle);
}

#[tokio::test]
async fn test_advance_waits_for_deadline() {
    let (_backend, clock, alice, _bob) = started_duel().await;
    clock.advance(400);

    let advance = alice.try_advance().await.unwrap();
    assert_eq!(advance, Advance::Waiting { round: 1, remaining_ms: PLAN_MS - 400 });
}

#[tokio::test]
async fn test_round_resolves_after_deadline() {
    let (_backend, clock, alice, bob) = started_duel().await;
    alice.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();
    bob.submit(&RawAllocation::new(0, 2, 0, 0)).await.unwrap();

    clock.advance(PLAN_MS);
    let advance = bob.try_advance().await.unwrap();

    let Advance::Resolved { outcome, winner } = advance else {
        panic!("expected a resolution, got {advance:?}");
    };
    assert_eq!(winner, None);
    assert_eq!(outcome.round, 1);
    assert_eq!(outcome.participants.a, pid("alice"));
    assert_eq!(outcome.attack.a, 8);
    assert_eq!(outcome.damage.b, 6);

    let room = alice.snapshot().await.unwrap();
    let (a, b) = (&room.participants[&pid("alice")], &room.participants[&pid("bob")]);
    assert_eq!((a.hp, a.mana), (30, 8));
    assert_eq!((b.hp, b.mana), (24, 12));
    assert!(a.allocation.is_zero() && b.allocation.is_zero());

    let tick = room.tick.unwrap();
    assert_eq!(tick.round, 2);
    assert_eq!(tick.phase, Phase::Plan);
    assert_eq!(tick.ends_at, clock.now_ms() + PLAN_MS);
    assert_eq!(room.log[&log_key(1)], outcome);
}

#[tokio::test]
async fn test_concurrent_advance_resolves_exactly_once() {
    let (backend, clock, alice, bob) = started_duel().await;
    alice.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();

    let mut contenders = vec![alice, bob];
    for i in 0..6 {
        let watcher = client(&backend, &clock, &format!("watcher-{i}")).await;
        watcher.join("Watcher", JoinRole::Observer).await.unwrap();
        contenders.push(watcher);
    }

    clock.advance(PLAN_MS);
    let results = join_all(contenders.iter().map(|c| c.try_advance())).await;

    let resolved = results
        .iter()
        .filter(|r| matches!(r, Ok(Advance::Resolved { .. })))
        .count();
    assert_eq!(resolved, 1, "results: {results:?}");
    assert!(results.iter().all(|r| r.is_ok()));

    let room = contenders[0].snapshot().await.unwrap();
    assert_eq!(room.log.len(), 1);
    assert_eq!(room.tick.unwrap().round, 2);
    assert_eq!(room.participants[&pid("bob")].hp, 22);
}

#[tokio::test]
async fn test_round_numbers_increase_by_one() {
    let (_backend, clock, alice, bob) = started_duel().await;

    for round in 1..=4u32 {
        let room = alice.snapshot().await.unwrap();
        assert_eq!(room.tick.unwrap().round, round);

        alice.submit(&RawAllocation::new(1, 0, 0, 0)).await.unwrap();
        clock.advance(PLAN_MS);
        let advance = bob.try_advance().await.unwrap();
        assert!(matches!(advance, Advance::Resolved { ref outcome, .. } if outcome.round == round));

        // A second poll after resolving never re-applies the round.
        assert!(matches!(
            alice.try_advance().await.unwrap(),
            Advance::Waiting { round: r, .. } if r == round + 1
        ));
    }

    let room = alice.snapshot().await.unwrap();
    let rounds: Vec<u32> = room.log_entries().map(|e| e.round).collect();
    assert_eq!(rounds, vec![1, 2, 3, 4]);
    assert_eq!(room.participants[&pid("bob")].hp, 26);
}

#[tokio::test]
async fn test_regen_bonus_persists_across_rounds() {
    let (_backend, clock, alice, bob) = started_duel().await;
    alice.submit(&RawAllocation::new(0, 0, 0, 9)).await.unwrap();
    clock.advance(PLAN_MS);
    bob.try_advance().await.unwrap();

    clock.advance(PLAN_MS);
    bob.try_advance().await.unwrap();

    let room = alice.snapshot().await.unwrap();
    let a = &room.participants[&pid("alice")];
    assert_eq!(a.regen_bonus, 1);
    // Round 1: 10 - 7 + 4 + 1 = 8. Round 2: 8 + 4 + 1 = 13.
    assert_eq!(a.mana, 13);
}

#[tokio::test]
async fn test_simultaneous_knockout_is_draw() {
    let (backend, clock, alice, bob) = started_duel().await;
    set_hp(&alice, "alice", 5).await;
    set_hp(&alice, "bob", 5).await;
    alice.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();
    bob.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();

    clock.advance(PLAN_MS);
    let advance = alice.try_advance().await.unwrap();
    assert!(matches!(advance, Advance::Resolved { winner: Some(Winner::Draw), .. }));

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.status, RoomStatus::Finished);
    assert_eq!(room.winner, Some(Winner::Draw));
    let tick = room.tick.unwrap();
    assert_eq!((tick.round, tick.phase), (1, Phase::Resolving));

    // Terminal: nothing moves any more.
    clock.advance(10 * PLAN_MS);
    assert_eq!(
        bob.try_advance().await.unwrap(),
        Advance::Finished { winner: Some(Winner::Draw) }
    );
    let result = bob.submit(&RawAllocation::new(1, 0, 0, 0)).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));

    bob.leave().await.unwrap();
    let late = client(&backend, &clock, "dave").await;
    assert_eq!(late.join("Dave", JoinRole::Fighter).await.unwrap(), Seat::Observer);
    assert_eq!(alice.snapshot().await.unwrap().winner, Some(Winner::Draw));
}

#[tokio::test]
async fn test_knockout_names_survivor() {
    let (_backend, clock, alice, bob) = started_duel().await;
    set_hp(&alice, "bob", 4).await;
    alice.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();

    clock.advance(PLAN_MS);
    let advance = bob.try_advance().await.unwrap();
    assert!(matches!(
        advance,
        Advance::Resolved { winner: Some(Winner::Participant(ref id)), .. } if id == &pid("alice")
    ));
}

// =========================================================================
// Stalls and failures
// =========================================================================

#[tokio::test]
async fn test_lone_fighter_stalls_until_seat_refilled() {
    let (backend, clock, alice, bob) = started_duel().await;
    bob.leave().await.unwrap();

    clock.advance(PLAN_MS);
    assert_eq!(alice.try_advance().await.unwrap(), Advance::Skipped { round: 1 });
    assert_eq!(alice.try_advance().await.unwrap(), Advance::Skipped { round: 1 });

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.status, RoomStatus::Active);
    assert_eq!(room.phase(), Some(Phase::Resolving));
    assert!(room.log.is_empty());
    assert_eq!(room.winner, None);

    // Only the holder of the round may resolve it.
    let carol = client(&backend, &clock, "carol").await;
    assert_eq!(carol.join("Carol", JoinRole::Fighter).await.unwrap(), Seat::Fighter);
    assert_eq!(carol.try_advance().await.unwrap(), Advance::Pending { round: 1 });

    let advance = alice.try_advance().await.unwrap();
    assert!(matches!(advance, Advance::Resolved { ref outcome, .. } if outcome.round == 1));
    assert_eq!(alice.snapshot().await.unwrap().tick.unwrap().round, 2);
}

#[tokio::test]
async fn test_store_outage_does_not_corrupt_room() {
    let (backend, clock, alice, bob) = started_duel().await;
    alice.submit(&RawAllocation::new(6, 0, 0, 0)).await.unwrap();
    clock.advance(PLAN_MS);

    backend.set_available(false);
    let result = alice.try_advance().await;
    assert!(matches!(result, Err(RoomError::Store(StoreError::Unavailable(_)))));
    backend.set_available(true);

    let room = alice.snapshot().await.unwrap();
    assert_eq!(room.phase(), Some(Phase::Plan));
    assert_eq!(room.participants[&pid("bob")].hp, 30);

    assert!(matches!(bob.try_advance().await.unwrap(), Advance::Resolved { .. }));
    assert_eq!(alice.snapshot().await.unwrap().participants[&pid("bob")].hp, 22);
}

#[tokio::test]
async fn test_disconnected_client_gets_store_error() {
    let (_backend, _clock, alice, _bob) = started_duel().await;
    alice.store().disconnect().await.unwrap();

    let result = alice.try_advance().await;
    assert!(matches!(result, Err(RoomError::Store(StoreError::NotConnected))));
}

// =========================================================================
// Watching
// =========================================================================

#[tokio::test]
async fn test_watch_streams_room_changes() {
    let (_backend, clock, alice, bob) = started_duel().await;
    let mut watch = bob.watch().await.unwrap();

    let first = watch.next().await.unwrap();
    assert_eq!(first.phase(), Some(Phase::Plan));

    alice.submit(&RawAllocation::new(2, 0, 0, 0)).await.unwrap();
    let second = watch.next().await.unwrap();
    assert_eq!(second.participants[&pid("alice")].allocation.attack, 2);

    clock.advance(PLAN_MS);
    alice.try_advance().await.unwrap();
    // Tick flip, then the resolution write.
    let flipped = watch.next().await.unwrap();
    assert_eq!(flipped.phase(), Some(Phase::Resolving));
    let resolved = watch.next().await.unwrap();
    assert_eq!(resolved.tick.unwrap().round, 2);
    assert_eq!(resolved.last_outcome().unwrap().round, 1);
}
