//! Round resolution.
//!
//! [`compute_outcome`] is a pure function of its inputs. Every client that
//! evaluates the same two records for the same round gets bit-identical
//! results, which is what lets the room layer hand resolution to whichever
//! client wins the phase transition.

use manaduel_protocol::{
    Allocation, Participant, ParticipantId, RoundOutcome, SeatPair, Winner,
};

use crate::allocation::{RawAllocation, sanitize};
use crate::rules::{DuelRules, regen_bonus_for};

/// Everything a resolution produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Seat A after the round.
    pub next_a: Participant,
    /// Seat B after the round.
    pub next_b: Participant,
    /// Set when at least one fighter reached 0 hp this round.
    pub winner: Option<Winner>,
    /// The log entry for this round.
    pub entry: RoundOutcome,
}

/// Effective values for one fighter this round, bonuses included.
#[derive(Debug, Clone, Copy)]
struct Effective {
    attack: u32,
    shield: u32,
    stored: u32,
}

impl Effective {
    fn of(alloc: &Allocation, rules: &DuelRules) -> Self {
        Self {
            attack: alloc.attack.saturating_add(rules.bonus_for(alloc.attack)),
            shield: alloc.shield.saturating_add(rules.bonus_for(alloc.shield)),
            stored: alloc.channel.saturating_add(rules.bonus_for(alloc.channel)),
        }
    }
}

/// Resolves one round between seat A and seat B.
///
/// Both allocations are re-sanitized against the owner's current mana, so
/// a record edited behind the controller's back still cannot overspend.
/// Damage is simultaneous: both hp values are computed before the winner is
/// decided, and two fallen fighters make a draw.
pub fn compute_outcome(
    id_a: &ParticipantId,
    a: &Participant,
    id_b: &ParticipantId,
    b: &Participant,
    round: u32,
    rules: &DuelRules,
) -> Outcome {
    let alloc_a = sanitize(&RawAllocation::from(a.allocation), a.mana);
    let alloc_b = sanitize(&RawAllocation::from(b.allocation), b.mana);

    let fx_a = Effective::of(&alloc_a, rules);
    let fx_b = Effective::of(&alloc_b, rules);

    let damage_to_a = fx_b.attack.saturating_sub(fx_a.shield);
    let damage_to_b = fx_a.attack.saturating_sub(fx_b.shield);

    let next_a = advance(a, &alloc_a, &fx_a, damage_to_a, rules);
    let next_b = advance(b, &alloc_b, &fx_b, damage_to_b, rules);

    let winner = match (next_a.is_defeated(), next_b.is_defeated()) {
        (true, true) => Some(Winner::Draw),
        (true, false) => Some(Winner::Participant(id_b.clone())),
        (false, true) => Some(Winner::Participant(id_a.clone())),
        (false, false) => None,
    };

    let summary = format!(
        "Round {round}: Attack {} vs {} | Shield {} vs {} | Damage: {} / {} | Regen +{}/+{}",
        fx_a.attack,
        fx_b.shield,
        fx_b.attack,
        fx_a.shield,
        damage_to_a,
        damage_to_b,
        next_a.regen_bonus,
        next_b.regen_bonus,
    );

    let entry = RoundOutcome {
        round,
        participants: SeatPair {
            a: id_a.clone(),
            b: id_b.clone(),
        },
        summary,
        attack: SeatPair {
            a: fx_a.attack,
            b: fx_b.attack,
        },
        shield: SeatPair {
            a: fx_a.shield,
            b: fx_b.shield,
        },
        damage: SeatPair {
            a: damage_to_a,
            b: damage_to_b,
        },
        stored: SeatPair {
            a: fx_a.stored,
            b: fx_b.stored,
        },
        regen_bonus: SeatPair {
            a: next_a.regen_bonus,
            b: next_b.regen_bonus,
        },
    };

    Outcome {
        next_a,
        next_b,
        winner,
        entry,
    }
}

/// One fighter's record after the round.
///
/// The regen investment made this round already counts toward this
/// round's mana gain.
fn advance(
    p: &Participant,
    alloc: &Allocation,
    fx: &Effective,
    damage: u32,
    rules: &DuelRules,
) -> Participant {
    let regen_bonus = p.regen_bonus.saturating_add(regen_bonus_for(alloc.regen));
    let mana = p
        .mana
        .saturating_sub(alloc.spent())
        .saturating_add(rules.base_regen)
        .saturating_add(regen_bonus)
        .saturating_add(fx.stored)
        .min(p.max_mana);

    Participant {
        hp: p.hp.saturating_sub(damage).min(rules.hp_max),
        mana,
        stored: fx.stored,
        regen_bonus,
        allocation: Allocation::ZERO,
        ..p.clone()
    }
}
