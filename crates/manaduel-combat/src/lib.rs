//! Combat rules for Manaduel.
//!
//! Two pure pieces, both free of I/O:
//!
//! - [`sanitize`] turns whatever a client submitted into an [`Allocation`]
//!   the fighter can afford.
//! - [`compute_outcome`] resolves one round from the two fighters' records.
//!
//! Numeric constants live in [`DuelRules`] so rooms can be configured; the
//! regen tiers are fixed ([`REGEN_TIERS`]).
//!
//! ```
//! use manaduel_combat::{RawAllocation, sanitize};
//!
//! // Asking for 10 attack and 10 shield with 10 mana gets half of each.
//! let alloc = sanitize(&RawAllocation::new(10, 10, 0, 0), 10);
//! assert_eq!((alloc.attack, alloc.shield), (5, 5));
//! ```
//!
//! [`Allocation`]: manaduel_protocol::Allocation

mod allocation;
mod outcome;
mod rules;

pub use allocation::{RawAllocation, coerce_amount, sanitize};
pub use outcome::{Outcome, compute_outcome};
pub use rules::{
    DuelRules, REGEN_TIERS, RegenTier, regen_bonus_for, regen_tier_for,
};
