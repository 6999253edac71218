//! Turning untrusted allocation input into a budget-respecting
//! [`Allocation`].
//!
//! Nothing here fails. Garbage becomes 0, negative becomes 0, an
//! unaffordable regen tier drops to a cheaper one, and overspending is
//! scaled down proportionally.

use manaduel_protocol::Allocation;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::rules::regen_tier_for;

/// An allocation as a client submitted it, before any validation.
///
/// Deserializing is lenient: each field accepts numbers, numeric strings
/// (`"12"`, `" 7 mana"`), or anything else (which counts as 0).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct RawAllocation {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub attack: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub shield: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub channel: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub regen: i64,
}

impl RawAllocation {
    pub fn new(attack: i64, shield: i64, channel: i64, regen: i64) -> Self {
        Self {
            attack,
            shield,
            channel,
            regen,
        }
    }

    /// Reads a raw allocation out of an arbitrary JSON value. Anything
    /// that is not an object is the zero allocation.
    pub fn from_value(value: &Value) -> Self {
        Self::deserialize(value).unwrap_or_default()
    }
}

impl From<Allocation> for RawAllocation {
    fn from(alloc: Allocation) -> Self {
        Self {
            attack: i64::from(alloc.attack),
            shield: i64::from(alloc.shield),
            channel: i64::from(alloc.channel),
            regen: i64::from(alloc.regen),
        }
    }
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_amount(&value))
}

/// Best-effort integer reading of a JSON value; 0 when there is none.
///
/// Floats truncate toward zero. Strings use their leading integer, so
/// `"12px"` is 12 and `"px12"` is 0.
pub fn coerce_amount(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            // `as` saturates and maps NaN to 0.
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => leading_integer(s),
        _ => 0,
    }
}

fn leading_integer(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut n: i64 = 0;
    for d in digits.bytes().take_while(u8::is_ascii_digit) {
        n = n.saturating_mul(10).saturating_add(i64::from(d - b'0'));
    }
    if negative { -n } else { n }
}

/// Normalizes `raw` so that it can be paid for out of `budget`.
///
/// 1. `regen` becomes the largest tier (0, 7, 12) that is neither above
///    the request nor above the budget.
/// 2. attack, shield and channel are each clamped to
///    `[0, budget - regen]`.
/// 3. If the total still exceeds the budget, attack, shield and channel
///    are scaled by `(budget - regen) / (attack + shield + channel)`,
///    each rounded down. Regen is never scaled.
///
/// The result satisfies `spent() <= budget`, and sanitizing it again with
/// the same budget returns it unchanged.
pub fn sanitize(raw: &RawAllocation, budget: u32) -> Allocation {
    let regen = regen_tier_for(raw.regen, budget).cost;
    let max_other = budget - regen;
    let clamp = |amount: i64| {
        u32::try_from(amount.clamp(0, i64::from(max_other))).unwrap_or(0)
    };

    let mut attack = clamp(raw.attack);
    let mut shield = clamp(raw.shield);
    let mut channel = clamp(raw.channel);

    let other = u64::from(attack) + u64::from(shield) + u64::from(channel);
    if other + u64::from(regen) > u64::from(budget) {
        // `other` exceeds `max_other` here, so it is non-zero.
        let scale = |amount: u32| {
            let scaled = u64::from(amount) * u64::from(max_other) / other;
            u32::try_from(scaled).unwrap_or(0)
        };
        attack = scale(attack);
        shield = scale(shield);
        channel = scale(channel);
    }

    Allocation {
        attack,
        shield,
        channel,
        regen,
    }
}
