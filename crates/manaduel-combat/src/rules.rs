//! Combat constants.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Numeric rules of a duel.
///
/// Every field has a default, so a partial JSON object is a valid config:
/// `{"base_regen": 5}` only changes the base regen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelRules {
    /// Upper bound for hp.
    pub hp_max: u32,
    /// Hp a fighter is seated with.
    pub start_hp: u32,
    /// Mana a fighter is seated with.
    pub start_mana: u32,
    /// Per-fighter mana cap.
    pub max_mana: u32,
    /// Mana regained every resolution before bonuses.
    pub base_regen: u32,
    /// An attack, shield or channel of at least this much gets the bonus.
    pub bonus_threshold: u32,
    /// Extra effective value granted at or above `bonus_threshold`.
    pub threshold_bonus: u32,
}

impl Default for DuelRules {
    fn default() -> Self {
        Self {
            hp_max: 30,
            start_hp: 30,
            start_mana: 10,
            max_mana: 20,
            base_regen: 4,
            bonus_threshold: 6,
            threshold_bonus: 2,
        }
    }
}

impl DuelRules {
    /// Fixes values that would break the hp/mana invariants.
    ///
    /// - `hp_max` is at least 1.
    /// - `start_hp` is capped to `hp_max`.
    /// - `start_mana` is capped to `max_mana`.
    pub fn validated(mut self) -> Self {
        if self.hp_max == 0 {
            warn!("hp_max of 0, raising to 1");
            self.hp_max = 1;
        }
        if self.start_hp > self.hp_max {
            warn!(
                start_hp = self.start_hp,
                hp_max = self.hp_max,
                "start_hp exceeds hp_max, clamping"
            );
            self.start_hp = self.hp_max;
        }
        if self.start_mana > self.max_mana {
            warn!(
                start_mana = self.start_mana,
                max_mana = self.max_mana,
                "start_mana exceeds max_mana, clamping"
            );
            self.start_mana = self.max_mana;
        }
        self
    }

    /// The round-only bonus earned by committing `amount` to one action.
    pub fn bonus_for(&self, amount: u32) -> u32 {
        if amount >= self.bonus_threshold {
            self.threshold_bonus
        } else {
            0
        }
    }
}

/// One regen investment level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenTier {
    /// Mana spent this round.
    pub cost: u32,
    /// Permanent regen bonus gained.
    pub bonus: u32,
}

/// The valid regen investments, cheapest first.
pub const REGEN_TIERS: [RegenTier; 3] = [
    RegenTier { cost: 0, bonus: 0 },
    RegenTier { cost: 7, bonus: 1 },
    RegenTier { cost: 12, bonus: 2 },
];

/// The most expensive tier not above `requested` and not above `budget`.
pub fn regen_tier_for(requested: i64, budget: u32) -> RegenTier {
    let affordable = requested.min(i64::from(budget));
    REGEN_TIERS
        .iter()
        .rev()
        .find(|tier| affordable >= i64::from(tier.cost))
        .copied()
        .unwrap_or(REGEN_TIERS[0])
}

/// Permanent bonus granted by a sanitized regen value.
pub fn regen_bonus_for(regen: u32) -> u32 {
    REGEN_TIERS
        .iter()
        .rev()
        .find(|tier| regen >= tier.cost)
        .map_or(0, |tier| tier.bonus)
}
