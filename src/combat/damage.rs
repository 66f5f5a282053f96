//! Damage resolution
//!
//! Turns a raw dice total into the damage a target actually takes:
//! - Focus bonus from a perfect focus
//! - Outgoing penalties from the attacker's status effects
//! - Affinity modifiers (multiplier, battle scaling)
//! - Defend reduction on the target (20%, one attack)

use crate::catalog::AffinityEffect;

use super::effects::ParticipantEffects;

/// Damage reduction granted by defending, in percent
pub const DEFEND_REDUCTION_PERCENT: i64 = 20;

/// Bonus granted by a perfect focus for the next attack
pub const FOCUS_BONUS: i64 = 2;

/// A single adjustment applied while resolving a hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageModifier {
    /// Focus bonus added
    Focus(i64),
    /// Damage lost to status effects
    StatusPenalty(i64),
    /// Affinity multiplier applied
    Multiplier(f64),
    /// Bonus from a long battle
    BattleScaling(i64),
    /// Damage absorbed by defending
    Defended(i64),
}

impl std::fmt::Display for DamageModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DamageModifier::Focus(n) => write!(f, "+{} focus", n),
            DamageModifier::StatusPenalty(n) => write!(f, "-{} from status effects", n),
            DamageModifier::Multiplier(m) => write!(f, "x{} affinity", m),
            DamageModifier::BattleScaling(n) => write!(f, "+{} battle scaling", n),
            DamageModifier::Defended(n) => write!(f, "-{} blocked", n),
        }
    }
}

/// Everything needed to resolve one hit
#[derive(Debug, Clone, Copy)]
pub struct HitContext<'a> {
    /// Dice total
    pub rolled: i64,
    /// Pending focus bonus on the attacker
    pub focus_bonus: i64,
    pub attacker_effects: &'a ParticipantEffects,
    /// Attacker is below max health
    pub attacker_wounded: bool,
    pub affinity: Option<&'a AffinityEffect>,
    pub round: i64,
    pub target_defending: bool,
}

/// Result of a damage calculation
#[derive(Debug, Clone, PartialEq)]
pub struct DamageResult {
    /// Dice total before modifiers
    pub rolled: i64,
    /// Damage dealt after modifiers, never negative
    pub final_damage: i64,
    pub modifiers: Vec<DamageModifier>,
}

/// Resolve the damage of one hit
pub fn resolve_hit(ctx: &HitContext<'_>) -> DamageResult {
    let mut modifiers = Vec::new();
    let mut damage = ctx.rolled.max(0);

    if ctx.focus_bonus > 0 {
        damage += ctx.focus_bonus;
        modifiers.push(DamageModifier::Focus(ctx.focus_bonus));
    }

    let penalized = ctx.attacker_effects.modify_outgoing(damage);
    if penalized < damage {
        modifiers.push(DamageModifier::StatusPenalty(damage - penalized));
        damage = penalized;
    }

    match ctx.affinity {
        Some(AffinityEffect::DamageMultiplier { multiplier }) if ctx.attacker_wounded => {
            damage = (damage as f64 * multiplier).floor() as i64;
            modifiers.push(DamageModifier::Multiplier(*multiplier));
        }
        Some(AffinityEffect::BattleScaling) if ctx.round > 1 => {
            let bonus = ctx.round - 1;
            damage += bonus;
            modifiers.push(DamageModifier::BattleScaling(bonus));
        }
        _ => {}
    }

    if ctx.target_defending {
        let blocked = damage * DEFEND_REDUCTION_PERCENT / 100;
        damage -= blocked;
        modifiers.push(DamageModifier::Defended(blocked));
    }

    DamageResult {
        rolled: ctx.rolled,
        final_damage: damage.max(0),
        modifiers,
    }
}

/// Sanity moved by an affinity after a hit lands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanityTransfer {
    pub target_loss: i64,
    pub attacker_gain: i64,
}

/// Sanity side effects of an affinity for a hit of `damage`
pub fn sanity_transfer(affinity: Option<&AffinityEffect>, damage: i64) -> SanityTransfer {
    match affinity {
        Some(AffinityEffect::SanityReductionPerDamage) => SanityTransfer {
            target_loss: damage.max(0),
            attacker_gain: 0,
        },
        Some(AffinityEffect::SanitySteal { amount }) if damage > 0 => SanityTransfer {
            target_loss: *amount,
            attacker_gain: *amount,
        },
        _ => SanityTransfer::default(),
    }
}
