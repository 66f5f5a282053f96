//! Status effects system
//!
//! Manages temporary conditions inflicted by affinities:
//! - Damage over time (fire, bleed, poison)
//! - Sanity drain (electrified)
//! - Outgoing damage penalties (slowness, blindness, weakness)
//!
//! Effects are battle-scoped and persisted per participant; durations count
//! the afflicted participant's own turns.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kinds of status effect an affinity can inflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Burning - takes damage each turn
    Fire,
    /// Bleeding - takes damage each turn
    Bleed,
    /// Poisoned - takes damage each turn
    Poison,
    /// Electrified - loses sanity each turn
    Electrified,
    /// Slowed - deals less damage
    Slowness,
    /// Weakened - deals half damage
    Weakness,
    /// Blinded - deals less damage
    Blindness,
}

impl FromStr for StatusKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fire" | "burning" | "burn" => Ok(StatusKind::Fire),
            "bleed" | "bleeding" => Ok(StatusKind::Bleed),
            "poison" | "poisoned" => Ok(StatusKind::Poison),
            "electrified" | "shock" => Ok(StatusKind::Electrified),
            "slowness" | "slow" | "slowed" => Ok(StatusKind::Slowness),
            "weakness" | "weak" | "weakened" => Ok(StatusKind::Weakness),
            "blindness" | "blind" | "blinded" => Ok(StatusKind::Blindness),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusKind::Fire => "Fire",
            StatusKind::Bleed => "Bleed",
            StatusKind::Poison => "Poison",
            StatusKind::Electrified => "Electrified",
            StatusKind::Slowness => "Slowness",
            StatusKind::Weakness => "Weakness",
            StatusKind::Blindness => "Blindness",
        };
        write!(f, "{}", s)
    }
}

impl StatusKind {
    /// Default per-turn magnitude when inflicted by an affinity
    pub fn default_magnitude(&self) -> i64 {
        match self {
            StatusKind::Fire => 3,
            StatusKind::Bleed | StatusKind::Poison => 2,
            StatusKind::Electrified => 3,
            StatusKind::Slowness => 1,
            StatusKind::Blindness => 2,
            StatusKind::Weakness => 0,
        }
    }

    /// Whether the magnitude is health lost at turn start
    pub fn drains_health(&self) -> bool {
        matches!(self, StatusKind::Fire | StatusKind::Bleed | StatusKind::Poison)
    }
}

/// A status effect instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEffect {
    pub kind: StatusKind,
    /// Remaining turns
    pub remaining_turns: i64,
    /// Per-turn damage, drain, or damage penalty
    pub magnitude: i64,
}

impl StatusEffect {
    pub fn new(kind: StatusKind, turns: i64, magnitude: i64) -> Self {
        Self {
            kind,
            remaining_turns: turns,
            magnitude,
        }
    }

    /// Effect with the kind's default magnitude
    pub fn inflicted(kind: StatusKind, turns: i64) -> Self {
        Self::new(kind, turns, kind.default_magnitude())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_turns <= 0
    }
}

/// Losses produced by one turn-start tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub health_loss: i64,
    pub sanity_loss: i64,
    /// Effects that wore off this tick
    pub expired: Vec<StatusKind>,
}

/// Effects on a single participant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantEffects {
    effects: Vec<StatusEffect>,
}

impl ParticipantEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect, refreshing duration and magnitude if already present
    pub fn add(&mut self, effect: StatusEffect) {
        if let Some(existing) = self.effects.iter_mut().find(|e| e.kind == effect.kind) {
            existing.remaining_turns = existing.remaining_turns.max(effect.remaining_turns);
            existing.magnitude = existing.magnitude.max(effect.magnitude);
        } else {
            self.effects.push(effect);
        }
    }

    pub fn has(&self, kind: StatusKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind && !e.is_expired())
    }

    pub fn get(&self, kind: StatusKind) -> Option<&StatusEffect> {
        self.effects.iter().find(|e| e.kind == kind && !e.is_expired())
    }

    /// Tick all effects at the start of the afflicted participant's turn
    pub fn tick_all(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for effect in &mut self.effects {
            if effect.kind.drains_health() {
                outcome.health_loss += effect.magnitude;
            } else if effect.kind == StatusKind::Electrified {
                outcome.sanity_loss += effect.magnitude;
            }
            effect.remaining_turns -= 1;
            if effect.is_expired() {
                outcome.expired.push(effect.kind);
            }
        }

        self.effects.retain(|e| !e.is_expired());
        outcome
    }

    /// Apply outgoing damage penalties to a hit
    pub fn modify_outgoing(&self, damage: i64) -> i64 {
        let mut damage = damage;
        for effect in self.active() {
            damage = match effect.kind {
                StatusKind::Weakness => damage / 2,
                StatusKind::Slowness | StatusKind::Blindness => damage - effect.magnitude,
                _ => damage,
            };
        }
        damage.max(0)
    }

    pub fn active(&self) -> impl Iterator<Item = &StatusEffect> {
        self.effects.iter().filter(|e| !e.is_expired())
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}
