//! Combat system module
//!
//! Turn-based battles between player characters and NPCs:
//! - Dice rolling and level scaling (e.g., "2d6+3", "1d4" -> "1d7")
//! - Damage resolution with affinities, focus and defend
//! - Status effects (fire, bleed, electrified, etc.)
//! - Persisted battle state with one active battle per scope
//! - The engine tying it together

pub mod damage;
pub mod dice;
pub mod effects;
mod engine;
mod report;
mod state;
mod store;

pub use dice::{parse_dice, roll, scale_expression, DiceExpr, DieRoller, FixedDice, RollOutcome};
pub use effects::{StatusEffect, StatusKind};
pub use engine::{CombatEngine, EXPERIENCE_PER_NPC_LEVEL};
pub use report::{
    ActionReport, AttackReport, BattleOption, BattleOutcome, BattleSummary, HitReport, SideLine,
    TurnEvent,
};
pub use state::{BattleStatus, EndReason, ScopeKey};
pub use store::BattleStore;
