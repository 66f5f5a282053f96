//! Dice rolling system
//!
//! Parses and rolls dice notation like "2d6+3", "1d20", "4d6-2", and scales
//! base damage dice with character level.
//!
//! Randomness comes from a [`DieRoller`], so every roll can be driven by a
//! seeded generator or a fixed face sequence in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{GameError, GameResult};

/// Upper bound on dice per roll
pub const MAX_DICE: u32 = 100;

/// Upper bound on faces per die
pub const MAX_SIDES: u32 = 10_000;

/// Upper bound on the flat modifier, either sign
pub const MAX_MODIFIER: i64 = 1_000_000;

static DICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)d(\d+)(?:([+-])(\d+))?$").unwrap());

static SIMPLE_DICE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)d(\d+)$").unwrap());

/// Source of individual die faces
pub trait DieRoller: Send {
    /// Roll one die, returning a face in `1..=sides`
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// Thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRoller;

impl DieRoller for ThreadRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        rand::rng().random_range(1..=sides)
    }
}

/// Reproducible RNG from a fixed seed
#[derive(Debug, Clone)]
pub struct SeededRoller {
    rng: StdRng,
}

impl SeededRoller {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DieRoller for SeededRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.random_range(1..=sides)
    }
}

/// Replays a fixed sequence of faces, cycling when exhausted.
/// Faces are clamped into `1..=sides`.
#[derive(Debug, Clone)]
pub struct FixedDice {
    faces: Vec<u32>,
    next: usize,
}

impl FixedDice {
    pub fn new(faces: impl Into<Vec<u32>>) -> Self {
        let mut faces = faces.into();
        if faces.is_empty() {
            faces.push(1);
        }
        Self { faces, next: 0 }
    }
}

impl DieRoller for FixedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let face = self.faces[self.next % self.faces.len()];
        self.next += 1;
        face.clamp(1, sides.max(1))
    }
}

/// A parsed dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceExpr {
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Modifier to add/subtract
    pub modifier: i64,
}

/// Result of rolling a dice expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollOutcome {
    /// Expression that was rolled, normalized
    pub expression: String,
    /// Individual die faces in roll order
    pub rolls: Vec<u32>,
    /// Sum of faces plus modifier
    pub total: i64,
    /// Every die landed on its highest face
    pub is_max_roll: bool,
    /// Highest total the expression can produce
    pub max_possible: i64,
}

impl DiceExpr {
    /// Create a new dice expression
    pub fn new(count: u32, sides: u32, modifier: i64) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Roll the dice using the given face source
    pub fn roll_with(&self, roller: &mut dyn DieRoller) -> RollOutcome {
        let rolls: Vec<u32> = (0..self.count).map(|_| roller.roll_die(self.sides)).collect();
        let sum: i64 = rolls.iter().map(|&r| r as i64).sum();
        let is_max_roll = rolls.iter().all(|&r| r == self.sides);

        RollOutcome {
            expression: self.to_string(),
            total: sum + self.modifier,
            is_max_roll,
            max_possible: self.max_possible(),
            rolls,
        }
    }

    /// Get the maximum possible result
    pub fn max_possible(&self) -> i64 {
        self.count as i64 * self.sides as i64 + self.modifier
    }
}

impl FromStr for DiceExpr {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dice(s)
    }
}

impl std::fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.count, self.sides, self.modifier)
        } else if self.modifier < 0 {
            write!(f, "{}d{}{}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}", self.count, self.sides)
        }
    }
}

/// Parse a dice notation string like "2d6+3"
pub fn parse_dice(notation: &str) -> GameResult<DiceExpr> {
    let normalized = notation.trim().to_lowercase();
    let invalid = || GameError::InvalidExpression(notation.trim().to_string());

    let caps = DICE_REGEX.captures(&normalized).ok_or_else(invalid)?;

    let count: u32 = caps[1].parse().map_err(|_| invalid())?;
    let sides: u32 = caps[2].parse().map_err(|_| invalid())?;
    if count == 0 || sides == 0 || count > MAX_DICE || sides > MAX_SIDES {
        return Err(invalid());
    }

    let modifier = match (caps.get(3), caps.get(4)) {
        (Some(sign), Some(value)) => {
            let value: i64 = value.as_str().parse().map_err(|_| invalid())?;
            if value > MAX_MODIFIER {
                return Err(invalid());
            }
            if sign.as_str() == "-" {
                -value
            } else {
                value
            }
        }
        _ => 0,
    };

    Ok(DiceExpr {
        count,
        sides,
        modifier,
    })
}

/// Parse and roll an expression in one step
pub fn roll(notation: &str, roller: &mut dyn DieRoller) -> GameResult<RollOutcome> {
    Ok(parse_dice(notation)?.roll_with(roller))
}

/// Scale a base damage expression by level.
///
/// Linear growth: `NdS` becomes `Nd(S + level)`. Expressions carrying a
/// modifier, or that do not parse, pass through unchanged. Negative levels
/// count as zero so the result never shrinks below the base.
pub fn scale_expression(base: &str, level: i64) -> String {
    let lowered = base.trim().to_lowercase();
    let Some(caps) = SIMPLE_DICE_REGEX.captures(&lowered) else {
        return base.to_string();
    };

    let (Ok(count), Ok(sides)) = (caps[1].parse::<u32>(), caps[2].parse::<i64>()) else {
        return base.to_string();
    };

    let scaled = (sides + level.max(0)).min(MAX_SIDES as i64);
    format!("{}d{}", count, scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let roll = parse_dice("2d6").unwrap();
        assert_eq!(roll.count, 2);
        assert_eq!(roll.sides, 6);
        assert_eq!(roll.modifier, 0);
    }

    #[test]
    fn test_parse_with_plus() {
        let roll = parse_dice("1d20+5").unwrap();
        assert_eq!(roll, DiceExpr::new(1, 20, 5));
    }

    #[test]
    fn test_parse_with_minus() {
        let roll = parse_dice("3d8-2").unwrap();
        assert_eq!(roll, DiceExpr::new(3, 8, -2));
    }

    #[test]
    fn test_parse_whitespace_and_case() {
        assert_eq!(parse_dice("  2D10+3  ").unwrap(), DiceExpr::new(2, 10, 3));
    }

    #[test]
    fn test_parse_invalid() {
        for bad in [
            "abc", "2d", "d", "d6", "0d6", "2d0", "2d6+", "2d6*3", "1d4 + 1", "101d6",
            "1d4+9223372036854775807",
            "1d4-9223372036854775808",
            "1d4+1000001",
        ] {
            match parse_dice(bad) {
                Err(GameError::InvalidExpression(_)) => {}
                other => panic!("{:?} should be invalid, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_fixed_sequence_is_deterministic() {
        let first = roll("3d6+2", &mut FixedDice::new([4, 2, 6])).unwrap();
        let second = roll("3d6+2", &mut FixedDice::new([4, 2, 6])).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.rolls, vec![4, 2, 6]);
        assert_eq!(first.total, 14);
        assert!(!first.is_max_roll);
        assert_eq!(first.max_possible, 20);
    }

    #[test]
    fn test_seeded_roller_is_reproducible() {
        let a = roll("4d8", &mut SeededRoller::new(7)).unwrap();
        let b = roll("4d8", &mut SeededRoller::new(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_roll_ignores_modifier() {
        let plus = roll("2d4+3", &mut FixedDice::new([4, 4])).unwrap();
        assert!(plus.is_max_roll);
        assert_eq!(plus.total, 11);

        let minus = roll("2d4-3", &mut FixedDice::new([4, 4])).unwrap();
        assert!(minus.is_max_roll);
        assert_eq!(minus.total, 5);
        assert_eq!(minus.max_possible, 5);

        let partial = roll("2d4+3", &mut FixedDice::new([4, 3])).unwrap();
        assert!(!partial.is_max_roll);
    }

    #[test]
    fn test_single_max_face() {
        let outcome = roll("1d4", &mut FixedDice::new([4])).unwrap();
        assert!(outcome.is_max_roll);
        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.max_possible, 4);
    }

    #[test]
    fn test_thread_roller_bounds() {
        let expr = DiceExpr::new(2, 6, 0);
        let mut roller = ThreadRoller;

        for _ in 0..100 {
            let outcome = expr.roll_with(&mut roller);
            assert!(outcome.total >= 2, "Roll {} below minimum 2", outcome.total);
            assert!(outcome.total <= 12, "Roll {} above maximum 12", outcome.total);
            assert_eq!(outcome.is_max_roll, outcome.rolls.iter().all(|&r| r == 6));
        }
    }

    #[test]
    fn test_modifier_bounds() {
        let top = roll("100d10000+1000000", &mut FixedDice::new([10_000])).unwrap();
        assert_eq!(top.total, 2_000_000);
        assert_eq!(top.max_possible, 2_000_000);

        let bottom = roll("1d4-1000000", &mut FixedDice::new([1])).unwrap();
        assert_eq!(bottom.total, -999_999);
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceExpr::new(2, 6, 0).to_string(), "2d6");
        assert_eq!(DiceExpr::new(1, 20, 5).to_string(), "1d20+5");
        assert_eq!(DiceExpr::new(3, 8, -2).to_string(), "3d8-2");
    }

    #[test]
    fn test_scale_expression() {
        assert_eq!(scale_expression("1d4", 0), "1d4");
        assert_eq!(scale_expression("1d4", 3), "1d7");
        assert_eq!(scale_expression("2d6", 1), "2d7");
        // Modifiers and garbage pass through
        assert_eq!(scale_expression("2d6+3", 5), "2d6+3");
        assert_eq!(scale_expression("fireball", 5), "fireball");
        assert_eq!(scale_expression("1d4", -3), "1d4");
    }

    #[test]
    fn test_scale_expression_monotonic() {
        for base in ["1d4", "2d6", "3d12"] {
            let mut previous = 0;
            for level in 0..50 {
                let sides = parse_dice(&scale_expression(base, level)).unwrap().sides;
                assert!(sides >= previous, "{} shrank at level {}", base, level);
                previous = sides;
            }
        }
    }
}
