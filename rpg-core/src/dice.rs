//! Dice rolling primitives.
//!
//! All randomness in the engine flows through a [`DiceRoller`], so tests can
//! script exact die faces while play uses a seeded or entropy-backed RNG.
//! Damage notation follows the usual `XdY+Z` form.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of dice accepted in a single term.
const MAX_DICE_PER_TERM: u32 = 100;

/// Error type for dice notation parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Invalid dice count {count} in {notation}")]
    InvalidDiceCount { count: u32, notation: String },
    #[error("No dice specified")]
    NoDice,
}

/// Source of die faces.
pub trait DiceRoller: Send {
    /// Roll one die with the given number of sides, returning a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// A roller backed by a real random number generator.
pub struct RandomRoller<R = StdRng> {
    rng: R,
}

impl RandomRoller<StdRng> {
    /// A roller seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// A reproducible roller.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomRoller<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl Default for RandomRoller<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl<R: Rng + Send> DiceRoller for RandomRoller<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }
}

/// Standard polyhedral die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// One `NdX` term of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub die_type: DieType,
}

/// A parsed dice expression such as `2d6+3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    pub notation: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                c if c.is_whitespace() => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
        }

        if terms.is_empty() {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            terms,
            modifier,
            notation,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let Some((count_str, sides_str)) = s.split_once('d') else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier = modifier.saturating_add(sign.saturating_mul(value));
            return Ok(());
        };

        // Subtracted dice have no meaning for damage.
        if sign < 0 {
            return Err(DiceError::InvalidNotation(s.to_string()));
        }

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
        };
        if count == 0 || count > MAX_DICE_PER_TERM {
            return Err(DiceError::InvalidDiceCount {
                count,
                notation: s.to_string(),
            });
        }

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
        let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

        terms.push(DiceTerm { count, die_type });
        Ok(())
    }

    /// Roll every die and add the flat modifier.
    pub fn roll_with(&self, roller: &mut dyn DiceRoller) -> RollResult {
        let mut result = self.roll_dice_only(roller);
        result.modifier = self.modifier;
        result.total = result.total.saturating_add(self.modifier);
        result
    }

    /// Roll the dice of the expression without its flat modifier.
    pub fn roll_dice_only(&self, roller: &mut dyn DiceRoller) -> RollResult {
        let rolls: Vec<u32> = self
            .terms
            .iter()
            .flat_map(|term| std::iter::repeat(term.die_type.sides()).take(term.count as usize))
            .map(|sides| roller.roll_die(sides))
            .collect();
        let total = rolls.iter().fold(0i32, |acc, &r| acc.saturating_add(r as i32));

        tracing::debug!(notation = %self.notation, ?rolls, "rolled dice");

        RollResult {
            rolls,
            modifier: 0,
            total,
        }
    }

    /// Largest possible result.
    pub fn max_total(&self) -> i32 {
        let dice: i32 = self
            .terms
            .iter()
            .map(|t| (t.count * t.die_type.sides()) as i32)
            .fold(0, i32::saturating_add);
        dice.saturating_add(self.modifier)
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation)
    }
}

/// Result of rolling an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dice = self
            .rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.modifier {
            0 => write!(f, "[{dice}] = {}", self.total),
            m if m > 0 => write!(f, "[{dice}] + {m} = {}", self.total),
            m => write!(f, "[{dice}] - {} = {}", m.abs(), self.total),
        }
    }
}

/// An attack die roll, possibly made with advantage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    /// Every d20 rolled, in order.
    pub rolls: Vec<u32>,
    /// The face that counts.
    pub natural: u32,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.natural == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.natural == 1
    }
}

/// Roll a d20, or two keeping the higher with advantage.
pub fn roll_d20(roller: &mut dyn DiceRoller, advantage: bool) -> D20Roll {
    let first = roller.roll_die(20);
    if !advantage {
        return D20Roll {
            rolls: vec![first],
            natural: first,
        };
    }

    let second = roller.roll_die(20);
    D20Roll {
        rolls: vec![first, second],
        natural: first.max(second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRoller;

    #[test]
    fn test_with_rng_matches_seeded() {
        let mut a = RandomRoller::with_rng(StdRng::seed_from_u64(7));
        let mut b = RandomRoller::seeded(7);
        for _ in 0..20 {
            let face = a.roll_die(20);
            assert!((1..=20).contains(&face));
            assert_eq!(face, b.roll_die(20));
        }
    }

    #[test]
    fn test_huge_modifiers_saturate() {
        let expr = DiceExpression::parse("1d4+2000000000+2000000000").unwrap();
        assert_eq!(expr.modifier, i32::MAX);
        assert_eq!(expr.max_total(), i32::MAX);
        let mut roller = ScriptedRoller::new([2]);
        assert_eq!(expr.roll_with(&mut roller).total, i32::MAX);
    }

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d6").unwrap();
        assert_eq!(expr.terms.len(), 1);
        assert_eq!(expr.terms[0].count, 1);
        assert_eq!(expr.terms[0].die_type, DieType::D6);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_implicit_count_and_modifier() {
        let expr = DiceExpression::parse("d8 + 2").unwrap();
        assert_eq!(expr.terms[0].count, 1);
        assert_eq!(expr.terms[0].die_type, DieType::D8);
        assert_eq!(expr.modifier, 2);

        let expr = DiceExpression::parse("2d6-1").unwrap();
        assert_eq!(expr.modifier, -1);
    }

    #[test]
    fn test_parse_multiple_terms() {
        let expr = DiceExpression::parse("2d6+1d4+3").unwrap();
        assert_eq!(expr.terms.len(), 2);
        assert_eq!(expr.modifier, 3);
        assert_eq!(expr.max_total(), 19);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(DiceExpression::parse(""), Err(DiceError::NoDice));
        assert_eq!(DiceExpression::parse("5"), Err(DiceError::NoDice));
        assert_eq!(
            DiceExpression::parse("1d7"),
            Err(DiceError::InvalidDieSize(7))
        );
        assert!(matches!(
            DiceExpression::parse("0d6"),
            Err(DiceError::InvalidDiceCount { count: 0, .. })
        ));
        assert!(matches!(
            DiceExpression::parse("club"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert!(DiceExpression::parse("1d6-1d4").is_err());
    }

    #[test]
    fn test_roll_with_scripted_faces() {
        let expr = DiceExpression::parse("2d6+3").unwrap();
        let mut roller = ScriptedRoller::new([4, 5]);
        let result = expr.roll_with(&mut roller);
        assert_eq!(result.rolls, vec![4, 5]);
        assert_eq!(result.total, 12);
        assert_eq!(result.to_string(), "[4, 5] + 3 = 12");
    }

    #[test]
    fn test_roll_dice_only_skips_modifier() {
        let expr = DiceExpression::parse("1d8+2").unwrap();
        let mut roller = ScriptedRoller::new([6]);
        let result = expr.roll_dice_only(&mut roller);
        assert_eq!(result.total, 6);
        assert_eq!(result.modifier, 0);
    }

    #[test]
    fn test_random_roller_range() {
        let mut roller = RandomRoller::seeded(7);
        for _ in 0..200 {
            let face = roller.roll_die(20);
            assert!((1..=20).contains(&face));
        }
    }

    #[test]
    fn test_seeded_rollers_agree() {
        let mut a = RandomRoller::seeded(42);
        let mut b = RandomRoller::seeded(42);
        let xs: Vec<u32> = (0..10).map(|_| a.roll_die(6)).collect();
        let ys: Vec<u32> = (0..10).map(|_| b.roll_die(6)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_advantage_keeps_higher() {
        let mut roller = ScriptedRoller::new([3, 17]);
        let roll = roll_d20(&mut roller, true);
        assert_eq!(roll.rolls, vec![3, 17]);
        assert_eq!(roll.natural, 17);

        let mut roller = ScriptedRoller::new([20]);
        let roll = roll_d20(&mut roller, false);
        assert!(roll.is_natural_20());
        assert!(!roll.is_natural_1());
    }
}
