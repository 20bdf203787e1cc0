//! Dice rolling system
//!
//! Parses dice notation like "1d6", "2d6+3", "1d20-1" and rolls it against an
//! injectable [`DiceSource`], so resolution code never touches a global RNG.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::LazyLock;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

/// Source of die faces
///
/// `roll(sides)` must return a value in `1..=sides`.
pub trait DiceSource: Send + Sync {
    fn roll(&self, sides: u32) -> u32;

    /// Roll a single d20
    fn d20(&self) -> u32 {
        self.roll(20)
    }
}

/// Production dice backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl DiceSource for ThreadDice {
    fn roll(&self, sides: u32) -> u32 {
        rand::rng().random_range(1..=sides.max(1))
    }
}

/// Reproducible dice from a fixed seed
#[derive(Debug)]
pub struct SeededDice {
    rng: Mutex<StdRng>,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DiceSource for SeededDice {
    fn roll(&self, sides: u32) -> u32 {
        self.rng.lock().random_range(1..=sides.max(1))
    }
}

/// Dice that replay a scripted sequence of faces, cycling when exhausted
///
/// Faces are clamped into `1..=sides` of whatever die is being rolled.
#[derive(Debug)]
pub struct ScriptedDice {
    script: Vec<u32>,
    queue: Mutex<VecDeque<u32>>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        let script: Vec<u32> = faces.into_iter().collect();
        Self {
            queue: Mutex::new(script.iter().copied().collect()),
            script,
        }
    }

    /// Replace the remaining script
    pub fn push(&self, faces: impl IntoIterator<Item = u32>) {
        let mut queue = self.queue.lock();
        queue.clear();
        queue.extend(faces);
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&self, sides: u32) -> u32 {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            queue.extend(self.script.iter().copied());
        }
        queue.pop_front().unwrap_or(1).clamp(1, sides.max(1))
    }
}

/// A parsed dice roll such as `2d6+3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceRoll {
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Modifier to add/subtract
    pub modifier: i32,
}

impl DiceRoll {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self { count, sides, modifier }
    }

    /// Roll the dice and return the total
    pub fn roll(&self, dice: &dyn DiceSource) -> i32 {
        self.roll_detailed(dice).1
    }

    /// Roll and return individual die results plus total
    pub fn roll_detailed(&self, dice: &dyn DiceSource) -> (Vec<u32>, i32) {
        let faces: Vec<u32> = (0..self.count).map(|_| dice.roll(self.sides)).collect();
        let sum: u32 = faces.iter().sum();
        (faces, sum as i32 + self.modifier)
    }
}

impl FromStr for DiceRoll {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dice(s)
    }
}

impl std::fmt::Display for DiceRoll {
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

static NOTATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d*)d(\d+)([+-]\d+)?$").unwrap());

/// Parse a dice notation string like "2d6+3"; a missing count means one die
pub fn parse_dice(notation: &str) -> Result<DiceRoll, String> {
    let notation = notation.trim().to_lowercase();
    let caps = NOTATION_REGEX
        .captures(&notation)
        .ok_or_else(|| format!("Invalid dice notation: {}", notation))?;

    let count = match &caps[1] {
        "" => 1,
        digits => digits
            .parse::<u32>()
            .map_err(|_| format!("Invalid dice count: {}", digits))?,
    };
    let sides: u32 = caps[2]
        .parse()
        .map_err(|_| format!("Invalid die sides: {}", &caps[2]))?;
    let modifier: i32 = match caps.get(3) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| format!("Invalid modifier: {}", m.as_str()))?,
        None => 0,
    };

    if count == 0 {
        return Err("Dice count must be at least 1".to_string());
    }
    if sides == 0 {
        return Err("Die sides must be at least 1".to_string());
    }
    Ok(DiceRoll::new(count, sides, modifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let roll = parse_dice("1d6").unwrap();
        assert_eq!(roll, DiceRoll::new(1, 6, 0));
    }

    #[test]
    fn test_parse_modifiers() {
        assert_eq!(parse_dice("1d20+5").unwrap(), DiceRoll::new(1, 20, 5));
        assert_eq!(parse_dice("3d8-2").unwrap(), DiceRoll::new(3, 8, -2));
        assert_eq!(parse_dice("  D6 ").unwrap(), DiceRoll::new(1, 6, 0));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_dice("abc").is_err());
        assert!(parse_dice("2d").is_err());
        assert!(parse_dice("0d6").is_err());
        assert!(parse_dice("2d0").is_err());
        assert!("d-".parse::<DiceRoll>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceRoll::new(1, 6, 0).to_string(), "1d6");
        assert_eq!(DiceRoll::new(1, 20, 5).to_string(), "1d20+5");
        assert_eq!(DiceRoll::new(3, 8, -2).to_string(), "3d8-2");
    }

    #[test]
    fn test_scripted_dice_cycle_and_clamp() {
        let dice = ScriptedDice::new([20, 3, 9]);
        assert_eq!(dice.d20(), 20);
        assert_eq!(dice.roll(6), 3);
        // 9 does not fit on a d6
        assert_eq!(dice.roll(6), 6);
        // Script restarts
        assert_eq!(dice.d20(), 20);
    }

    #[test]
    fn test_scripted_roll_detailed() {
        let dice = ScriptedDice::new([2, 5]);
        let (faces, total) = DiceRoll::new(2, 6, 1).roll_detailed(&dice);
        assert_eq!(faces, vec![2, 5]);
        assert_eq!(total, 8);
    }

    #[test]
    fn test_thread_dice_bounds() {
        let roll = DiceRoll::new(2, 6, 0);
        for _ in 0..100 {
            let result = roll.roll(&ThreadDice);
            assert!((2..=12).contains(&result));
        }
    }

    #[test]
    fn test_seeded_dice_reproducible() {
        let a = SeededDice::new(7);
        let b = SeededDice::new(7);
        let left: Vec<u32> = (0..20).map(|_| a.d20()).collect();
        let right: Vec<u32> = (0..20).map(|_| b.d20()).collect();
        assert_eq!(left, right);
        assert!(left.iter().all(|r| (1..=20).contains(r)));
    }
}
