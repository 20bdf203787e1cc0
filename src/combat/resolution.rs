//! Attack resolution math
//!
//! Handles one strike with:
//! - A d20 to-hit roll against armor class
//! - Critical hits (natural roll at or above the threshold always hits)
//! - Weapon or spell damage plus bonus, crit multiplier and crit bonus
//! - Outgoing and incoming damage percentages from status effects
//!
//! Shields and HP are applied by the caller; this module only does arithmetic
//! over an injected [`DiceSource`].

use serde::{Deserialize, Serialize};

use super::dice::{DiceRoll, DiceSource};
use super::effects::scale_percent;
use crate::config::CritConfig;

/// Critical-hit rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CritRule {
    pub threshold: u32,
    pub multiplier: f64,
}

impl From<&CritConfig> for CritRule {
    fn from(config: &CritConfig) -> Self {
        Self {
            threshold: config.threshold,
            multiplier: config.multiplier,
        }
    }
}

impl Default for CritRule {
    fn default() -> Self {
        Self::from(&CritConfig::default())
    }
}

/// Everything the attacker contributes to a strike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offense {
    /// Relevant bonus + proficiency + status roll modifier
    pub to_hit: i32,
    pub damage_bonus: i32,
    /// Percent added to the crit multiplier
    pub crit_damage_bonus: i32,
    pub outgoing_percent: u32,
}

/// Everything the defender contributes to a strike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defense {
    /// Base AC + temporary bonus + status AC modifier
    pub armor_class: i32,
    pub incoming_percent: u32,
}

/// Result of an attack roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRoll {
    /// The natural d20
    pub raw: u32,
    /// Roll plus bonuses
    pub total: i32,
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
}

impl AttackRoll {
    pub fn new(raw: u32, bonus: i32, target_ac: i32, crit_threshold: u32) -> Self {
        let critical = raw >= crit_threshold;
        let total = (raw as i32).saturating_add(bonus);

        // Critical always hits
        let hit = critical || total >= target_ac;

        Self {
            raw,
            total,
            target_ac,
            hit,
            critical,
        }
    }
}

/// Fully resolved strike, before shields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strike {
    pub roll: AttackRoll,
    /// Sum of the damage dice, 0 on a miss
    pub damage_roll: i32,
    /// Damage after crit and percentages
    pub damage: u32,
}

/// Damage before status percentages: `max(0, round((rolled + bonus) * multiplier))`
pub fn base_damage(
    rolled: i32,
    bonus: i32,
    critical: bool,
    rule: &CritRule,
    crit_bonus: i32,
) -> u32 {
    let mut damage = rolled.saturating_add(bonus) as f64;
    if critical {
        let mut multiplier = rule.multiplier;
        if crit_bonus > 0 {
            multiplier += crit_bonus as f64 / 100.0;
        }
        damage = (damage * multiplier).round();
    }
    damage.max(0.0) as u32
}

/// Apply outgoing then incoming percentages, rounding at each step
pub fn apply_percentages(damage: u32, outgoing: u32, incoming: u32) -> u32 {
    scale_percent(scale_percent(damage, outgoing), incoming)
}

/// Roll to hit and, on a hit, roll damage
pub fn resolve_strike(
    dice: &dyn DiceSource,
    damage_die: &DiceRoll,
    offense: &Offense,
    defense: &Defense,
    rule: &CritRule,
) -> Strike {
    let roll = AttackRoll::new(dice.d20(), offense.to_hit, defense.armor_class, rule.threshold);
    if !roll.hit {
        return Strike {
            roll,
            damage_roll: 0,
            damage: 0,
        };
    }

    let damage_roll = damage_die.roll(dice);
    let damage = base_damage(
        damage_roll,
        offense.damage_bonus,
        roll.critical,
        rule,
        offense.crit_damage_bonus,
    );
    let damage = apply_percentages(damage, offense.outgoing_percent, defense.incoming_percent);

    Strike {
        roll,
        damage_roll,
        damage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::dice::ScriptedDice;

    fn offense(to_hit: i32, damage_bonus: i32) -> Offense {
        Offense {
            to_hit,
            damage_bonus,
            crit_damage_bonus: 0,
            outgoing_percent: 100,
        }
    }

    fn defense(armor_class: i32) -> Defense {
        Defense {
            armor_class,
            incoming_percent: 100,
        }
    }

    #[test]
    fn test_attack_roll() {
        // Critical hit
        let roll = AttackRoll::new(20, -10, 30, 20);
        assert!(roll.hit);
        assert!(roll.critical);

        // Normal hit: 15 + 5 = 20 >= 18
        let roll = AttackRoll::new(15, 5, 18, 20);
        assert!(roll.hit);
        assert!(!roll.critical);

        // Normal miss: 10 + 3 = 13 < 18
        let roll = AttackRoll::new(10, 3, 18, 20);
        assert!(!roll.hit);

        // Lowered threshold
        let roll = AttackRoll::new(19, 0, 25, 19);
        assert!(roll.critical && roll.hit);

        let roll = AttackRoll::new(10, i32::MAX, i32::MAX, 20);
        assert_eq!(roll.total, i32::MAX);
        assert!(roll.hit);
    }

    #[test]
    fn test_base_damage() {
        let rule = CritRule::default();
        assert_eq!(base_damage(4, 2, false, &rule, 0), 6);
        assert_eq!(base_damage(4, 2, true, &rule, 0), 12);
        // 6 * 2.5 = 15
        assert_eq!(base_damage(4, 2, true, &rule, 50), 15);
        // Negative bonus floors at zero
        assert_eq!(base_damage(1, -3, false, &rule, 0), 0);
        assert_eq!(base_damage(1, -3, true, &rule, 0), 0);
    }

    #[test]
    fn test_percentages() {
        assert_eq!(apply_percentages(10, 100, 100), 10);
        assert_eq!(apply_percentages(10, 130, 50), 7);
        assert_eq!(apply_percentages(10, 0, 200), 0);
    }

    #[test]
    fn test_resolve_hit() {
        let dice = ScriptedDice::new([12, 4]);
        let strike = resolve_strike(
            &dice,
            &DiceRoll::new(1, 6, 0),
            &offense(4, 2),
            &defense(14),
            &CritRule::default(),
        );
        assert!(strike.roll.hit);
        assert_eq!(strike.roll.total, 16);
        assert_eq!(strike.damage_roll, 4);
        assert_eq!(strike.damage, 6);
    }

    #[test]
    fn test_resolve_miss_skips_damage_roll() {
        let dice = ScriptedDice::new([2, 6]);
        let strike = resolve_strike(
            &dice,
            &DiceRoll::new(1, 6, 0),
            &offense(1, 2),
            &defense(14),
            &CritRule::default(),
        );
        assert!(!strike.roll.hit);
        assert_eq!(strike.damage, 0);
        // The damage die was never consumed
        assert_eq!(dice.roll(6), 6);
    }

    #[test]
    fn test_crit_always_hits_and_multiplies() {
        for ac in [5, 20, 40] {
            let dice = ScriptedDice::new([20, 3]);
            let strike = resolve_strike(
                &dice,
                &DiceRoll::new(1, 6, 0),
                &offense(0, 1),
                &defense(ac),
                &CritRule::default(),
            );
            assert!(strike.roll.critical);
            assert!(strike.roll.hit);
            assert_eq!(strike.damage, 8);
        }
    }
}
