//! Combat system module
//!
//! Implements D&D-style duels with:
//! - Ability effect expressions (e.g., "DAMAGE+2,FIRE")
//! - Derived combat stats from scores, level and effects
//! - Dice rolling over an injectable random source
//! - Attack resolution with to-hit, crits and damage
//! - Status effects (stun, burn, shield, etc.)
//! - The battle state machine

pub mod dice;
pub mod effects;
pub mod parser;
pub mod resolution;
pub mod state;
pub mod stats;

pub use dice::{parse_dice, DiceRoll, DiceSource, ScriptedDice, SeededDice, ThreadDice};
pub use effects::{BattleEffects, EffectCategory, EffectSet, StatusApplication, StatusEffect};
pub use parser::{AbilityEffect, EffectStat};
pub use resolution::{AttackRoll, CritRule, Strike};
pub use state::{Battle, BattleId, BattleStatus, EndReason};
pub use stats::{ability_modifier, proficiency_bonus, CombatStats};
