//! Combat stat calculator
//!
//! Derives the numbers a battle needs from a character's raw ability scores,
//! level and combined ability effect. Everything here is a pure function.

use serde::{Deserialize, Serialize};

use super::parser::{AbilityEffect, EffectStat};
use crate::character::{AbilityScores, CharacterClass};
use crate::config::ClassConfig;

/// Unarmored base armor class
pub const BASE_AC: i32 = 10;

/// Derived combat numbers for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub max_hp: i32,
    pub armor_class: i32,
    pub melee_damage_bonus: i32,
    pub spell_damage_bonus: i32,
    pub healing_bonus: i32,
    /// Extra crit damage, in percent of the crit multiplier
    pub crit_damage_bonus: i32,
    pub proficiency: i32,
}

impl CombatStats {
    /// Bonus used for to-hit and damage by this class
    pub fn attack_bonus(&self, class: CharacterClass) -> i32 {
        if class.is_caster() {
            self.spell_damage_bonus
        } else {
            self.melee_damage_bonus
        }
    }
}

/// `floor((score - 10) / 2)`
pub fn ability_modifier(score: i32) -> i32 {
    score.saturating_sub(10).div_euclid(2)
}

/// Proficiency for a level
///
/// Levels below 1 count as 1. Levels inside the table use the table; past the
/// end, the larger of the last entry and `2 + (level - 1) / 4`, so a table
/// that agrees with the formula stays consistent beyond its end.
pub fn proficiency_bonus(level: u32, table: &[i32]) -> i32 {
    let level = level.max(1);
    let formula = 2 + (level as i32 - 1) / 4;
    match table.get(level as usize - 1) {
        Some(bonus) => *bonus,
        None => table.last().map_or(formula, |last| (*last).max(formula)),
    }
}

/// Apply the STR..CHA modifiers of an effect to raw scores
pub fn adjusted_scores(scores: &AbilityScores, effect: &AbilityEffect) -> AbilityScores {
    AbilityScores {
        strength: scores.strength.saturating_add(effect.total(EffectStat::Str)),
        dexterity: scores.dexterity.saturating_add(effect.total(EffectStat::Dex)),
        constitution: scores.constitution.saturating_add(effect.total(EffectStat::Con)),
        intelligence: scores.intelligence.saturating_add(effect.total(EffectStat::Int)),
        wisdom: scores.wisdom.saturating_add(effect.total(EffectStat::Wis)),
        charisma: scores.charisma.saturating_add(effect.total(EffectStat::Cha)),
    }
}

/// Derive combat stats
pub fn calculate(
    scores: &AbilityScores,
    level: u32,
    class: CharacterClass,
    base_hp: &ClassConfig,
    proficiency_table: &[i32],
    effect: &AbilityEffect,
) -> CombatStats {
    let adjusted = adjusted_scores(scores, effect);

    let str_mod = ability_modifier(adjusted.strength);
    let dex_mod = ability_modifier(adjusted.dexterity);
    let con_mod = ability_modifier(adjusted.constitution);
    let int_mod = ability_modifier(adjusted.intelligence);
    let wis_mod = ability_modifier(adjusted.wisdom);

    let max_hp = base_hp
        .base_hp(class)
        .saturating_add(con_mod)
        .saturating_add(effect.total(EffectStat::MaxHp))
        .max(1);

    let armor_class = BASE_AC
        .saturating_add(dex_mod)
        .saturating_add(effect.total(EffectStat::Ac));

    let melee_damage_bonus = str_mod.saturating_add(effect.total(EffectStat::Damage));

    let casting_mod = match class {
        CharacterClass::Mage => int_mod,
        CharacterClass::Cleric => wis_mod,
        _ => int_mod.max(wis_mod),
    };
    let spell_damage_bonus = casting_mod.saturating_add(effect.total(EffectStat::SpellDamage));

    let healing_bonus = wis_mod.saturating_add(effect.total(EffectStat::HealBonus));

    CombatStats {
        max_hp,
        armor_class,
        melee_damage_bonus,
        spell_damage_bonus,
        healing_bonus,
        crit_damage_bonus: effect.total(EffectStat::CritDamage),
        proficiency: proficiency_bonus(level, proficiency_table),
    }
}
