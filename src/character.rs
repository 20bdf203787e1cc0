//! Characters
//!
//! A character is the read-only combat profile a participant brings into a
//! battle: class, race, six ability scores, learned abilities and a
//! progression record. Battles never mutate it; only the progression worker
//! settles XP and ELO after a battle completes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::combat::parser::{parse_and_combine, AbilityEffect};
use crate::config::PointBuyConfig;
use crate::error::{BattleError, Result};

/// Character class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterClass {
    Warrior,
    Rogue,
    Mage,
    Cleric,
}

impl CharacterClass {
    pub fn all() -> &'static [CharacterClass] {
        &[
            CharacterClass::Warrior,
            CharacterClass::Rogue,
            CharacterClass::Mage,
            CharacterClass::Cleric,
        ]
    }

    /// Casters resolve attacks with their spell bonus
    pub fn is_caster(&self) -> bool {
        matches!(self, CharacterClass::Mage | CharacterClass::Cleric)
    }
}

impl FromStr for CharacterClass {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "warrior" => Ok(CharacterClass::Warrior),
            "rogue" => Ok(CharacterClass::Rogue),
            "mage" => Ok(CharacterClass::Mage),
            "cleric" => Ok(CharacterClass::Cleric),
            other => Err(BattleError::validation(format!("invalid class: {}", other))),
        }
    }
}

impl std::fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CharacterClass::Warrior => "warrior",
            CharacterClass::Rogue => "rogue",
            CharacterClass::Mage => "mage",
            CharacterClass::Cleric => "cleric",
        };
        write!(f, "{}", s)
    }
}

/// Character race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Halfling,
}

impl FromStr for Race {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(Race::Human),
            "elf" => Ok(Race::Elf),
            "dwarf" => Ok(Race::Dwarf),
            "halfling" => Ok(Race::Halfling),
            other => Err(BattleError::validation(format!("invalid race: {}", other))),
        }
    }
}

impl std::fmt::Display for Race {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Race::Human => "human",
            Race::Elf => "elf",
            Race::Dwarf => "dwarf",
            Race::Halfling => "halfling",
        };
        write!(f, "{}", s)
    }
}

/// The six ability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn as_array(&self) -> [i32; 6] {
        [
            self.strength,
            self.dexterity,
            self.constitution,
            self.intelligence,
            self.wisdom,
            self.charisma,
        ]
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// How an ability is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    /// Always-on passive bonus
    Talent,
    /// Always-on trained bonus
    Skill,
    /// Cast in battle with `perform_spell`
    Spell,
}

impl FromStr for AbilityKind {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "talent" => Ok(AbilityKind::Talent),
            "skill" => Ok(AbilityKind::Skill),
            "spell" => Ok(AbilityKind::Spell),
            other => Err(BattleError::validation(format!("invalid ability kind: {}", other))),
        }
    }
}

impl std::fmt::Display for AbilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbilityKind::Talent => "talent",
            AbilityKind::Skill => "skill",
            AbilityKind::Spell => "spell",
        };
        write!(f, "{}", s)
    }
}

/// An ability the character has learned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedAbility {
    pub key: String,
    pub kind: AbilityKind,
    /// Effect expression, e.g. `"DAMAGE+2,FIRE"`
    #[serde(default)]
    pub effect: Option<String>,
    /// Spell slot level spent per cast; `None` or 0 casts for free
    #[serde(default)]
    pub spell_slot_level: Option<u8>,
    /// Seconds before the ability can be used again
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

impl LearnedAbility {
    pub fn new(key: &str, kind: AbilityKind, effect: &str) -> Self {
        Self {
            key: key.to_string(),
            kind,
            effect: Some(effect.to_string()),
            spell_slot_level: None,
            cooldown_secs: None,
        }
    }

    pub fn with_slot_level(mut self, level: u8) -> Self {
        self.spell_slot_level = Some(level);
        self
    }

    pub fn with_cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    /// Slot level this ability spends, if any
    pub fn slot_level(&self) -> Option<u8> {
        self.spell_slot_level.filter(|level| *level > 0)
    }

    pub fn parsed_effect(&self) -> AbilityEffect {
        crate::combat::parser::parse(self.effect.as_deref())
    }
}

/// Long-lived battle record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    pub xp: u64,
    pub level: u32,
    pub elo: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            elo: 1000,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }
}

/// A participant's character within one community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub community_id: String,
    pub user_id: String,
    pub class: CharacterClass,
    pub race: Race,
    pub scores: AbilityScores,
    #[serde(default)]
    pub abilities: Vec<LearnedAbility>,
    #[serde(default)]
    pub progression: Progression,
}

impl Character {
    pub fn new(
        community_id: &str,
        user_id: &str,
        class: CharacterClass,
        race: Race,
        scores: AbilityScores,
    ) -> Self {
        Self {
            community_id: community_id.to_string(),
            user_id: user_id.to_string(),
            class,
            race,
            scores,
            abilities: Vec::new(),
            progression: Progression::default(),
        }
    }

    pub fn with_ability(mut self, ability: LearnedAbility) -> Self {
        self.abilities.push(ability);
        self
    }

    pub fn level(&self) -> u32 {
        self.progression.level
    }

    /// Combined effect of every passive (talent and skill) ability
    ///
    /// Spells contribute only when cast.
    pub fn passive_effect(&self) -> AbilityEffect {
        parse_and_combine(
            self.abilities
                .iter()
                .filter(|a| a.kind != AbilityKind::Spell)
                .filter_map(|a| a.effect.as_deref()),
        )
    }

    /// Look up a learned spell by key (case-insensitive)
    pub fn spell(&self, key: &str) -> Option<&LearnedAbility> {
        self.abilities
            .iter()
            .find(|a| a.kind == AbilityKind::Spell && a.key.eq_ignore_ascii_case(key))
    }
}

/// Total point-buy cost of a score set, `None` if any score is out of range
pub fn point_buy_total(scores: &AbilityScores, point_buy: &PointBuyConfig) -> Option<i32> {
    scores
        .as_array()
        .iter()
        .map(|score| point_buy.cost(*score))
        .sum()
}

/// Check that a character may enter a battle
pub fn validate(character: &Character, point_buy: &PointBuyConfig) -> Result<()> {
    for score in character.scores.as_array() {
        if score < point_buy.min_score || score > point_buy.max_score {
            return Err(BattleError::validation(format!(
                "ability score {} outside {}..={}",
                score, point_buy.min_score, point_buy.max_score
            )));
        }
    }

    match point_buy_total(&character.scores, point_buy) {
        Some(total) if total == point_buy.total_points => Ok(()),
        Some(total) => Err(BattleError::validation(format!(
            "point buy total {} does not match budget {}",
            total, point_buy.total_points
        ))),
        None => Err(BattleError::validation("ability score has no point cost")),
    }
}
