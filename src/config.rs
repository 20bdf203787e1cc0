//! Battle configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `DUELIST_`-prefixed environment variables (`__` separates nested keys, e.g.
//! `DUELIST_COMBAT__CRIT__THRESHOLD=19`).

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::character::CharacterClass;
use crate::combat::dice::{parse_dice, DiceRoll};
use crate::error::{BattleError, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DUELIST_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub combat: CombatConfig,
    pub challenge: ChallengeConfig,
    pub classes: ClassConfig,
    pub spells: SpellConfig,
    pub character: CharacterConfig,
    pub progression: ProgressionConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub crit: CritConfig,
    pub turn_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub max_concurrent_per_community: usize,
    pub defend_ac_bonus: i32,
    pub weapon_die: String,
    pub spell_die: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CritConfig {
    pub threshold: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub expire_secs: u64,
    /// How long ended battles stay queryable before the cleanup sweep drops them
    pub ended_retention_secs: u64,
}

/// Base HP per class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    pub warrior: i32,
    pub rogue: i32,
    pub mage: i32,
    pub cleric: i32,
}

impl ClassConfig {
    pub fn base_hp(&self, class: CharacterClass) -> i32 {
        match class {
            CharacterClass::Warrior => self.warrior,
            CharacterClass::Rogue => self.rogue,
            CharacterClass::Mage => self.mage,
            CharacterClass::Cleric => self.cleric,
        }
    }
}

/// Spell slot pools granted to casters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellConfig {
    /// Slots for spell levels 1..=N
    pub slots_by_level: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub point_buy: PointBuyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointBuyConfig {
    pub total_points: i32,
    pub min_score: i32,
    pub max_score: i32,
    /// Cost indexed by `score - min_score`
    pub costs: Vec<i32>,
}

impl PointBuyConfig {
    /// Cost of one score, `None` outside the purchasable range
    pub fn cost(&self, score: i32) -> Option<i32> {
        if score < self.min_score || score > self.max_score {
            return None;
        }
        self.costs.get((score - self.min_score) as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Proficiency bonus for levels 1..=N
    pub proficiency_by_level: Vec<i32>,
    pub elo: EloConfig,
    pub xp: XpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    pub k: i32,
    pub starting: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpConfig {
    pub base: u64,
    pub win_bonus: u64,
    pub draw_bonus: u64,
    /// Total XP needed to reach level `index + 1`
    pub level_curve: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub timeout_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            crit: CritConfig::default(),
            turn_timeout_secs: 45,
            cooldown_secs: 60,
            max_concurrent_per_community: 50,
            defend_ac_bonus: 2,
            weapon_die: "1d6".to_string(),
            spell_die: "1d6".to_string(),
        }
    }
}

impl Default for CritConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            multiplier: 2.0,
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            expire_secs: 120,
            ended_retention_secs: 300,
        }
    }
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            warrior: 12,
            rogue: 8,
            mage: 6,
            cleric: 8,
        }
    }
}

impl Default for SpellConfig {
    fn default() -> Self {
        Self {
            slots_by_level: vec![2],
        }
    }
}

impl Default for PointBuyConfig {
    fn default() -> Self {
        Self {
            total_points: 27,
            min_score: 8,
            max_score: 15,
            costs: vec![0, 1, 2, 3, 4, 5, 7, 9],
        }
    }
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            proficiency_by_level: vec![2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6],
            elo: EloConfig::default(),
            xp: XpConfig::default(),
        }
    }
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 32,
            starting: 1000,
        }
    }
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            base: 50,
            win_bonus: 50,
            draw_bonus: 25,
            level_curve: vec![0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000],
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timeout_interval_secs: 30,
            cleanup_interval_secs: 120,
        }
    }
}

impl BattleConfig {
    /// Defaults layered under an optional TOML file and the environment
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(BattleConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: BattleConfig = figment
            .extract()
            .map_err(|e| BattleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(BattleError::Config(msg));

        let crit = &self.combat.crit;
        if !(1..=20).contains(&crit.threshold) {
            return invalid(format!("crit threshold {} outside 1..=20", crit.threshold));
        }
        if !(crit.multiplier >= 1.0) {
            return invalid(format!("crit multiplier {} below 1.0", crit.multiplier));
        }
        if self.combat.defend_ac_bonus < 0 {
            return invalid("defend AC bonus must not be negative".to_string());
        }
        for (name, notation) in [
            ("weapon_die", &self.combat.weapon_die),
            ("spell_die", &self.combat.spell_die),
        ] {
            if let Err(e) = parse_dice(notation) {
                return invalid(format!("{}: {}", name, e));
            }
        }

        for class in CharacterClass::all() {
            if self.classes.base_hp(*class) < 1 {
                return invalid(format!("base HP for {} must be at least 1", class));
            }
        }

        let point_buy = &self.character.point_buy;
        if point_buy.min_score > point_buy.max_score {
            return invalid("point buy min score exceeds max score".to_string());
        }
        let expected = (point_buy.max_score - point_buy.min_score + 1) as usize;
        if point_buy.costs.len() != expected {
            return invalid(format!(
                "point buy needs {} costs, got {}",
                expected,
                point_buy.costs.len()
            ));
        }

        let progression = &self.progression;
        if progression.proficiency_by_level.is_empty() {
            return invalid("proficiency table is empty".to_string());
        }
        if progression
            .proficiency_by_level
            .windows(2)
            .any(|w| w[1] < w[0])
        {
            return invalid("proficiency table must not decrease".to_string());
        }
        if progression.xp.level_curve.first() != Some(&0) {
            return invalid("level curve must start at 0".to_string());
        }
        if progression.xp.level_curve.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("level curve must be strictly increasing".to_string());
        }
        if progression.elo.k < 0 {
            return invalid("ELO K-factor must not be negative".to_string());
        }

        if self.spells.slots_by_level.len() > u8::MAX as usize {
            return invalid("too many spell slot levels".to_string());
        }

        if self.scheduler.timeout_interval_secs == 0 || self.scheduler.cleanup_interval_secs == 0 {
            return invalid("scheduler intervals must be positive".to_string());
        }

        Ok(())
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.combat.turn_timeout_secs)
    }

    pub fn challenge_expiry(&self) -> Duration {
        Duration::from_secs(self.challenge.expire_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.combat.cooldown_secs)
    }

    pub fn ended_retention(&self) -> Duration {
        Duration::from_secs(self.challenge.ended_retention_secs)
    }

    pub fn weapon_die(&self) -> DiceRoll {
        parse_dice(&self.combat.weapon_die).unwrap_or(DiceRoll::new(1, 6, 0))
    }

    pub fn spell_die(&self) -> DiceRoll {
        parse_dice(&self.combat.spell_die).unwrap_or(DiceRoll::new(1, 6, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = BattleConfig::default();
        assert_eq!(config.combat.crit.threshold, 20);
        assert_eq!(config.combat.crit.multiplier, 2.0);
        assert_eq!(config.combat.turn_timeout_secs, 45);
        assert_eq!(config.challenge.expire_secs, 120);
        assert_eq!(config.combat.cooldown_secs, 60);
        assert_eq!(config.combat.max_concurrent_per_community, 50);
        assert_eq!(config.combat.defend_ac_bonus, 2);
        assert_eq!(config.classes.base_hp(CharacterClass::Warrior), 12);
        assert_eq!(config.classes.base_hp(CharacterClass::Mage), 6);
        assert_eq!(config.progression.elo.k, 32);
        assert_eq!(config.spells.slots_by_level, vec![2]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_point_buy_cost() {
        let point_buy = PointBuyConfig::default();
        assert_eq!(point_buy.cost(8), Some(0));
        assert_eq!(point_buy.cost(15), Some(9));
        assert_eq!(point_buy.cost(16), None);
        assert_eq!(point_buy.cost(7), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BattleConfig::default();
        config.combat.crit.threshold = 21;
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.combat.crit.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.combat.weapon_die = "d".to_string();
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.progression.proficiency_by_level = vec![2, 3, 2];
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.progression.proficiency_by_level.clear();
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.character.point_buy.costs.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layered_loading() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "duelist.toml",
                r#"
                [combat]
                turn_timeout_secs = 30
                weapon_die = "1d8"

                [combat.crit]
                threshold = 19
                "#,
            )?;
            jail.set_env("DUELIST_COMBAT__COOLDOWN_SECS", "5");
            jail.set_env("DUELIST_CLASSES__WARRIOR", "14");
            jail.set_env("DUELIST_SPELLS__SLOTS_BY_LEVEL", "[3, 1]");

            let config = BattleConfig::load(Some(Path::new("duelist.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.combat.turn_timeout_secs, 30);
            assert_eq!(config.combat.crit.threshold, 19);
            assert_eq!(config.combat.crit.multiplier, 2.0);
            assert_eq!(config.combat.cooldown_secs, 5);
            assert_eq!(config.classes.warrior, 14);
            assert_eq!(config.spells.slots_by_level, vec![3, 1]);
            assert_eq!(config.weapon_die(), DiceRoll::new(1, 8, 0));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_value_is_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("duelist.toml", "[combat.crit]\nthreshold = 0\n")?;
            let err = BattleConfig::load(Some(Path::new("duelist.toml"))).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Config);
            Ok(())
        });
    }
}
