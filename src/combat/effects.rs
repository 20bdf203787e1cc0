//! Status effects system
//!
//! Timed buffs and debuffs attached to one participant of one battle:
//! - Damage and healing over time (burn, poison, bleed, regeneration)
//! - Turn skipping (stun)
//! - Shields that soak damage before HP
//! - Roll, AC and damage-percent modifiers
//!
//! Behaviour lives in a single table, [`EffectCategory::behavior`], rather than
//! in per-category branches spread across the resolution code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

use super::parser::AbilityEffect;

/// Prefix of ability tags that apply a status effect
pub const APPLY_STATUS_PREFIX: &str = "APPLY_STATUS:";

/// Types of status effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectCategory {
    Stun,
    Burn,
    Poison,
    Regeneration,
    Shield,
    Haste,
    Slow,
    Bleed,
    Weakness,
    Strength,
    Protection,
    Vulnerability,
}

/// When an effect does its per-turn work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// At the start of the affected participant's turn
    TurnStart,
    /// Only consulted during resolution
    Passive,
}

/// What the magnitude of an effect means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnitudeKind {
    DamagePerTurn,
    HealPerTurn,
    SkipTurn,
    Absorb,
    /// Added to attack rolls and AC with the given sign
    RollModifier(i32),
    /// Percentage points added to outgoing damage with the given sign
    OutgoingPercent(i32),
    /// Percentage points added to incoming damage with the given sign
    IncomingPercent(i32),
}

/// Row of the behaviour table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectBehavior {
    pub stackable: bool,
    pub phase: TickPhase,
    pub magnitude: MagnitudeKind,
    /// Beneficial effects from a spell land on the caster
    pub beneficial: bool,
}

impl EffectCategory {
    pub fn all() -> &'static [EffectCategory] {
        &[
            EffectCategory::Stun,
            EffectCategory::Burn,
            EffectCategory::Poison,
            EffectCategory::Regeneration,
            EffectCategory::Shield,
            EffectCategory::Haste,
            EffectCategory::Slow,
            EffectCategory::Bleed,
            EffectCategory::Weakness,
            EffectCategory::Strength,
            EffectCategory::Protection,
            EffectCategory::Vulnerability,
        ]
    }

    pub fn behavior(&self) -> EffectBehavior {
        use MagnitudeKind::*;
        use TickPhase::*;

        let (stackable, phase, magnitude, beneficial) = match self {
            EffectCategory::Stun => (false, TurnStart, SkipTurn, false),
            EffectCategory::Burn => (true, TurnStart, DamagePerTurn, false),
            EffectCategory::Poison => (true, TurnStart, DamagePerTurn, false),
            EffectCategory::Regeneration => (true, TurnStart, HealPerTurn, true),
            EffectCategory::Shield => (true, Passive, Absorb, true),
            EffectCategory::Haste => (false, Passive, RollModifier(1), true),
            EffectCategory::Slow => (false, Passive, RollModifier(-1), false),
            EffectCategory::Bleed => (true, TurnStart, DamagePerTurn, false),
            EffectCategory::Weakness => (false, Passive, OutgoingPercent(-1), false),
            EffectCategory::Strength => (false, Passive, OutgoingPercent(1), true),
            EffectCategory::Protection => (false, Passive, IncomingPercent(-1), true),
            EffectCategory::Vulnerability => (false, Passive, IncomingPercent(1), false),
        };

        EffectBehavior {
            stackable,
            phase,
            magnitude,
            beneficial,
        }
    }

    pub fn is_stackable(&self) -> bool {
        self.behavior().stackable
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectCategory::Stun => "Stun",
            EffectCategory::Burn => "Burn",
            EffectCategory::Poison => "Poison",
            EffectCategory::Regeneration => "Regeneration",
            EffectCategory::Shield => "Shield",
            EffectCategory::Haste => "Haste",
            EffectCategory::Slow => "Slow",
            EffectCategory::Bleed => "Bleed",
            EffectCategory::Weakness => "Weakness",
            EffectCategory::Strength => "Strength",
            EffectCategory::Protection => "Protection",
            EffectCategory::Vulnerability => "Vulnerability",
        }
    }
}

impl FromStr for EffectCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stun" | "stunned" => Ok(EffectCategory::Stun),
            "burn" | "burning" => Ok(EffectCategory::Burn),
            "poison" | "poisoned" => Ok(EffectCategory::Poison),
            "regen" | "regeneration" => Ok(EffectCategory::Regeneration),
            "shield" => Ok(EffectCategory::Shield),
            "haste" | "hasted" => Ok(EffectCategory::Haste),
            "slow" | "slowed" => Ok(EffectCategory::Slow),
            "bleed" | "bleeding" => Ok(EffectCategory::Bleed),
            "weakness" | "weakened" => Ok(EffectCategory::Weakness),
            "strength" | "strengthened" => Ok(EffectCategory::Strength),
            "protection" | "protected" => Ok(EffectCategory::Protection),
            "vulnerability" | "vulnerable" => Ok(EffectCategory::Vulnerability),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A request to apply a status effect, usually decoded from an ability tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusApplication {
    pub category: EffectCategory,
    pub duration: i32,
    pub stacks: u32,
    pub magnitude: i32,
}

impl StatusApplication {
    /// Decode `APPLY_STATUS:TYPE:DURATION:STACKS:MAGNITUDE`
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        let body = tag
            .get(..APPLY_STATUS_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(APPLY_STATUS_PREFIX))
            .map(|_| &tag[APPLY_STATUS_PREFIX.len()..])
            .ok_or_else(|| format!("not a status tag: {}", tag))?;

        let parts: Vec<&str> = body.split(':').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected TYPE:DURATION:STACKS:MAGNITUDE, got {}", body));
        }

        let category: EffectCategory = parts[0]
            .parse()
            .map_err(|_| format!("unknown status effect: {}", parts[0]))?;
        let duration: i32 = parts[1]
            .parse()
            .map_err(|_| format!("invalid duration: {}", parts[1]))?;
        let stacks: u32 = parts[2]
            .parse()
            .map_err(|_| format!("invalid stacks: {}", parts[2]))?;
        let magnitude: i32 = parts[3]
            .parse()
            .map_err(|_| format!("invalid magnitude: {}", parts[3]))?;

        if duration <= 0 {
            return Err(format!("duration must be positive: {}", duration));
        }
        if stacks == 0 {
            return Err("stacks must be at least 1".to_string());
        }

        Ok(Self {
            category,
            duration,
            stacks,
            magnitude: magnitude.max(0),
        })
    }

    /// Every well-formed status tag carried by an effect; malformed ones are skipped
    pub fn from_effect(effect: &AbilityEffect) -> Vec<Self> {
        effect
            .tags()
            .filter(|tag| {
                tag.get(..APPLY_STATUS_PREFIX.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(APPLY_STATUS_PREFIX))
            })
            .filter_map(|tag| match Self::from_tag(tag) {
                Ok(application) => Some(application),
                Err(e) => {
                    warn!("Skipping malformed status tag {}: {}", tag, e);
                    None
                }
            })
            .collect()
    }
}

/// A status effect instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub category: EffectCategory,
    /// Remaining duration in turns; `<= 0` is expired
    pub remaining_turns: i32,
    /// Always 1 for non-stackable categories
    pub stacks: u32,
    /// Per-stack magnitude
    pub magnitude: i32,
    /// Participant who applied the effect
    pub source: Option<String>,
    /// Ability that applied the effect
    pub source_ability: Option<String>,
    /// Battle turn number when first applied
    pub applied_turn: u32,
}

impl StatusEffect {
    /// Create a new single-stack status effect
    pub fn new(category: EffectCategory, duration: i32, magnitude: i32) -> Self {
        Self {
            category,
            remaining_turns: duration,
            stacks: 1,
            magnitude: magnitude.max(0),
            source: None,
            source_ability: None,
            applied_turn: 0,
        }
    }

    pub fn from_application(application: &StatusApplication) -> Self {
        Self::new(application.category, application.duration, application.magnitude)
            .with_stacks(application.stacks)
    }

    /// Set the stack count; ignored for non-stackable categories
    pub fn with_stacks(mut self, stacks: u32) -> Self {
        if self.category.is_stackable() {
            self.stacks = stacks.max(1);
        }
        self
    }

    /// Set the source of this effect
    pub fn with_source(mut self, source: &str, ability: Option<&str>) -> Self {
        self.source = Some(source.to_string());
        self.source_ability = ability.map(str::to_string);
        self
    }

    pub fn applied_on(mut self, turn: u32) -> Self {
        self.applied_turn = turn;
        self
    }

    /// Magnitude times stacks
    pub fn total_magnitude(&self) -> i32 {
        self.magnitude.saturating_mul(self.stacks as i32)
    }

    /// Decrement duration, returning true once expired
    pub fn tick(&mut self) -> bool {
        self.remaining_turns -= 1;
        self.is_expired()
    }

    /// Check if effect has expired
    pub fn is_expired(&self) -> bool {
        self.remaining_turns <= 0
    }

    /// e.g. "Burn (2 turns, 3 stacks)"
    pub fn display(&self) -> String {
        if self.stacks > 1 {
            format!(
                "{} ({} turns, {} stacks)",
                self.category, self.remaining_turns, self.stacks
            )
        } else {
            format!("{} ({} turns)", self.category, self.remaining_turns)
        }
    }
}

/// What happened when a participant's turn began
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnStartReport {
    pub damage: u32,
    pub healing: u32,
    pub stunned: bool,
    pub messages: Vec<String>,
}

/// What happened when a participant's turn ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnEndReport {
    pub expired: Vec<EffectCategory>,
    pub messages: Vec<String>,
}

/// Effects on a single participant
#[derive(Debug, Clone, Default)]
pub struct EffectSet {
    effects: Vec<StatusEffect>,
}

impl EffectSet {
    /// Create new empty effects
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect: stackable categories gain stacks, others refresh duration
    ///
    /// Returns the effect as it stands after the application.
    pub fn apply(&mut self, effect: StatusEffect) -> StatusEffect {
        if effect.is_expired() {
            return effect;
        }

        self.effects.retain(|e| !e.is_expired());

        if let Some(existing) = self
            .effects
            .iter_mut()
            .find(|e| e.category == effect.category)
        {
            if existing.category.is_stackable() {
                existing.stacks = existing.stacks.saturating_add(effect.stacks);
            }
            existing.remaining_turns = effect.remaining_turns;
            existing.clone()
        } else {
            self.effects.push(effect.clone());
            effect
        }
    }

    /// Remove an effect by category
    pub fn remove(&mut self, category: EffectCategory) -> bool {
        let before = self.effects.len();
        self.effects.retain(|e| e.category != category);
        before != self.effects.len()
    }

    /// Check if participant has a specific live effect
    pub fn has(&self, category: EffectCategory) -> bool {
        self.get(category).is_some()
    }

    /// Get an effect if present
    pub fn get(&self, category: EffectCategory) -> Option<&StatusEffect> {
        self.effects
            .iter()
            .find(|e| e.category == category && !e.is_expired())
    }

    /// Check if participant can act (not stunned)
    pub fn can_act(&self) -> bool {
        !self
            .live()
            .any(|e| e.category.behavior().magnitude == MagnitudeKind::SkipTurn)
    }

    fn live(&self) -> impl Iterator<Item = &StatusEffect> {
        self.effects.iter().filter(|e| !e.is_expired())
    }

    /// Damage, healing and stun for a participant whose turn is starting
    pub fn start_turn(&self, participant: &str) -> TurnStartReport {
        let mut report = TurnStartReport::default();

        for effect in self.live() {
            let behavior = effect.category.behavior();
            if behavior.phase != TickPhase::TurnStart {
                continue;
            }
            let amount = effect.total_magnitude().max(0) as u32;
            match behavior.magnitude {
                MagnitudeKind::DamagePerTurn => {
                    report.damage = report.damage.saturating_add(amount);
                    report.messages.push(format!(
                        "{} takes {} damage from {}",
                        participant, amount, effect.category
                    ));
                }
                MagnitudeKind::HealPerTurn => {
                    report.healing = report.healing.saturating_add(amount);
                    report.messages.push(format!(
                        "{} heals {} HP from {}",
                        participant, amount, effect.category
                    ));
                }
                MagnitudeKind::SkipTurn => {
                    report.stunned = true;
                    report
                        .messages
                        .push(format!("{} is stunned and cannot act", participant));
                }
                _ => {}
            }
        }

        report
    }

    /// Decrement every duration and drop expired effects
    pub fn end_turn(&mut self, participant: &str) -> TurnEndReport {
        let mut report = TurnEndReport::default();

        for effect in &mut self.effects {
            if effect.tick() {
                report.expired.push(effect.category);
            }
        }
        self.effects.retain(|e| !e.is_expired());

        for category in &report.expired {
            debug!("Expired {} on {}", category, participant);
            report
                .messages
                .push(format!("{}'s {} wears off", participant, category));
        }

        report
    }

    /// Soak damage with a shield, returning what gets through
    pub fn absorb(&mut self, damage: u32) -> u32 {
        if damage == 0 {
            return 0;
        }
        let Some(index) = self
            .effects
            .iter()
            .position(|e| e.category == EffectCategory::Shield && !e.is_expired())
        else {
            return damage;
        };

        let capacity = self.effects[index].total_magnitude().max(0) as u32;
        if capacity > damage {
            let shield = &mut self.effects[index];
            shield.stacks = 1;
            shield.magnitude = (capacity - damage) as i32;
            0
        } else {
            self.effects.remove(index);
            damage - capacity
        }
    }

    fn signed_sum(&self, pick: impl Fn(MagnitudeKind) -> Option<i32>) -> i32 {
        self.live()
            .filter_map(|e| {
                pick(e.category.behavior().magnitude).map(|sign| sign * e.total_magnitude())
            })
            .fold(0, i32::saturating_add)
    }

    /// Attack roll modifier (haste +, slow -)
    pub fn attack_modifier(&self) -> i32 {
        self.signed_sum(|m| match m {
            MagnitudeKind::RollModifier(sign) => Some(sign),
            _ => None,
        })
    }

    /// AC modifier (haste +, slow -)
    pub fn ac_modifier(&self) -> i32 {
        self.attack_modifier()
    }

    /// Outgoing damage percent (strength +, weakness -), floored at 0
    pub fn outgoing_percent(&self) -> u32 {
        let delta = self.signed_sum(|m| match m {
            MagnitudeKind::OutgoingPercent(sign) => Some(sign),
            _ => None,
        });
        100i32.saturating_add(delta).max(0) as u32
    }

    /// Incoming damage percent (protection -, vulnerability +), floored at 0
    pub fn incoming_percent(&self) -> u32 {
        let delta = self.signed_sum(|m| match m {
            MagnitudeKind::IncomingPercent(sign) => Some(sign),
            _ => None,
        });
        100i32.saturating_add(delta).max(0) as u32
    }

    /// Get all active effects
    pub fn active_effects(&self) -> Vec<StatusEffect> {
        self.live().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.live().next().is_none()
    }
}

/// Effects for both participants of one battle
#[derive(Debug, Clone, Default)]
pub struct BattleEffects {
    participants: HashMap<String, EffectSet>,
}

impl BattleEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effects on a participant (empty if none were ever applied)
    pub fn for_participant(&self, participant: &str) -> EffectSet {
        self.participants.get(participant).cloned().unwrap_or_default()
    }

    fn entry(&mut self, participant: &str) -> &mut EffectSet {
        self.participants.entry(participant.to_string()).or_default()
    }

    pub fn apply(&mut self, participant: &str, effect: StatusEffect) -> StatusEffect {
        let applied = self.entry(participant).apply(effect);
        debug!(
            "Applied {} to {}: {} stacks, {} turns",
            applied.category, participant, applied.stacks, applied.remaining_turns
        );
        applied
    }

    pub fn has(&self, participant: &str, category: EffectCategory) -> bool {
        self.participants
            .get(participant)
            .is_some_and(|e| e.has(category))
    }

    pub fn can_act(&self, participant: &str) -> bool {
        self.participants
            .get(participant)
            .is_none_or(|e| e.can_act())
    }

    pub fn start_turn(&self, participant: &str) -> TurnStartReport {
        self.participants
            .get(participant)
            .map(|e| e.start_turn(participant))
            .unwrap_or_default()
    }

    pub fn end_turn(&mut self, participant: &str) -> TurnEndReport {
        match self.participants.get_mut(participant) {
            Some(effects) => effects.end_turn(participant),
            None => TurnEndReport::default(),
        }
    }

    pub fn absorb(&mut self, participant: &str, damage: u32) -> u32 {
        match self.participants.get_mut(participant) {
            Some(effects) => effects.absorb(damage),
            None => damage,
        }
    }

    pub fn attack_modifier(&self, participant: &str) -> i32 {
        self.participants
            .get(participant)
            .map_or(0, EffectSet::attack_modifier)
    }

    pub fn ac_modifier(&self, participant: &str) -> i32 {
        self.participants
            .get(participant)
            .map_or(0, EffectSet::ac_modifier)
    }

    pub fn outgoing_percent(&self, participant: &str) -> u32 {
        self.participants
            .get(participant)
            .map_or(100, EffectSet::outgoing_percent)
    }

    pub fn incoming_percent(&self, participant: &str) -> u32 {
        self.participants
            .get(participant)
            .map_or(100, EffectSet::incoming_percent)
    }

    /// Drop every effect in the battle
    pub fn clear_battle(&mut self) {
        self.participants.clear();
    }
}

/// Scale damage by a percentage, rounding half away from zero
pub fn scale_percent(amount: u32, percent: u32) -> u32 {
    ((amount as u64 * percent as u64 + 50) / 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("burn".parse::<EffectCategory>(), Ok(EffectCategory::Burn));
        assert_eq!("REGEN".parse::<EffectCategory>(), Ok(EffectCategory::Regeneration));
        assert_eq!("Stunned".parse::<EffectCategory>(), Ok(EffectCategory::Stun));
        assert!("invalid".parse::<EffectCategory>().is_err());
    }

    #[test]
    fn test_behavior_table() {
        let stackable: Vec<_> = EffectCategory::all()
            .iter()
            .filter(|c| c.is_stackable())
            .copied()
            .collect();
        assert_eq!(
            stackable,
            vec![
                EffectCategory::Burn,
                EffectCategory::Poison,
                EffectCategory::Regeneration,
                EffectCategory::Shield,
                EffectCategory::Bleed
            ]
        );
        assert_eq!(EffectCategory::Bleed.behavior().phase, TickPhase::TurnStart);
        assert!(EffectCategory::Shield.behavior().beneficial);
        assert!(!EffectCategory::Stun.behavior().beneficial);
    }

    #[test]
    fn test_status_tag_decoding() {
        let app = StatusApplication::from_tag("APPLY_STATUS:BURN:3:2:4").unwrap();
        assert_eq!(app.category, EffectCategory::Burn);
        assert_eq!((app.duration, app.stacks, app.magnitude), (3, 2, 4));

        assert!(StatusApplication::from_tag("APPLY_STATUS:BURN:3:2").is_err());
        assert!(StatusApplication::from_tag("APPLY_STATUS:FROST:3:1:1").is_err());
        assert!(StatusApplication::from_tag("APPLY_STATUS:STUN:0:1:0").is_err());
        assert!(StatusApplication::from_tag("FIRE").is_err());
    }

    #[test]
    fn test_applications_from_effect() {
        let effect = AbilityEffect::parse(
            "DAMAGE+2,APPLY_STATUS:POISON:2:1:3,FIRE,APPLY_STATUS:BOGUS:1:1:1",
        );
        let apps = StatusApplication::from_effect(&effect);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].category, EffectCategory::Poison);
    }

    #[test]
    fn test_non_stackable_refreshes() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Haste, 2, 2).with_stacks(3));
        let refreshed = effects.apply(StatusEffect::new(EffectCategory::Haste, 5, 2));

        assert_eq!(refreshed.stacks, 1);
        assert_eq!(refreshed.remaining_turns, 5);
        assert_eq!(effects.active_effects().len(), 1);
    }

    #[test]
    fn test_stackable_adds_stacks() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Burn, 3, 2));
        let stacked = effects.apply(StatusEffect::new(EffectCategory::Burn, 2, 2).with_stacks(2));

        assert_eq!(stacked.stacks, 3);
        assert_eq!(stacked.remaining_turns, 2);
        assert_eq!(stacked.total_magnitude(), 6);

        let report = effects.start_turn("bob");
        assert_eq!(report.damage, 6);
        assert!(!report.stunned);
    }

    #[test]
    fn test_turn_start_dot_and_hot() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Poison, 2, 3));
        effects.apply(StatusEffect::new(EffectCategory::Regeneration, 2, 4));
        effects.apply(StatusEffect::new(EffectCategory::Bleed, 2, 5));

        let report = effects.start_turn("bob");
        assert_eq!(report.damage, 8);
        assert_eq!(report.healing, 4);
        assert_eq!(report.messages.len(), 3);

        // Starting a turn does not consume duration
        assert_eq!(effects.get(EffectCategory::Poison).unwrap().remaining_turns, 2);
    }

    #[test]
    fn test_stun_and_expiry() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Stun, 1, 0));
        assert!(!effects.can_act());
        assert!(effects.start_turn("bob").stunned);

        let report = effects.end_turn("bob");
        assert_eq!(report.expired, vec![EffectCategory::Stun]);
        assert!(effects.can_act());
        assert!(effects.is_empty());
    }

    #[test]
    fn test_bleed_hits_at_turn_start() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Bleed, 2, 3));

        assert_eq!(effects.start_turn("bob").damage, 3);
        assert!(effects.end_turn("bob").expired.is_empty());

        effects.apply(StatusEffect::new(EffectCategory::Bleed, 1, 3));
        assert_eq!(effects.start_turn("bob").damage, 6);
        assert_eq!(effects.end_turn("bob").expired, vec![EffectCategory::Bleed]);
        assert_eq!(effects.start_turn("bob").damage, 0);
    }

    #[test]
    fn test_shield_absorbs() {
        let mut effects = EffectSet::new();
        effects.apply(StatusEffect::new(EffectCategory::Shield, 3, 5).with_stacks(2));
        assert_eq!(effects.get(EffectCategory::Shield).unwrap().total_magnitude(), 10);

        assert_eq!(effects.absorb(4), 0);
        assert_eq!(effects.get(EffectCategory::Shield).unwrap().total_magnitude(), 6);

        assert_eq!(effects.absorb(9), 3);
        assert!(!effects.has(EffectCategory::Shield));
        assert_eq!(effects.absorb(2), 2);
    }

    #[test]
    fn test_modifiers() {
        let mut effects = EffectSet::new();
        assert_eq!(effects.outgoing_percent(), 100);
        assert_eq!(effects.incoming_percent(), 100);

        effects.apply(StatusEffect::new(EffectCategory::Haste, 2, 2));
        effects.apply(StatusEffect::new(EffectCategory::Weakness, 2, 30));
        effects.apply(StatusEffect::new(EffectCategory::Vulnerability, 2, 25));
        assert_eq!(effects.attack_modifier(), 2);
        assert_eq!(effects.ac_modifier(), 2);
        assert_eq!(effects.outgoing_percent(), 70);
        assert_eq!(effects.incoming_percent(), 125);

        effects.apply(StatusEffect::new(EffectCategory::Protection, 2, 500));
        assert_eq!(effects.incoming_percent(), 0);
    }

    #[test]
    fn test_battle_effects_per_participant() {
        let mut battle = BattleEffects::new();
        battle.apply(
            "alice",
            StatusEffect::new(EffectCategory::Slow, 2, 1).with_source("bob", Some("frost")),
        );

        assert!(battle.has("alice", EffectCategory::Slow));
        assert!(!battle.has("bob", EffectCategory::Slow));
        assert_eq!(battle.attack_modifier("alice"), -1);
        assert_eq!(battle.attack_modifier("bob"), 0);
        assert_eq!(battle.absorb("bob", 7), 7);
        assert!(battle.can_act("carol"));

        battle.clear_battle();
        assert!(battle.for_participant("alice").is_empty());
    }

    #[test]
    fn test_scale_percent() {
        assert_eq!(scale_percent(10, 100), 10);
        assert_eq!(scale_percent(5, 150), 8);
        assert_eq!(scale_percent(5, 70), 4);
        assert_eq!(scale_percent(7, 0), 0);
    }
}
