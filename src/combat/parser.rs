//! Ability effect expressions
//!
//! Abilities carry short effect strings such as `"DAMAGE+3,FIRE"` or
//! `"MAX_HP+5,HEAL_BONUS+2"`. Each comma-separated token is either a signed
//! modifier on a stat (`STAT+N` / `STAT-N`) or an opaque tag.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::effects::StatusApplication;

static MODIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z_]+)([+-])(\d+)$").unwrap());

/// Stat keys understood by the stat calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectStat {
    Damage,
    Ac,
    MaxHp,
    SpellDamage,
    HealBonus,
    CritDamage,
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl EffectStat {
    /// Key used in effect strings
    pub fn key(&self) -> &'static str {
        match self {
            EffectStat::Damage => "DAMAGE",
            EffectStat::Ac => "AC",
            EffectStat::MaxHp => "MAX_HP",
            EffectStat::SpellDamage => "SPELL_DAMAGE",
            EffectStat::HealBonus => "HEAL_BONUS",
            EffectStat::CritDamage => "CRIT_DAMAGE",
            EffectStat::Str => "STR",
            EffectStat::Dex => "DEX",
            EffectStat::Con => "CON",
            EffectStat::Int => "INT",
            EffectStat::Wis => "WIS",
            EffectStat::Cha => "CHA",
        }
    }

    pub fn all() -> &'static [EffectStat] {
        &[
            EffectStat::Damage,
            EffectStat::Ac,
            EffectStat::MaxHp,
            EffectStat::SpellDamage,
            EffectStat::HealBonus,
            EffectStat::CritDamage,
            EffectStat::Str,
            EffectStat::Dex,
            EffectStat::Con,
            EffectStat::Int,
            EffectStat::Wis,
            EffectStat::Cha,
        ]
    }
}

impl FromStr for EffectStat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectStat::all()
            .iter()
            .copied()
            .find(|stat| stat.key() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for EffectStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Parsed set of stat modifiers and tags
///
/// Modifiers are keyed by the raw stat key so that keys the calculator does not
/// know about still survive a round of combining. Sums are kept wide and only
/// clamped to `i32` when read, so combining stays associative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityEffect {
    modifiers: BTreeMap<String, i64>,
    tags: BTreeSet<String>,
}

impl AbilityEffect {
    /// An effect with no modifiers and no tags
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse one effect expression
    pub fn parse(expression: &str) -> Self {
        let mut effect = Self::default();

        for token in expression.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            match MODIFIER_REGEX.captures(token) {
                Some(caps) => {
                    // Digit runs too long for i32 saturate instead of failing
                    let magnitude = caps[3]
                        .parse::<i32>()
                        .map(i64::from)
                        .unwrap_or(i64::from(i32::MAX));
                    let value = if &caps[2] == "-" { -magnitude } else { magnitude };
                    effect.add_modifier(&caps[1], value);
                }
                None => {
                    effect.tags.insert(token.to_string());
                }
            }
        }

        effect
    }

    fn add_modifier(&mut self, key: &str, value: i64) {
        *self.modifiers.entry(key.to_string()).or_insert(0) += value;
    }

    /// Merge another effect into this one: sum like keys, union tags
    pub fn combine(mut self, other: &AbilityEffect) -> Self {
        for (key, value) in &other.modifiers {
            self.add_modifier(key, *value);
        }
        self.tags.extend(other.tags.iter().cloned());
        self
    }

    /// Total bonus for a known stat
    pub fn total(&self, stat: EffectStat) -> i32 {
        self.total_named(stat.key())
    }

    /// Total bonus for a raw stat key
    pub fn total_named(&self, key: &str) -> i32 {
        self.modifiers.get(key).copied().map(clamp).unwrap_or(0)
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn modifiers(&self) -> impl Iterator<Item = (&str, i32)> {
        self.modifiers.iter().map(|(k, v)| (k.as_str(), clamp(*v)))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty() && self.tags.is_empty()
    }

    /// Status effects requested by `APPLY_STATUS:...` tags
    pub fn status_applications(&self) -> Vec<StatusApplication> {
        StatusApplication::from_effect(self)
    }
}

fn clamp(total: i64) -> i32 {
    total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Parse an optional effect expression; `None` yields an empty effect
pub fn parse(expression: Option<&str>) -> AbilityEffect {
    expression.map(AbilityEffect::parse).unwrap_or_default()
}

/// Parse several expressions (e.g. every learned ability) and combine them
pub fn parse_and_combine<'a, I>(expressions: I) -> AbilityEffect
where
    I: IntoIterator<Item = &'a str>,
{
    expressions
        .into_iter()
        .fold(AbilityEffect::empty(), |acc, expr| {
            acc.combine(&AbilityEffect::parse(expr))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_modifier_and_tag() {
        let effect = AbilityEffect::parse("DAMAGE+3,FIRE");
        assert_eq!(effect.total(EffectStat::Damage), 3);
        assert!(effect.has_tag("FIRE"));
        assert!(effect.has_tag("fire"));
    }

    #[test]
    fn test_parse_negative_and_whitespace() {
        let effect = AbilityEffect::parse("  AC-2 , ,MAX_HP+5,  ");
        assert_eq!(effect.total(EffectStat::Ac), -2);
        assert_eq!(effect.total(EffectStat::MaxHp), 5);
        assert_eq!(effect.tags().count(), 0);
    }

    #[test]
    fn test_parse_empty_inputs() {
        assert!(parse(None).is_empty());
        assert!(AbilityEffect::parse("").is_empty());
        assert!(AbilityEffect::parse("   ").is_empty());
        assert!(AbilityEffect::parse(", ,").is_empty());
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        // Lower-case keys do not match the modifier grammar and become tags
        let effect = AbilityEffect::parse("damage+3");
        assert_eq!(effect.total(EffectStat::Damage), 0);
        assert!(effect.has_tag("DAMAGE+3"));
    }

    #[test]
    fn test_malformed_tokens_are_tags() {
        let effect = AbilityEffect::parse("DAMAGE+,+3,DAMAGE+3x,APPLY_STATUS:BURN:3:1:2");
        assert_eq!(effect.total(EffectStat::Damage), 0);
        assert_eq!(effect.tags().count(), 4);
    }

    #[test]
    fn test_same_key_accumulates() {
        let effect = AbilityEffect::parse("DAMAGE+3,DAMAGE+2,DAMAGE-1");
        assert_eq!(effect.total(EffectStat::Damage), 4);
    }

    #[test]
    fn test_unknown_keys_survive() {
        let effect = AbilityEffect::parse("LUCK+2");
        assert_eq!(effect.total_named("LUCK"), 2);
        assert!(!effect.has_tag("LUCK+2"));
    }

    #[test]
    fn test_huge_value_saturates() {
        let effect = AbilityEffect::parse("DAMAGE+99999999999999999999,DAMAGE+5");
        assert_eq!(effect.total(EffectStat::Damage), i32::MAX);
    }

    #[test]
    fn test_combine_at_i32_limits_is_associative() {
        let a = AbilityEffect::parse("DAMAGE+2147483647");
        let b = AbilityEffect::parse("DAMAGE+1");
        let c = AbilityEffect::parse("DAMAGE-1");

        let left = a.clone().combine(&b).combine(&c);
        let right = a.combine(&b.combine(&c));
        assert_eq!(left, right);
        assert_eq!(left.total(EffectStat::Damage), i32::MAX);

        let low = AbilityEffect::parse("AC-2147483647,AC-5");
        assert_eq!(low.total(EffectStat::Ac), i32::MIN);
    }

    #[test]
    fn test_parse_and_combine() {
        let effect = parse_and_combine(["STR+1,ATHLETE", "STR+1,DEX+2", "FIRE,athlete"]);
        assert_eq!(effect.total(EffectStat::Str), 2);
        assert_eq!(effect.total(EffectStat::Dex), 2);
        assert!(effect.has_tag("Athlete"));
        assert!(effect.has_tag("fire"));
    }

    #[test]
    fn test_effect_stat_keys_round_trip() {
        for stat in EffectStat::all() {
            assert_eq!(stat.key().parse::<EffectStat>(), Ok(*stat));
        }
        assert!("dex".parse::<EffectStat>().is_err());
    }

    fn expression() -> impl Strategy<Value = String> {
        let token = prop_oneof![
            (
                prop::sample::select(vec!["DAMAGE", "AC", "MAX_HP", "STR", "WIS"]),
                prop::bool::ANY,
                prop_oneof![0u32..50, Just(i32::MAX as u32), Just(1u32)]
            )
                .prop_map(|(k, neg, n)| format!("{}{}{}", k, if neg { "-" } else { "+" }, n)),
            "[A-Za-z_]{1,8}".prop_map(|t| t),
            Just(" ".to_string()),
        ];
        prop::collection::vec(token, 0..6).prop_map(|tokens| tokens.join(","))
    }

    proptest! {
        #[test]
        fn prop_combine_is_commutative(a in expression(), b in expression()) {
            let ab = AbilityEffect::parse(&a).combine(&AbilityEffect::parse(&b));
            let ba = AbilityEffect::parse(&b).combine(&AbilityEffect::parse(&a));
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn prop_combine_is_associative(a in expression(), b in expression(), c in expression()) {
            let (pa, pb, pc) = (
                AbilityEffect::parse(&a),
                AbilityEffect::parse(&b),
                AbilityEffect::parse(&c),
            );
            let left = pa.clone().combine(&pb).combine(&pc);
            let right = pa.combine(&pb.combine(&pc));
            prop_assert_eq!(left, right);
        }
    }
}
