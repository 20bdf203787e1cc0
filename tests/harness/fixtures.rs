//! Character fixtures

use duelist::character::{
    AbilityKind, AbilityScores, Character, CharacterClass, LearnedAbility, Race,
};

pub const COMMUNITY: &str = "guild-1";

/// Spell that stuns its target for two turns
pub const STUN_SPELL: &str = "thunderclap";

/// The 27-point standard array
pub fn standard_scores() -> AbilityScores {
    AbilityScores::new(15, 14, 13, 12, 10, 8)
}

pub fn warrior(user: &str) -> Character {
    Character::new(
        COMMUNITY,
        user,
        CharacterClass::Warrior,
        Race::Human,
        standard_scores(),
    )
}

/// Mage that knows the stun spell
pub fn mage(user: &str) -> Character {
    Character::new(
        COMMUNITY,
        user,
        CharacterClass::Mage,
        Race::Elf,
        standard_scores(),
    )
    .with_ability(LearnedAbility::new(
        STUN_SPELL,
        AbilityKind::Spell,
        "APPLY_STATUS:STUN:2:1:0",
    ))
}
