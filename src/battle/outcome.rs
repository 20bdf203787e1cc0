//! Results returned by battle actions

use serde::{Deserialize, Serialize};

use crate::combat::effects::StatusEffect;
use crate::combat::resolution::AttackRoll;
use crate::combat::state::Battle;
use crate::persistence::TurnAction;

/// Everything that happened during one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Battle state after the action
    pub battle: Battle,
    pub actor_id: String,
    pub action: TurnAction,
    /// Turn number the action was taken on
    pub turn_number: u32,
    pub ability_key: Option<String>,
    /// Spell slot level spent by the cast
    pub slot_level: Option<u8>,
    /// Present for attacks and offensive spells
    pub roll: Option<AttackRoll>,
    /// Damage that reached the target's HP
    pub damage: u32,
    /// Damage soaked by the target's shield
    pub absorbed: u32,
    pub healing: u32,
    /// Actor lost the turn to a stun
    pub stunned: bool,
    pub effects_applied: Vec<AppliedEffect>,
    /// Status-effect messages from the start and end of the turn
    pub messages: Vec<String>,
}

/// A status effect landed by a spell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEffect {
    pub participant: String,
    pub effect: StatusEffect,
}

impl ActionOutcome {
    pub(crate) fn new(battle: &Battle, actor_id: &str, action: TurnAction) -> Self {
        Self {
            battle: battle.clone(),
            actor_id: actor_id.to_string(),
            action,
            turn_number: battle.turn_number,
            ability_key: None,
            slot_level: None,
            roll: None,
            damage: 0,
            absorbed: 0,
            healing: 0,
            stunned: false,
            effects_applied: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn hit(&self) -> bool {
        self.roll.is_some_and(|r| r.hit)
    }

    pub fn critical(&self) -> bool {
        self.roll.is_some_and(|r| r.critical)
    }

    pub fn is_over(&self) -> bool {
        self.battle.is_ended()
    }

    pub fn winner(&self) -> Option<&str> {
        self.battle.winner.as_deref()
    }
}
