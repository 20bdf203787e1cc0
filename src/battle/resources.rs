//! Spell slots and ability cooldowns
//!
//! Casters receive the configured slot pools the first time they are seen.
//! Pools and cooldowns belong to the character, not to one battle: spent
//! slots stay spent until a long rest.
//!
//! Lock order: a battle slot may be held while taking the ledger lock, never
//! the other way around.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::character::{Character, LearnedAbility};
use crate::config::SpellConfig;
use crate::error::{BattleError, Result};

/// Slots of one spell level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPool {
    pub level: u8,
    pub current: u32,
    pub max: u32,
}

#[derive(Debug, Default)]
struct CasterState {
    slots: BTreeMap<u8, SlotPool>,
    /// Lower-cased ability key -> when it becomes usable again
    cooldowns: HashMap<String, Instant>,
}

type CasterKey = (String, String);

/// Per-character spell resources
#[derive(Debug)]
pub struct SpellResources {
    slots_by_level: Vec<u32>,
    casters: Mutex<HashMap<CasterKey, CasterState>>,
}

impl SpellResources {
    pub fn new(config: &SpellConfig) -> Self {
        Self {
            slots_by_level: config.slots_by_level.clone(),
            casters: Mutex::new(HashMap::new()),
        }
    }

    fn initial_state(&self, character: &Character) -> CasterState {
        let mut state = CasterState::default();
        if character.class.is_caster() {
            for (index, max) in self.slots_by_level.iter().enumerate() {
                let level = (index + 1) as u8;
                state.slots.insert(
                    level,
                    SlotPool {
                        level,
                        current: *max,
                        max: *max,
                    },
                );
            }
        }
        state
    }

    fn with_state<T>(&self, character: &Character, f: impl FnOnce(&mut CasterState) -> T) -> T {
        let mut casters = self.casters.lock();
        let state = casters
            .entry((character.community_id.clone(), character.user_id.clone()))
            .or_insert_with(|| self.initial_state(character));
        f(state)
    }

    /// Reject a cast the character cannot pay for or is still cooling down from
    pub fn check(&self, character: &Character, ability: &LearnedAbility) -> Result<()> {
        let now = Instant::now();
        self.with_state(character, |state| {
            if let Some(level) = ability.slot_level() {
                let available = state.slots.get(&level).is_some_and(|pool| pool.current > 0);
                if !available {
                    return Err(BattleError::state(format!(
                        "{} has no level {} spell slots left for {}",
                        character.user_id, level, ability.key
                    )));
                }
            }

            if let Some(until) = state.cooldowns.get(&ability.key.to_lowercase()) {
                if *until > now {
                    return Err(BattleError::state(format!(
                        "{} is on cooldown for {}s",
                        ability.key,
                        (*until - now).as_secs().max(1)
                    )));
                }
            }
            Ok(())
        })
    }

    /// Spend one slot of a level; false when none is left
    pub fn consume_slot(&self, character: &Character, level: u8) -> bool {
        self.with_state(character, |state| match state.slots.get_mut(&level) {
            Some(pool) if pool.current > 0 => {
                pool.current -= 1;
                debug!(
                    user = %character.user_id,
                    level,
                    remaining = pool.current,
                    "Spell slot consumed"
                );
                true
            }
            _ => false,
        })
    }

    /// Start (or restart) the ability's cooldown, if it has one
    pub fn start_cooldown(&self, character: &Character, ability: &LearnedAbility) {
        let Some(secs) = ability.cooldown_secs.filter(|secs| *secs > 0) else {
            return;
        };
        let until = Instant::now() + Duration::from_secs(secs);
        self.with_state(character, |state| {
            state.cooldowns.insert(ability.key.to_lowercase(), until);
        });
    }

    pub fn slots(&self, character: &Character) -> Vec<SlotPool> {
        self.with_state(character, |state| state.slots.values().copied().collect())
    }

    pub fn cooldown_remaining(&self, character: &Character, ability_key: &str) -> Duration {
        let now = Instant::now();
        self.with_state(character, |state| {
            state
                .cooldowns
                .get(&ability_key.to_lowercase())
                .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
        })
    }

    /// Refill every slot pool
    pub fn long_rest(&self, character: &Character) {
        self.with_state(character, |state| {
            for pool in state.slots.values_mut() {
                pool.current = pool.max;
            }
        });
    }

    /// Drop elapsed cooldowns, returning how many were removed
    pub fn clean_up_expired_cooldowns(&self) -> usize {
        let now = Instant::now();
        let mut casters = self.casters.lock();
        let mut removed = 0;
        for state in casters.values_mut() {
            let before = state.cooldowns.len();
            state.cooldowns.retain(|_, until| *until > now);
            removed += before - state.cooldowns.len();
        }
        removed
    }
}
