//! Live battle registry
//!
//! Lock order is reservations -> cooldowns -> battle map -> battle slot.
//! Nothing here holds a guard across an await, and no method takes a slot lock
//! while holding the reservation or map locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::character::Character;
use crate::combat::effects::BattleEffects;
use crate::combat::state::{Battle, BattleId};
use crate::combat::stats::{self, CombatStats};
use crate::config::BattleConfig;
use crate::error::{BattleError, Result};

/// A participant's character and the stats derived from it
#[derive(Debug, Clone)]
pub struct Combatant {
    pub character: Character,
    pub stats: CombatStats,
}

impl Combatant {
    pub fn new(character: Character, config: &BattleConfig) -> Self {
        let stats = stats::calculate(
            &character.scores,
            character.level(),
            character.class,
            &config.classes,
            &config.progression.proficiency_by_level,
            &character.passive_effect(),
        );
        Self { character, stats }
    }

    /// Starting (and maximum) HP
    pub fn max_hp(&self) -> u32 {
        self.stats.max_hp.max(1) as u32
    }
}

/// One battle with its effects and stat snapshots, locked as a unit
#[derive(Debug)]
pub struct BattleSlot {
    pub battle: Battle,
    pub effects: BattleEffects,
    combatants: HashMap<String, Combatant>,
}

impl BattleSlot {
    pub fn new(battle: Battle) -> Self {
        Self {
            battle,
            effects: BattleEffects::new(),
            combatants: HashMap::new(),
        }
    }

    pub fn set_combatant(&mut self, combatant: Combatant) {
        self.combatants
            .insert(combatant.character.user_id.clone(), combatant);
    }

    pub fn combatant(&self, user_id: &str) -> Result<&Combatant> {
        self.combatants.get(user_id).ok_or_else(|| {
            BattleError::state(format!(
                "no combat stats for {} in battle {}",
                user_id, self.battle.id
            ))
        })
    }
}

pub type SlotRef = Arc<Mutex<BattleSlot>>;

type MemberKey = (String, String);

fn member(community_id: &str, user_id: &str) -> MemberKey {
    (community_id.to_string(), user_id.to_string())
}

/// All battles known to one service
#[derive(Debug, Default)]
pub struct Registry {
    reservations: Mutex<HashMap<MemberKey, BattleId>>,
    battles: RwLock<HashMap<BattleId, SlotRef>>,
    cooldowns: Mutex<HashMap<MemberKey, Instant>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve both participants and register the battle in one critical section
    ///
    /// Participants still on cooldown are refused. `limit` caps live battles
    /// per community; `None` skips the check.
    pub fn insert(&self, slot: BattleSlot, limit: Option<usize>) -> Result<SlotRef> {
        let battle = &slot.battle;
        let community = battle.community_id.as_str();
        let mut reservations = self.reservations.lock();

        for user in [&battle.challenger_id, &battle.opponent_id] {
            if let Some(existing) = reservations.get(&member(community, user)) {
                return Err(BattleError::conflict(format!(
                    "{} is already in battle {}",
                    user, existing
                )));
            }
        }

        {
            let mut cooldowns = self.cooldowns.lock();
            for user in [&battle.challenger_id, &battle.opponent_id] {
                let remaining = remaining(&mut cooldowns, &member(community, user));
                if !remaining.is_zero() {
                    return Err(BattleError::state(format!(
                        "{} is on cooldown for {}s",
                        user,
                        remaining.as_secs().max(1)
                    )));
                }
            }
        }

        if let Some(limit) = limit {
            // Every live battle holds exactly two reservations
            let live = reservations.keys().filter(|(c, _)| c == community).count() / 2;
            if live >= limit {
                return Err(BattleError::state(format!(
                    "community {} already has {} live battles",
                    community, live
                )));
            }
        }

        reservations.insert(member(community, &battle.challenger_id), battle.id.clone());
        reservations.insert(member(community, &battle.opponent_id), battle.id.clone());

        let id = battle.id.clone();
        let slot = Arc::new(Mutex::new(slot));
        self.battles.write().insert(id, slot.clone());
        Ok(slot)
    }

    pub fn get(&self, battle_id: &str) -> Option<SlotRef> {
        self.battles.read().get(battle_id).cloned()
    }

    pub fn require(&self, battle_id: &str) -> Result<SlotRef> {
        self.get(battle_id)
            .ok_or_else(|| BattleError::not_found(format!("battle {}", battle_id)))
    }

    /// Snapshot of every registered slot
    pub fn slots(&self) -> Vec<SlotRef> {
        self.battles.read().values().cloned().collect()
    }

    pub fn remove(&self, battle_id: &str) -> Option<SlotRef> {
        self.battles.write().remove(battle_id)
    }

    pub fn len(&self) -> usize {
        self.battles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free both participants of a battle; idempotent
    ///
    /// A non-zero `cooldown` is started before the reservations go away, so no
    /// new battle can slip in between.
    pub fn release(&self, battle: &Battle, cooldown: Option<Duration>) {
        let mut reservations = self.reservations.lock();
        if let Some(duration) = cooldown.filter(|d| !d.is_zero()) {
            let until = Instant::now() + duration;
            let mut cooldowns = self.cooldowns.lock();
            for user in [&battle.challenger_id, &battle.opponent_id] {
                let key = member(&battle.community_id, user);
                if reservations.get(&key) == Some(&battle.id) {
                    cooldowns.insert(key, until);
                }
            }
        }
        for user in [&battle.challenger_id, &battle.opponent_id] {
            let key = member(&battle.community_id, user);
            if reservations.get(&key) == Some(&battle.id) {
                reservations.remove(&key);
            }
        }
    }

    /// Battle currently holding a participant
    pub fn reservation(&self, community_id: &str, user_id: &str) -> Option<BattleId> {
        self.reservations
            .lock()
            .get(&member(community_id, user_id))
            .cloned()
    }

    /// Time left before a participant may battle again
    pub fn cooldown_remaining(&self, community_id: &str, user_id: &str) -> Duration {
        remaining(&mut self.cooldowns.lock(), &member(community_id, user_id))
    }
}

/// Remaining cooldown for a key, pruning it once elapsed
fn remaining(cooldowns: &mut HashMap<MemberKey, Instant>, key: &MemberKey) -> Duration {
    let now = Instant::now();
    match cooldowns.get(key) {
        Some(until) if *until > now => *until - now,
        Some(_) => {
            cooldowns.remove(key);
            Duration::ZERO
        }
        None => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn slot(community: &str, a: &str, b: &str) -> BattleSlot {
        BattleSlot::new(Battle::new_pending(community, a, b))
    }

    #[test]
    fn test_insert_reserves_both() {
        let registry = Registry::new();
        let first = registry.insert(slot("g1", "alice", "bob"), None).unwrap();
        let id = first.lock().battle.id.clone();

        assert_eq!(registry.reservation("g1", "alice"), Some(id.clone()));
        assert_eq!(registry.reservation("g1", "bob"), Some(id.clone()));
        assert_eq!(registry.reservation("g2", "alice"), None);

        let err = registry.insert(slot("g1", "carol", "bob"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Same users in another community are free
        registry.insert(slot("g2", "alice", "bob"), None).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = Registry::new();
        let inserted = registry.insert(slot("g1", "alice", "bob"), None).unwrap();
        let battle = inserted.lock().battle.clone();

        registry.release(&battle, None);
        registry.release(&battle, None);
        assert_eq!(registry.reservation("g1", "alice"), None);

        // Released participants can be reserved again
        registry.insert(slot("g1", "alice", "bob"), None).unwrap();
    }

    #[test]
    fn test_community_limit() {
        let registry = Registry::new();
        registry.insert(slot("g1", "a", "b"), Some(2)).unwrap();
        registry.insert(slot("g1", "c", "d"), Some(2)).unwrap();
        let err = registry.insert(slot("g1", "e", "f"), Some(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateViolation);

        registry.insert(slot("g2", "e", "f"), Some(2)).unwrap();
    }

    #[test]
    fn test_release_starts_cooldown_before_freeing() {
        let registry = Registry::new();
        let inserted = registry.insert(slot("g1", "alice", "bob"), None).unwrap();
        let battle = inserted.lock().battle.clone();

        registry.release(&battle, Some(Duration::from_secs(60)));
        assert_eq!(registry.reservation("g1", "alice"), None);
        assert!(registry.cooldown_remaining("g1", "alice") > Duration::from_secs(50));
        assert!(registry.cooldown_remaining("g1", "bob") > Duration::from_secs(50));
        assert_eq!(registry.cooldown_remaining("g2", "alice"), Duration::ZERO);

        // The freed participants cannot be reserved until the cooldown passes
        let err = registry.insert(slot("g1", "alice", "carol"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateViolation);
        assert_eq!(registry.reservation("g1", "carol"), None);
        registry.insert(slot("g1", "carol", "dave"), None).unwrap();
    }

    #[test]
    fn test_release_of_stale_battle_leaves_cooldowns_alone() {
        let registry = Registry::new();
        let first = registry.insert(slot("g1", "alice", "bob"), None).unwrap();
        let first = first.lock().battle.clone();
        registry.release(&first, None);
        registry.insert(slot("g1", "alice", "bob"), None).unwrap();

        // A second release of the old battle must not touch the new one
        registry.release(&first, Some(Duration::from_secs(60)));
        assert_eq!(registry.cooldown_remaining("g1", "alice"), Duration::ZERO);
        assert!(registry.reservation("g1", "alice").is_some());
    }

    #[test]
    fn test_racing_release_and_insert_never_skip_cooldown() {
        for _ in 0..50 {
            let registry = Arc::new(Registry::new());
            let inserted = registry.insert(slot("g1", "alice", "bob"), None).unwrap();
            let battle = inserted.lock().battle.clone();

            let racer = {
                let registry = registry.clone();
                std::thread::spawn(move || registry.insert(slot("g1", "alice", "carol"), None))
            };
            registry.release(&battle, Some(Duration::from_secs(60)));

            // Either still reserved (Conflict) or already cooling down
            let err = racer.join().unwrap().unwrap_err();
            assert!(matches!(
                err.kind(),
                ErrorKind::Conflict | ErrorKind::StateViolation
            ));
        }
    }
}
