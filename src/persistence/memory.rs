//! In-memory stores
//!
//! Used by tests and by embedders that do not need durable history. Both stores
//! can be switched into a failing mode to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{BattleStore, CharacterRepository, SessionRecord, StoreError, TurnRecord};
use crate::character::{Character, Progression};

/// Sessions and turns kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    turns: Mutex<Vec<TurnRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn turns_for(&self, battle_id: &str) -> Vec<TurnRecord> {
        self.turns
            .lock()
            .iter()
            .filter(|t| t.battle_id == battle_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BattleStore for MemoryStore {
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        self.check()?;
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_live_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.check()?;
        let mut live: Vec<SessionRecord> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.status.is_live())
            .cloned()
            .collect();
        live.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(live)
    }

    async fn append_turn(&self, turn: &TurnRecord) -> Result<(), StoreError> {
        self.check()?;
        self.turns.lock().push(turn.clone());
        Ok(())
    }
}

/// Characters keyed by community and user
#[derive(Debug, Default)]
pub struct MemoryCharacters {
    characters: RwLock<HashMap<(String, String), Character>>,
    failing: AtomicBool,
}

impl MemoryCharacters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        let store = Self::new();
        for character in characters {
            store.insert(character);
        }
        store
    }

    pub fn insert(&self, character: Character) {
        let key = (character.community_id.clone(), character.user_id.clone());
        self.characters.write().insert(key, character);
    }

    pub fn remove(&self, community_id: &str, user_id: &str) -> Option<Character> {
        self.characters
            .write()
            .remove(&(community_id.to_string(), user_id.to_string()))
    }

    pub fn get(&self, community_id: &str, user_id: &str) -> Option<Character> {
        self.characters
            .read()
            .get(&(community_id.to_string(), user_id.to_string()))
            .cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CharacterRepository for MemoryCharacters {
    async fn find_character(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<Character>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("character store set to fail".to_string()));
        }
        Ok(self.get(community_id, user_id))
    }

    async fn record_outcome(
        &self,
        community_id: &str,
        user_id: &str,
        progression: &Progression,
    ) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("character store set to fail".to_string()));
        }
        let mut characters = self.characters.write();
        let character = characters
            .get_mut(&(community_id.to_string(), user_id.to_string()))
            .ok_or_else(|| {
                StoreError::Invalid(format!("no character for {} in {}", user_id, community_id))
            })?;
        character.progression = progression.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, CharacterClass, Race};
    use crate::combat::state::Battle;

    #[tokio::test]
    async fn test_live_sessions_filter() {
        let store = MemoryStore::new();

        let pending = Battle::new_pending("g1", "alice", "bob");
        let mut declined = Battle::new_pending("g1", "carol", "dave");
        declined.decline("dave").unwrap();

        store.save_session(&SessionRecord::from(&pending)).await.unwrap();
        store.save_session(&SessionRecord::from(&declined)).await.unwrap();

        let live = store.load_live_sessions().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, pending.id);
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let battle = Battle::new_pending("g1", "alice", "bob");
        let err = store
            .save_session(&SessionRecord::from(&battle))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_failing(false);
        store.save_session(&SessionRecord::from(&battle)).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_outcome() {
        let characters = MemoryCharacters::with_characters([Character::new(
            "g1",
            "alice",
            CharacterClass::Warrior,
            Race::Human,
            AbilityScores::new(15, 14, 13, 12, 10, 8),
        )]);

        let progression = Progression {
            xp: 100,
            wins: 1,
            ..Progression::default()
        };
        characters
            .record_outcome("g1", "alice", &progression)
            .await
            .unwrap();

        let found = characters.find_character("g1", "alice").await.unwrap().unwrap();
        assert_eq!(found.progression.wins, 1);
        assert!(characters.find_character("g2", "alice").await.unwrap().is_none());
        assert!(characters.record_outcome("g1", "bob", &progression).await.is_err());
    }
}
