//! Integration test harness
//!
//! - `TestEngine` - a `BattleService` over in-memory stores with scripted dice
//! - character fixtures that pass the default point-buy rules
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = TestEngine::start().await;
//! let battle = engine.active_battle("alice", "bob").await;
//! engine.service.perform_attack(&battle.id, "alice").unwrap();
//! ```

#![allow(dead_code)]

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use duelist::battle::BattleService;
use duelist::combat::dice::{DiceSource, ScriptedDice};
use duelist::combat::state::Battle;
use duelist::config::BattleConfig;
use duelist::persistence::{MemoryCharacters, MemoryStore};

pub use fixtures::{mage, standard_scores, warrior, COMMUNITY, STUN_SPELL};

/// Battle service wired to stores the test can inspect
pub struct TestEngine {
    pub service: Arc<BattleService>,
    pub store: Arc<MemoryStore>,
    pub characters: Arc<MemoryCharacters>,
}

/// Defaults with cooldowns off so tests can chain battles
pub fn test_config() -> BattleConfig {
    let mut config = BattleConfig::default();
    config.combat.cooldown_secs = 0;
    config
}

impl TestEngine {
    /// Warriors alice, bob and carol; every d20 misses
    pub async fn start() -> Self {
        Self::with(test_config(), Arc::new(ScriptedDice::new([2]))).await
    }

    pub async fn with(config: BattleConfig, dice: Arc<dyn DiceSource>) -> Self {
        let characters = Arc::new(MemoryCharacters::with_characters([
            warrior("alice"),
            warrior("bob"),
            warrior("carol"),
        ]));
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, dice, store, characters)
    }

    pub fn with_stores(
        config: BattleConfig,
        dice: Arc<dyn DiceSource>,
        store: Arc<MemoryStore>,
        characters: Arc<MemoryCharacters>,
    ) -> Self {
        let service = BattleService::new(config, characters.clone(), store.clone(), dice)
            .expect("test config is valid");
        Self {
            service: Arc::new(service),
            store,
            characters,
        }
    }

    /// Create and accept a challenge in the test community
    pub async fn active_battle(&self, challenger: &str, opponent: &str) -> Battle {
        let pending = self
            .service
            .create_challenge(COMMUNITY, challenger, opponent)
            .await
            .expect("challenge created");
        self.service
            .accept_challenge(&pending.id, opponent)
            .await
            .expect("challenge accepted")
    }

    /// Wait for the persistence worker to drain
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.service.flush())
            .await
            .expect("persistence flush timed out");
    }
}
