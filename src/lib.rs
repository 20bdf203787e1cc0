//! duelist - turn-based duel engine
//!
//! Resolves one-on-one battles between community members' characters:
//! ability effects, derived stats, status effects, the battle state machine,
//! and a concurrency-safe service with background sweeps and persistence.

pub mod battle;
pub mod character;
pub mod combat;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod persistence;
pub mod progression;
pub mod scheduler;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use battle::{BattleService, RecoveryReport};
use combat::dice::{DiceSource, ThreadDice};
use config::BattleConfig;
use db::SqliteStore;
use scheduler::Scheduler;

/// Long-running engine process: SQLite-backed service plus sweeps
pub struct Daemon {
    service: Arc<BattleService>,
    store: Arc<SqliteStore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Daemon {
    /// Open the database and build the service with production dice
    pub async fn new(config: BattleConfig, db_path: Option<&str>) -> Result<Self> {
        Self::with_dice(config, db_path, Arc::new(ThreadDice)).await
    }

    pub async fn with_dice(
        config: BattleConfig,
        db_path: Option<&str>,
        dice: Arc<dyn DiceSource>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(db_path).await?);
        let service = BattleService::new(config, store.clone(), store.clone(), dice)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            service: Arc::new(service),
            store,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn service(&self) -> Arc<BattleService> {
        self.service.clone()
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    /// Reload live sessions left by a previous run
    pub async fn recover(&self) -> Result<RecoveryReport> {
        Ok(self.service.recover(self.store.as_ref()).await?)
    }

    /// Run the sweeps until shutdown, then drain pending persistence
    pub async fn run(&self) -> Result<()> {
        let scheduler = Scheduler::start(self.service.clone());
        info!(
            active = self.service.get_all_active_battles().len(),
            "duelist running"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        scheduler.shutdown().await;
        self.service.flush().await;
        info!("duelist shutdown complete");
        Ok(())
    }

    /// Signal the daemon to shut down
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
