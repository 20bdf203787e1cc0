//! Background persistence writer
//!
//! The battle service enqueues jobs on an unbounded channel and moves on. A
//! single worker task drains the queue in order, so saves for one battle never
//! overtake each other. Failures are logged and counted, never returned to the
//! caller that caused them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{BattleStore, CharacterRepository, SessionRecord, StoreError, TurnRecord};
use crate::config::ProgressionConfig;
use crate::progression::{settle, Outcome};

/// Settle progression for both sides of a played battle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeJob {
    pub battle_id: String,
    pub community_id: String,
    pub first: String,
    pub second: String,
    /// Result from `first`'s point of view
    pub first_outcome: Outcome,
}

/// Work for the writer
#[derive(Debug)]
pub enum PersistenceJob {
    Session(SessionRecord),
    Turn(TurnRecord),
    Outcome(OutcomeJob),
    /// Reply once every earlier job has been handled
    Flush(oneshot::Sender<()>),
}

/// Cheap, cloneable sender side of the writer
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistenceJob>,
    failures: Arc<AtomicU64>,
}

impl PersistenceHandle {
    /// Start the worker task; it stops when every handle is dropped
    pub fn spawn(
        store: Arc<dyn BattleStore>,
        characters: Arc<dyn CharacterRepository>,
        progression: ProgressionConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU64::new(0));

        let worker = PersistenceWorker {
            store,
            characters,
            progression,
            failures: failures.clone(),
            rx,
        };
        tokio::spawn(worker.run());

        Self { tx, failures }
    }

    fn send(&self, job: PersistenceJob) {
        if self.tx.send(job).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Persistence worker has stopped; job dropped");
        }
    }

    pub fn save_session(&self, session: SessionRecord) {
        self.send(PersistenceJob::Session(session));
    }

    pub fn append_turn(&self, turn: TurnRecord) {
        self.send(PersistenceJob::Turn(turn));
    }

    pub fn settle_outcome(&self, job: OutcomeJob) {
        self.send(PersistenceJob::Outcome(job));
    }

    /// Wait until everything enqueued so far has been written (or failed)
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        self.send(PersistenceJob::Flush(reply));
        let _ = done.await;
    }

    /// Number of jobs that failed since start
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct PersistenceWorker {
    store: Arc<dyn BattleStore>,
    characters: Arc<dyn CharacterRepository>,
    progression: ProgressionConfig,
    failures: Arc<AtomicU64>,
    rx: mpsc::UnboundedReceiver<PersistenceJob>,
}

impl PersistenceWorker {
    async fn run(mut self) {
        debug!("Persistence worker started");

        while let Some(job) = self.rx.recv().await {
            match job {
                PersistenceJob::Session(session) => {
                    if let Err(e) = self.store.save_session(&session).await {
                        self.failed();
                        warn!(battle_id = %session.id, error = %e, "Failed to save battle session");
                    }
                }
                PersistenceJob::Turn(turn) => {
                    if let Err(e) = self.store.append_turn(&turn).await {
                        self.failed();
                        warn!(
                            battle_id = %turn.battle_id,
                            turn_number = turn.turn_number,
                            error = %e,
                            "Failed to append turn record"
                        );
                    }
                }
                PersistenceJob::Outcome(outcome) => {
                    if let Err(e) = self.settle(&outcome).await {
                        self.failed();
                        warn!(
                            battle_id = %outcome.battle_id,
                            error = %e,
                            "Failed to settle battle outcome"
                        );
                    }
                }
                PersistenceJob::Flush(reply) => {
                    let _ = reply.send(());
                }
            }
        }

        debug!("Persistence worker stopped");
    }

    fn failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    async fn settle(&self, job: &OutcomeJob) -> Result<(), StoreError> {
        let community = job.community_id.as_str();
        let missing = |user: &str| {
            StoreError::Invalid(format!("no character for {} in {}", user, community))
        };

        let first = self
            .characters
            .find_character(community, &job.first)
            .await?
            .ok_or_else(|| missing(&job.first))?;
        let second = self
            .characters
            .find_character(community, &job.second)
            .await?
            .ok_or_else(|| missing(&job.second))?;

        let mut first_progress = first.progression;
        let mut second_progress = second.progression;
        let (first_reward, second_reward) = settle(
            &mut first_progress,
            &mut second_progress,
            job.first_outcome,
            &self.progression,
        );

        self.characters
            .record_outcome(community, &job.first, &first_progress)
            .await?;
        self.characters
            .record_outcome(community, &job.second, &second_progress)
            .await?;

        info!(
            battle_id = %job.battle_id,
            first = %job.first,
            first_xp = first_reward.xp_gained,
            first_elo = first_progress.elo,
            second = %job.second,
            second_xp = second_reward.xp_gained,
            second_elo = second_progress.elo,
            "Progression settled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, Character, CharacterClass, Race};
    use crate::combat::state::Battle;
    use crate::persistence::memory::{MemoryCharacters, MemoryStore};

    fn character(user: &str) -> Character {
        Character::new(
            "g1",
            user,
            CharacterClass::Warrior,
            Race::Human,
            AbilityScores::new(15, 14, 13, 12, 10, 8),
        )
    }

    fn spawn(store: Arc<MemoryStore>, characters: Arc<MemoryCharacters>) -> PersistenceHandle {
        PersistenceHandle::spawn(store, characters, ProgressionConfig::default())
    }

    #[tokio::test]
    async fn test_jobs_written_in_order() {
        let store = Arc::new(MemoryStore::new());
        let characters = Arc::new(MemoryCharacters::new());
        let handle = spawn(store.clone(), characters);

        let mut battle = Battle::new_pending("g1", "alice", "bob");
        handle.save_session(SessionRecord::from(&battle));
        battle.start(10, 10).unwrap();
        handle.save_session(SessionRecord::from(&battle));
        handle.flush().await;

        let saved = store.session(&battle.id).unwrap();
        assert_eq!(saved.status, crate::persistence::SessionStatus::Active);
        assert_eq!(handle.failures(), 0);
    }

    #[tokio::test]
    async fn test_failures_counted() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let handle = spawn(store.clone(), Arc::new(MemoryCharacters::new()));

        let battle = Battle::new_pending("g1", "alice", "bob");
        handle.save_session(SessionRecord::from(&battle));
        handle.save_session(SessionRecord::from(&battle));
        handle.flush().await;

        assert_eq!(handle.failures(), 2);
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_outcome_settles_both_sides() {
        let characters = Arc::new(MemoryCharacters::with_characters([
            character("alice"),
            character("bob"),
        ]));
        let handle = spawn(Arc::new(MemoryStore::new()), characters.clone());

        handle.settle_outcome(OutcomeJob {
            battle_id: "b1".to_string(),
            community_id: "g1".to_string(),
            first: "alice".to_string(),
            second: "bob".to_string(),
            first_outcome: Outcome::Win,
        });
        handle.flush().await;

        let alice = characters.get("g1", "alice").unwrap();
        let bob = characters.get("g1", "bob").unwrap();
        assert_eq!(alice.progression.wins, 1);
        assert_eq!(alice.progression.elo, 1016);
        assert_eq!(bob.progression.losses, 1);
        assert_eq!(bob.progression.elo, 984);
    }

    #[tokio::test]
    async fn test_outcome_missing_character() {
        let characters = Arc::new(MemoryCharacters::with_characters([character("alice")]));
        let handle = spawn(Arc::new(MemoryStore::new()), characters.clone());

        handle.settle_outcome(OutcomeJob {
            battle_id: "b1".to_string(),
            community_id: "g1".to_string(),
            first: "alice".to_string(),
            second: "ghost".to_string(),
            first_outcome: Outcome::Win,
        });
        handle.flush().await;

        assert_eq!(handle.failures(), 1);
        assert_eq!(characters.get("g1", "alice").unwrap().progression.wins, 0);
    }
}
