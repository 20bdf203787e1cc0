//! Battle events
//!
//! Every battle transition publishes one [`BattleEvent`]. Publishing logs the
//! event as a single structured tracing record and fans it out on a tokio
//! broadcast channel; with no subscribers the send is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, trace};

use crate::combat::state::EndReason;
use crate::persistence::TurnAction;

/// Domain event emitted by the battle service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BattleEvent {
    ChallengeCreated {
        battle_id: String,
        community_id: String,
        challenger_id: String,
        opponent_id: String,
    },
    ChallengeAccepted {
        battle_id: String,
        community_id: String,
        challenger_hp: u32,
        opponent_hp: u32,
    },
    ChallengeDeclined {
        battle_id: String,
        declined_by: String,
    },
    ChallengeExpired {
        battle_id: String,
        community_id: String,
    },
    TurnResolved {
        battle_id: String,
        turn_number: u32,
        actor_id: String,
        action: TurnAction,
        hit: bool,
        crit: bool,
        damage: u32,
        healing: u32,
    },
    TurnTimedOut {
        battle_id: String,
        user_id: String,
    },
    Completed {
        battle_id: String,
        community_id: String,
        winner: Option<String>,
        reason: EndReason,
        turns: u32,
    },
    Aborted {
        battle_id: String,
        reason: String,
    },
}

impl BattleEvent {
    /// Dotted event name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            BattleEvent::ChallengeCreated { .. } => "battle.challenge.created",
            BattleEvent::ChallengeAccepted { .. } => "battle.challenge.accepted",
            BattleEvent::ChallengeDeclined { .. } => "battle.challenge.declined",
            BattleEvent::ChallengeExpired { .. } => "battle.challenge.expired",
            BattleEvent::TurnResolved { .. } => "battle.turn.resolved",
            BattleEvent::TurnTimedOut { .. } => "battle.timeout",
            BattleEvent::Completed { .. } => "battle.completed",
            BattleEvent::Aborted { .. } => "battle.aborted",
        }
    }

    pub fn battle_id(&self) -> &str {
        match self {
            BattleEvent::ChallengeCreated { battle_id, .. }
            | BattleEvent::ChallengeAccepted { battle_id, .. }
            | BattleEvent::ChallengeDeclined { battle_id, .. }
            | BattleEvent::ChallengeExpired { battle_id, .. }
            | BattleEvent::TurnResolved { battle_id, .. }
            | BattleEvent::TurnTimedOut { battle_id, .. }
            | BattleEvent::Completed { battle_id, .. }
            | BattleEvent::Aborted { battle_id, .. } => battle_id,
        }
    }

    /// Emit as one structured log record
    pub fn log(&self) {
        let event = self.name();
        match self {
            BattleEvent::ChallengeCreated {
                battle_id,
                community_id,
                challenger_id,
                opponent_id,
            } => info!(event, %battle_id, %community_id, %challenger_id, %opponent_id),
            BattleEvent::ChallengeAccepted {
                battle_id,
                community_id,
                challenger_hp,
                opponent_hp,
            } => info!(event, %battle_id, %community_id, challenger_hp, opponent_hp),
            BattleEvent::ChallengeDeclined {
                battle_id,
                declined_by,
            } => info!(event, %battle_id, %declined_by),
            BattleEvent::ChallengeExpired {
                battle_id,
                community_id,
            } => info!(event, %battle_id, %community_id),
            BattleEvent::TurnResolved {
                battle_id,
                turn_number,
                actor_id,
                action,
                hit,
                crit,
                damage,
                healing,
            } => info!(
                event,
                %battle_id,
                turn_number,
                %actor_id,
                action = %action,
                hit,
                crit,
                damage,
                healing
            ),
            BattleEvent::TurnTimedOut { battle_id, user_id } => {
                info!(event, %battle_id, %user_id)
            }
            BattleEvent::Completed {
                battle_id,
                community_id,
                winner,
                reason,
                turns,
            } => info!(
                event,
                %battle_id,
                %community_id,
                winner = winner.as_deref().unwrap_or("none"),
                reason = %reason,
                turns
            ),
            BattleEvent::Aborted { battle_id, reason } => info!(event, %battle_id, %reason),
        }
    }
}

/// Fan-out of battle events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BattleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Log and broadcast an event
    pub fn publish(&self, event: BattleEvent) {
        event.log();
        if self.tx.send(event).is_err() {
            // No subscribers - this is normal
            trace!("No subscribers for battle events");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BattleEvent> {
        self.tx.subscribe()
    }
}
