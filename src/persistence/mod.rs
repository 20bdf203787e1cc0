//! Persistence collaborator
//!
//! Battle sessions, turn records and character progression are saved through
//! two async traits. The battle service never awaits a store directly: jobs go
//! to a background [`writer`] so a slow or failing store cannot block or undo
//! an in-memory transition.

pub mod memory;
pub mod writer;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::character::{Character, Progression};
use crate::combat::state::{Battle, BattleStatus, TempAcBonus, Vitals};

pub use memory::{MemoryCharacters, MemoryStore};
pub use writer::{OutcomeJob, PersistenceHandle, PersistenceJob};

/// Errors raised by store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Active)
    }

    /// Map an in-memory battle onto the persisted status
    pub fn of(battle: &Battle) -> Self {
        match battle.status {
            BattleStatus::Pending => SessionStatus::Pending,
            BattleStatus::Active => SessionStatus::Active,
            BattleStatus::Ended => match battle.end_reason {
                Some(reason) if reason.is_played() => SessionStatus::Completed,
                _ => SessionStatus::Aborted,
            },
        }
    }
}

impl FromStr for SessionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SessionStatus::Pending),
            "ACTIVE" => Ok(SessionStatus::Active),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "ABORTED" => Ok(SessionStatus::Aborted),
            other => Err(StoreError::Invalid(format!("unknown session status: {}", other))),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a battle as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub community_id: String,
    pub challenger_id: String,
    pub opponent_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_turn: Option<String>,
    pub challenger_hp: u32,
    pub challenger_max_hp: u32,
    pub opponent_hp: u32,
    pub opponent_max_hp: u32,
    pub winner: Option<String>,
    pub turn_number: u32,
    pub temp_ac_bonus: i32,
    pub temp_ac_owner: Option<String>,
    pub last_action_at: Option<DateTime<Utc>>,
}

impl From<&Battle> for SessionRecord {
    fn from(battle: &Battle) -> Self {
        Self {
            id: battle.id.clone(),
            community_id: battle.community_id.clone(),
            challenger_id: battle.challenger_id.clone(),
            opponent_id: battle.opponent_id.clone(),
            status: SessionStatus::of(battle),
            created_at: battle.created_at,
            started_at: battle.started_at,
            ended_at: battle.ended_at,
            current_turn: battle.current_turn.clone(),
            challenger_hp: battle.challenger.hp,
            challenger_max_hp: battle.challenger.max_hp,
            opponent_hp: battle.opponent.hp,
            opponent_max_hp: battle.opponent.max_hp,
            winner: battle.winner.clone(),
            turn_number: battle.turn_number,
            temp_ac_bonus: battle.temp_ac_bonus.as_ref().map_or(0, |b| b.amount),
            temp_ac_owner: battle.temp_ac_bonus.as_ref().map(|b| b.owner.clone()),
            last_action_at: Some(battle.last_action_at),
        }
    }
}

impl SessionRecord {
    /// Rebuild an in-memory battle from a live session
    pub fn to_battle(&self) -> Result<Battle, StoreError> {
        let status = match self.status {
            SessionStatus::Pending => BattleStatus::Pending,
            SessionStatus::Active => BattleStatus::Active,
            other => {
                return Err(StoreError::Invalid(format!(
                    "session {} is {}, not live",
                    self.id, other
                )))
            }
        };
        if status == BattleStatus::Active
            && !self
                .current_turn
                .as_deref()
                .is_some_and(|t| t == self.challenger_id || t == self.opponent_id)
        {
            return Err(StoreError::Invalid(format!(
                "session {} has no valid current turn",
                self.id
            )));
        }

        let temp_ac_bonus = self.temp_ac_owner.as_ref().map(|owner| TempAcBonus {
            owner: owner.clone(),
            amount: self.temp_ac_bonus,
        });

        let mut battle = Battle {
            id: self.id.clone(),
            community_id: self.community_id.clone(),
            challenger_id: self.challenger_id.clone(),
            opponent_id: self.opponent_id.clone(),
            status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: None,
            current_turn: self.current_turn.clone(),
            turn_number: self.turn_number,
            challenger: Vitals {
                hp: self.challenger_hp.min(self.challenger_max_hp),
                max_hp: self.challenger_max_hp,
            },
            opponent: Vitals {
                hp: self.opponent_hp.min(self.opponent_max_hp),
                max_hp: self.opponent_max_hp,
            },
            temp_ac_bonus,
            log: Vec::new(),
            winner: None,
            end_reason: None,
            last_action_at: self.last_action_at.unwrap_or(self.created_at),
        };
        battle.add_log("Battle restored after restart");
        Ok(battle)
    }
}

/// Kind of action a turn record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnAction {
    Attack,
    Defend,
    Spell,
    /// Turn consumed by a status effect
    Special,
    Forfeit,
    Timeout,
}

impl TurnAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnAction::Attack => "ATTACK",
            TurnAction::Defend => "DEFEND",
            TurnAction::Spell => "SPELL",
            TurnAction::Special => "SPECIAL",
            TurnAction::Forfeit => "FORFEIT",
            TurnAction::Timeout => "TIMEOUT",
        }
    }
}

impl FromStr for TurnAction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ATTACK" => Ok(TurnAction::Attack),
            "DEFEND" => Ok(TurnAction::Defend),
            "SPELL" => Ok(TurnAction::Spell),
            "SPECIAL" => Ok(TurnAction::Special),
            "FORFEIT" => Ok(TurnAction::Forfeit),
            "TIMEOUT" => Ok(TurnAction::Timeout),
            other => Err(StoreError::Invalid(format!("unknown turn action: {}", other))),
        }
    }
}

impl std::fmt::Display for TurnAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved action, written once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub battle_id: String,
    pub community_id: String,
    pub turn_number: u32,
    pub actor_id: String,
    pub action: TurnAction,
    pub target_id: Option<String>,
    pub ability_key: Option<String>,
    pub damage: u32,
    pub healing: u32,
    pub crit: bool,
    pub hit: bool,
    pub raw_roll: Option<u32>,
    pub total_roll: Option<i32>,
    pub defender_ac: Option<i32>,
    pub actor_hp_after: u32,
    pub target_hp_after: u32,
    /// JSON array of the status effects this action applied
    pub status_effects_applied: String,
    pub created_at: DateTime<Utc>,
}

impl TurnRecord {
    /// Record skeleton for an action by `actor_id` in `battle`
    pub fn new(battle: &Battle, turn_number: u32, actor_id: &str, action: TurnAction) -> Self {
        let target_id = battle.opponent_of(actor_id).map(str::to_string);
        Self {
            battle_id: battle.id.clone(),
            community_id: battle.community_id.clone(),
            turn_number,
            actor_id: actor_id.to_string(),
            action,
            actor_hp_after: battle.hp(actor_id),
            target_hp_after: target_id.as_deref().map_or(0, |t| battle.hp(t)),
            target_id,
            ability_key: None,
            damage: 0,
            healing: 0,
            crit: false,
            hit: false,
            raw_roll: None,
            total_roll: None,
            defender_ac: None,
            status_effects_applied: "[]".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Saves and loads battle sessions and turn history
#[async_trait]
pub trait BattleStore: Send + Sync {
    /// Insert or replace the session snapshot
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StoreError>;

    /// Every Pending or Active session
    async fn load_live_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    async fn append_turn(&self, turn: &TurnRecord) -> Result<(), StoreError>;
}

/// Character lookup and progression updates
#[async_trait]
pub trait CharacterRepository: Send + Sync {
    async fn find_character(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<Character>, StoreError>;

    async fn record_outcome(
        &self,
        community_id: &str,
        user_id: &str,
        progression: &Progression,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::state::EndReason;

    #[test]
    fn test_status_mapping() {
        let mut battle = Battle::new_pending("g1", "alice", "bob");
        assert_eq!(SessionStatus::of(&battle), SessionStatus::Pending);

        battle.start(10, 10).unwrap();
        assert_eq!(SessionStatus::of(&battle), SessionStatus::Active);

        battle.end(Some("alice"), EndReason::Forfeit).unwrap();
        assert_eq!(SessionStatus::of(&battle), SessionStatus::Completed);

        let mut declined = Battle::new_pending("g1", "alice", "bob");
        declined.decline("bob").unwrap();
        assert_eq!(SessionStatus::of(&declined), SessionStatus::Aborted);
    }

    #[test]
    fn test_session_restore() {
        let mut battle = Battle::new_pending("g1", "alice", "bob");
        battle.start(12, 9).unwrap();
        battle.apply_damage("bob", 4).unwrap();
        battle.grant_temp_ac_bonus("alice", 2).unwrap();
        battle.advance_turn().unwrap();

        let record = SessionRecord::from(&battle);
        assert_eq!(record.temp_ac_owner.as_deref(), Some("alice"));

        let restored = record.to_battle().unwrap();
        assert_eq!(restored.id, battle.id);
        assert_eq!(restored.current_turn.as_deref(), Some("bob"));
        assert_eq!(restored.hp("bob"), 5);
        assert_eq!(restored.effective_ac_bonus("alice"), 2);
        assert_eq!(restored.turn_number, 2);
    }

    #[test]
    fn test_restore_rejects_ended() {
        let mut battle = Battle::new_pending("g1", "alice", "bob");
        battle.decline("bob").unwrap();
        assert!(SessionRecord::from(&battle).to_battle().is_err());
    }

    #[test]
    fn test_action_names() {
        for action in [
            TurnAction::Attack,
            TurnAction::Defend,
            TurnAction::Spell,
            TurnAction::Special,
            TurnAction::Forfeit,
            TurnAction::Timeout,
        ] {
            assert_eq!(action.as_str().parse::<TurnAction>().unwrap(), action);
        }
        assert!("DANCE".parse::<TurnAction>().is_err());
    }
}
