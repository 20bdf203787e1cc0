//! Battle state machine
//!
//! One battle between a challenger and an opponent:
//! - Lifecycle `Pending -> Active -> Ended`
//! - Turn order and turn counter
//! - Battle-local HP for both sides
//! - The single temporary AC bonus granted by defending
//! - An append-only battle log
//!
//! Pure state and transitions; no locking, dice or I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};

pub type BattleId = String;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleStatus {
    Pending,
    Active,
    Ended,
}

impl std::fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BattleStatus::Pending => "pending",
            BattleStatus::Active => "active",
            BattleStatus::Ended => "ended",
        };
        write!(f, "{}", s)
    }
}

/// Why a battle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// A side reached 0 HP
    Completed,
    Forfeit,
    Timeout,
    Declined,
    /// Challenge was never accepted in time
    Expired,
    /// Forced shut, e.g. during recovery
    Aborted,
}

impl EndReason {
    /// Whether the battle was played to a result
    pub fn is_played(&self) -> bool {
        matches!(
            self,
            EndReason::Completed | EndReason::Forfeit | EndReason::Timeout
        )
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndReason::Completed => "completed",
            EndReason::Forfeit => "forfeit",
            EndReason::Timeout => "timeout",
            EndReason::Declined => "declined",
            EndReason::Expired => "expired",
            EndReason::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Temporary AC bonus held by one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempAcBonus {
    pub owner: String,
    pub amount: i32,
}

/// One battle log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// HP for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub hp: u32,
    pub max_hp: u32,
}

/// A single battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub community_id: String,
    pub challenger_id: String,
    pub opponent_id: String,
    pub status: BattleStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_turn: Option<String>,
    pub turn_number: u32,
    pub challenger: Vitals,
    pub opponent: Vitals,
    pub temp_ac_bonus: Option<TempAcBonus>,
    pub log: Vec<LogEntry>,
    pub winner: Option<String>,
    pub end_reason: Option<EndReason>,
    pub last_action_at: DateTime<Utc>,
}

impl Battle {
    /// Create a pending challenge
    pub fn new_pending(community_id: &str, challenger_id: &str, opponent_id: &str) -> Self {
        let now = Utc::now();
        let mut battle = Self {
            id: uuid::Uuid::new_v4().to_string(),
            community_id: community_id.to_string(),
            challenger_id: challenger_id.to_string(),
            opponent_id: opponent_id.to_string(),
            status: BattleStatus::Pending,
            created_at: now,
            started_at: None,
            ended_at: None,
            current_turn: None,
            turn_number: 0,
            challenger: Vitals::default(),
            opponent: Vitals::default(),
            temp_ac_bonus: None,
            log: Vec::new(),
            winner: None,
            end_reason: None,
            last_action_at: now,
        };
        battle.add_log(format!("{} challenges {}", challenger_id, opponent_id));
        battle
    }

    pub fn is_pending(&self) -> bool {
        self.status == BattleStatus::Pending
    }

    pub fn is_active(&self) -> bool {
        self.status == BattleStatus::Active
    }

    pub fn is_ended(&self) -> bool {
        self.status == BattleStatus::Ended
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.challenger_id == user_id || self.opponent_id == user_id
    }

    /// The other participant
    pub fn opponent_of(&self, user_id: &str) -> Option<&str> {
        if user_id == self.challenger_id {
            Some(self.opponent_id.as_str())
        } else if user_id == self.opponent_id {
            Some(self.challenger_id.as_str())
        } else {
            None
        }
    }

    pub fn is_turn_of(&self, user_id: &str) -> bool {
        self.current_turn.as_deref() == Some(user_id)
    }

    pub fn vitals(&self, user_id: &str) -> Option<&Vitals> {
        if user_id == self.challenger_id {
            Some(&self.challenger)
        } else if user_id == self.opponent_id {
            Some(&self.opponent)
        } else {
            None
        }
    }

    fn vitals_mut(&mut self, user_id: &str) -> Result<&mut Vitals> {
        if user_id == self.challenger_id {
            Ok(&mut self.challenger)
        } else if user_id == self.opponent_id {
            Ok(&mut self.opponent)
        } else {
            Err(BattleError::permission(format!(
                "{} is not part of battle {}",
                user_id, self.id
            )))
        }
    }

    /// Current HP of a participant (0 for strangers)
    pub fn hp(&self, user_id: &str) -> u32 {
        self.vitals(user_id).map_or(0, |v| v.hp)
    }

    pub fn add_log(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Mark activity for timeout detection
    pub fn touch(&mut self) {
        self.last_action_at = Utc::now();
    }

    /// Pending -> Active; the challenger moves first
    pub fn start(&mut self, challenger_hp: u32, opponent_hp: u32) -> Result<()> {
        if !self.is_pending() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not pending",
                self.id, self.status
            )));
        }

        let now = Utc::now();
        self.status = BattleStatus::Active;
        self.started_at = Some(now);
        self.challenger = Vitals {
            hp: challenger_hp,
            max_hp: challenger_hp,
        };
        self.opponent = Vitals {
            hp: opponent_hp,
            max_hp: opponent_hp,
        };
        self.turn_number = 1;
        self.current_turn = Some(self.challenger_id.clone());
        self.last_action_at = now;
        self.add_log(format!(
            "Battle started: {} ({} HP) vs {} ({} HP)",
            self.challenger_id, challenger_hp, self.opponent_id, opponent_hp
        ));
        Ok(())
    }

    /// Pending -> Ended with no winner
    pub fn decline(&mut self, by: &str) -> Result<()> {
        if !self.is_pending() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not pending",
                self.id, self.status
            )));
        }
        self.add_log(format!("{} declined the challenge", by));
        self.finish(None, EndReason::Declined);
        Ok(())
    }

    /// Pending or Active -> Ended
    pub fn end(&mut self, winner: Option<&str>, reason: EndReason) -> Result<()> {
        if self.is_ended() {
            return Err(BattleError::state(format!("battle {} already ended", self.id)));
        }
        if let Some(winner) = winner {
            if !self.is_participant(winner) {
                return Err(BattleError::validation(format!(
                    "winner {} is not part of battle {}",
                    winner, self.id
                )));
            }
        }

        match winner {
            Some(w) => self.add_log(format!("Battle over ({}): {} wins", reason, w)),
            None => self.add_log(format!("Battle over ({}): no winner", reason)),
        }
        self.finish(winner.map(str::to_string), reason);
        Ok(())
    }

    /// Forced end without a winner
    pub fn abort(&mut self, reason: EndReason) -> Result<()> {
        self.end(None, reason)
    }

    fn finish(&mut self, winner: Option<String>, reason: EndReason) {
        let now = Utc::now();
        self.status = BattleStatus::Ended;
        self.winner = winner;
        self.end_reason = Some(reason);
        self.ended_at = Some(now);
        self.current_turn = None;
        self.temp_ac_bonus = None;
        self.last_action_at = now;
    }

    /// Pass the turn to the other participant
    ///
    /// The temporary AC bonus lasts through the opponent's turn and is cleared
    /// as soon as control returns to its owner.
    pub fn advance_turn(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not active",
                self.id, self.status
            )));
        }

        let next = match self.current_turn.as_deref() {
            Some(current) if current == self.challenger_id => self.opponent_id.clone(),
            _ => self.challenger_id.clone(),
        };

        if self
            .temp_ac_bonus
            .as_ref()
            .is_some_and(|bonus| bonus.owner == next)
        {
            self.temp_ac_bonus = None;
        }

        self.current_turn = Some(next);
        self.turn_number += 1;
        Ok(())
    }

    /// Reduce HP, clamped at 0; returns the damage actually taken
    pub fn apply_damage(&mut self, user_id: &str, amount: u32) -> Result<u32> {
        let vitals = self.vitals_mut(user_id)?;
        let taken = amount.min(vitals.hp);
        vitals.hp -= taken;
        Ok(taken)
    }

    /// Restore HP, clamped at max; returns the healing actually done
    pub fn heal(&mut self, user_id: &str, amount: u32) -> Result<u32> {
        let vitals = self.vitals_mut(user_id)?;
        let healed = amount.min(vitals.max_hp - vitals.hp);
        vitals.hp += healed;
        Ok(healed)
    }

    /// Give the temporary AC bonus to a participant, replacing any other holder
    pub fn grant_temp_ac_bonus(&mut self, user_id: &str, amount: i32) -> Result<()> {
        if !self.is_participant(user_id) {
            return Err(BattleError::permission(format!(
                "{} is not part of battle {}",
                user_id, self.id
            )));
        }
        self.temp_ac_bonus = Some(TempAcBonus {
            owner: user_id.to_string(),
            amount,
        });
        Ok(())
    }

    /// Temporary AC bonus currently held by a participant
    pub fn effective_ac_bonus(&self, user_id: &str) -> i32 {
        self.temp_ac_bonus
            .as_ref()
            .filter(|bonus| bonus.owner == user_id)
            .map_or(0, |bonus| bonus.amount)
    }
}
