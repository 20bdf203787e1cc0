//! Battle counters
//!
//! Lock-free tallies fed by the service as challenges, turns and battles
//! resolve. Gauges for live battles are read from the registry when a snapshot
//! is taken.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::combat::state::EndReason;
use crate::persistence::TurnAction;

#[derive(Debug, Default)]
pub struct BattleMetrics {
    challenges_created: AtomicU64,
    challenges_accepted: AtomicU64,
    challenges_declined: AtomicU64,
    challenges_expired: AtomicU64,
    battles_completed: AtomicU64,
    battles_forfeit: AtomicU64,
    battles_timeout: AtomicU64,
    battles_aborted: AtomicU64,
    turns_played: AtomicU64,
    attacks: AtomicU64,
    defends: AtomicU64,
    spells: AtomicU64,
    critical_hits: AtomicU64,
}

/// Point-in-time copy of the counters
///
/// Fields are read one by one, so a snapshot taken under load may mix values
/// from either side of a concurrent update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub challenges_created: u64,
    pub challenges_accepted: u64,
    pub challenges_declined: u64,
    pub challenges_expired: u64,
    pub battles_completed: u64,
    pub battles_forfeit: u64,
    pub battles_timeout: u64,
    pub battles_aborted: u64,
    pub turns_played: u64,
    pub attacks: u64,
    pub defends: u64,
    pub spells: u64,
    pub critical_hits: u64,
    pub active_battles: u64,
    pub pending_challenges: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl BattleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_challenge_created(&self) {
        bump(&self.challenges_created);
    }

    pub fn record_challenge_accepted(&self) {
        bump(&self.challenges_accepted);
    }

    /// Count a battle or challenge by how it ended
    pub fn record_ended(&self, reason: EndReason) {
        bump(match reason {
            EndReason::Completed => &self.battles_completed,
            EndReason::Forfeit => &self.battles_forfeit,
            EndReason::Timeout => &self.battles_timeout,
            EndReason::Declined => &self.challenges_declined,
            EndReason::Expired => &self.challenges_expired,
            EndReason::Aborted => &self.battles_aborted,
        });
    }

    /// Count one resolved turn action
    pub fn record_turn(&self, action: TurnAction, critical: bool) {
        bump(&self.turns_played);
        match action {
            TurnAction::Attack => bump(&self.attacks),
            TurnAction::Defend => bump(&self.defends),
            TurnAction::Spell => bump(&self.spells),
            _ => {}
        }
        if critical {
            bump(&self.critical_hits);
        }
    }

    pub fn snapshot(&self, active_battles: u64, pending_challenges: u64) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            challenges_created: load(&self.challenges_created),
            challenges_accepted: load(&self.challenges_accepted),
            challenges_declined: load(&self.challenges_declined),
            challenges_expired: load(&self.challenges_expired),
            battles_completed: load(&self.battles_completed),
            battles_forfeit: load(&self.battles_forfeit),
            battles_timeout: load(&self.battles_timeout),
            battles_aborted: load(&self.battles_aborted),
            turns_played: load(&self.turns_played),
            attacks: load(&self.attacks),
            defends: load(&self.defends),
            spells: load(&self.spells),
            critical_hits: load(&self.critical_hits),
            active_battles,
            pending_challenges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_reason_and_action() {
        let metrics = BattleMetrics::new();
        metrics.record_challenge_created();
        metrics.record_challenge_created();
        metrics.record_challenge_accepted();
        metrics.record_ended(EndReason::Declined);
        metrics.record_ended(EndReason::Completed);

        metrics.record_turn(TurnAction::Attack, true);
        metrics.record_turn(TurnAction::Spell, false);
        metrics.record_turn(TurnAction::Special, false);

        let stats = metrics.snapshot(1, 2);
        assert_eq!(stats.challenges_created, 2);
        assert_eq!(stats.challenges_accepted, 1);
        assert_eq!(stats.challenges_declined, 1);
        assert_eq!(stats.battles_completed, 1);
        assert_eq!(stats.turns_played, 3);
        assert_eq!(stats.attacks, 1);
        assert_eq!(stats.spells, 1);
        assert_eq!(stats.defends, 0);
        assert_eq!(stats.critical_hits, 1);
        assert_eq!((stats.active_battles, stats.pending_challenges), (1, 2));
    }
}
