//! Progression rewards
//!
//! XP, levels and ELO settled after a played battle. Pure functions over
//! [`Progression`] records; the battle service's worker loads and saves the
//! records through the character repository.

use serde::{Deserialize, Serialize};

use crate::character::Progression;
use crate::config::{ProgressionConfig, XpConfig};

/// Result of a battle from one participant's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// ELO score: 1 for a win, 0.5 for a draw, 0 for a loss
    pub fn score(&self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }
}

/// What one participant gained from a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub outcome: Outcome,
    pub xp_gained: u64,
    pub leveled_up: bool,
    pub elo_change: i32,
}

/// XP awarded for an outcome
pub fn xp_reward(outcome: Outcome, xp: &XpConfig) -> u64 {
    let bonus = match outcome {
        Outcome::Win => xp.win_bonus,
        Outcome::Draw => xp.draw_bonus,
        Outcome::Loss => 0,
    };
    xp.base + bonus
}

/// Level reached with a total XP on a curve (1-based)
pub fn level_for_xp(total_xp: u64, curve: &[u64]) -> u32 {
    curve
        .iter()
        .take_while(|threshold| total_xp >= **threshold)
        .count()
        .max(1) as u32
}

/// Add XP, raising the level along the curve; returns true on level up
pub fn add_xp(progression: &mut Progression, amount: u64, curve: &[u64]) -> bool {
    let old_level = progression.level;
    progression.xp = progression.xp.saturating_add(amount);
    while (progression.level as usize) < curve.len()
        && progression.xp >= curve[progression.level as usize]
    {
        progression.level += 1;
    }
    progression.level > old_level
}

/// Standard ELO expectation of `mine` against `theirs`
pub fn expected_score(mine: i32, theirs: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((theirs - mine) as f64 / 400.0))
}

/// ELO delta, rounded half up
pub fn elo_change(mine: i32, theirs: i32, outcome: Outcome, k: i32) -> i32 {
    let delta = k as f64 * (outcome.score() - expected_score(mine, theirs));
    (delta + 0.5).floor() as i32
}

/// Settle both sides of a battle
///
/// ELO for both participants is computed from the ratings they had before the
/// battle. Ratings never drop below 0.
pub fn settle(
    first: &mut Progression,
    second: &mut Progression,
    first_outcome: Outcome,
    config: &ProgressionConfig,
) -> (Reward, Reward) {
    let second_outcome = match first_outcome {
        Outcome::Win => Outcome::Loss,
        Outcome::Loss => Outcome::Win,
        Outcome::Draw => Outcome::Draw,
    };
    let (first_elo, second_elo) = (first.elo, second.elo);

    let first_reward = apply(first, second_elo, first_outcome, config);
    let second_reward = apply(second, first_elo, second_outcome, config);
    (first_reward, second_reward)
}

fn apply(
    progression: &mut Progression,
    opponent_elo: i32,
    outcome: Outcome,
    config: &ProgressionConfig,
) -> Reward {
    let xp_gained = xp_reward(outcome, &config.xp);
    let leveled_up = add_xp(progression, xp_gained, &config.xp.level_curve);

    let change = elo_change(progression.elo, opponent_elo, outcome, config.elo.k);
    progression.elo = (progression.elo + change).max(0);

    match outcome {
        Outcome::Win => progression.wins += 1,
        Outcome::Loss => progression.losses += 1,
        Outcome::Draw => progression.draws += 1,
    }

    Reward {
        outcome,
        xp_gained,
        leveled_up,
        elo_change: change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_reward() {
        let xp = XpConfig::default();
        assert_eq!(xp_reward(Outcome::Win, &xp), 100);
        assert_eq!(xp_reward(Outcome::Draw, &xp), 75);
        assert_eq!(xp_reward(Outcome::Loss, &xp), 50);
    }

    #[test]
    fn test_level_curve() {
        let curve = XpConfig::default().level_curve;
        assert_eq!(level_for_xp(0, &curve), 1);
        assert_eq!(level_for_xp(299, &curve), 1);
        assert_eq!(level_for_xp(300, &curve), 2);
        assert_eq!(level_for_xp(2700, &curve), 4);
        assert_eq!(level_for_xp(1_000_000, &curve), 10);

        let mut progression = Progression::default();
        assert!(!add_xp(&mut progression, 250, &curve));
        assert!(add_xp(&mut progression, 700, &curve));
        assert_eq!(progression.level, 3);
        assert_eq!(progression.level, level_for_xp(progression.xp, &curve));
    }

    #[test]
    fn test_elo_equal_ratings() {
        assert!((expected_score(1000, 1000) - 0.5).abs() < 1e-9);
        assert_eq!(elo_change(1000, 1000, Outcome::Win, 32), 16);
        assert_eq!(elo_change(1000, 1000, Outcome::Loss, 32), -16);
        assert_eq!(elo_change(1000, 1000, Outcome::Draw, 32), 0);
    }

    #[test]
    fn test_settle_uses_pre_battle_ratings() {
        let config = ProgressionConfig::default();
        let mut winner = Progression::default();
        let mut loser = Progression::default();

        let (w, l) = settle(&mut winner, &mut loser, Outcome::Win, &config);
        assert_eq!(w.elo_change, 16);
        assert_eq!(l.elo_change, -16);
        assert_eq!(winner.elo, 1016);
        assert_eq!(loser.elo, 984);
        assert_eq!((winner.wins, loser.losses), (1, 1));
        assert_eq!(winner.xp, 100);
        assert_eq!(loser.xp, 50);
    }

    #[test]
    fn test_elo_floor() {
        let config = ProgressionConfig::default();
        let mut winner = Progression {
            elo: 5,
            ..Progression::default()
        };
        let mut loser = Progression {
            elo: 5,
            ..Progression::default()
        };
        settle(&mut winner, &mut loser, Outcome::Win, &config);
        assert_eq!(loser.elo, 0);
    }

    #[test]
    fn test_draw() {
        let config = ProgressionConfig::default();
        let mut a = Progression::default();
        let mut b = Progression::default();
        let (ra, rb) = settle(&mut a, &mut b, Outcome::Draw, &config);
        assert_eq!(ra.outcome, Outcome::Draw);
        assert_eq!(rb.outcome, Outcome::Draw);
        assert_eq!((a.draws, b.draws), (1, 1));
        assert_eq!(a.xp, 75);
    }
}
