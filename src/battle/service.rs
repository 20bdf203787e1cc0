//! Battle orchestration service
//!
//! Owns every live battle and serializes all mutations of one battle behind
//! its slot mutex. Character lookups are the only awaits and always happen
//! before a slot is locked. Each transition logs, publishes a
//! [`BattleEvent`] and enqueues persistence work without waiting for it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::metrics::{BattleMetrics, MetricsSnapshot};
use super::outcome::{ActionOutcome, AppliedEffect};
use super::registry::{BattleSlot, Combatant, Registry};
use super::resources::{SlotPool, SpellResources};
use crate::character::{self, Character, LearnedAbility};
use crate::combat::dice::{DiceRoll, DiceSource};
use crate::combat::effects::{StatusEffect, TurnStartReport};
use crate::combat::parser::EffectStat;
use crate::combat::resolution::{resolve_strike, CritRule, Defense, Offense, Strike};
use crate::combat::state::{Battle, EndReason};
use crate::config::BattleConfig;
use crate::error::{BattleError, Result};
use crate::events::{BattleEvent, EventBus};
use crate::persistence::{
    BattleStore, CharacterRepository, OutcomeJob, PersistenceHandle, SessionRecord,
    SessionStatus, TurnAction, TurnRecord,
};
use crate::progression::Outcome;

/// Tag marking a spell that heals its caster instead of attacking
const HEAL_TAG: &str = "HEAL";

#[derive(Debug, Clone, Copy)]
enum Action<'a> {
    Attack,
    Defend,
    Spell(&'a str),
}

/// What startup recovery did with the stored live sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub aborted: usize,
}

/// Concurrency-safe battle orchestration
pub struct BattleService {
    config: BattleConfig,
    characters: Arc<dyn CharacterRepository>,
    dice: Arc<dyn DiceSource>,
    registry: Registry,
    resources: SpellResources,
    metrics: BattleMetrics,
    events: EventBus,
    persistence: PersistenceHandle,
    crit: CritRule,
    weapon_die: DiceRoll,
    spell_die: DiceRoll,
}

impl BattleService {
    /// Build a service and start its persistence worker
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: BattleConfig,
        characters: Arc<dyn CharacterRepository>,
        store: Arc<dyn BattleStore>,
        dice: Arc<dyn DiceSource>,
    ) -> Result<Self> {
        config.validate()?;
        let persistence =
            PersistenceHandle::spawn(store, characters.clone(), config.progression.clone());

        Ok(Self {
            crit: CritRule::from(&config.combat.crit),
            weapon_die: config.weapon_die(),
            spell_die: config.spell_die(),
            resources: SpellResources::new(&config.spells),
            config,
            characters,
            dice,
            registry: Registry::new(),
            metrics: BattleMetrics::new(),
            events: EventBus::new(),
            persistence,
        })
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BattleEvent> {
        self.events.subscribe()
    }

    /// Wait for all enqueued persistence work
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    /// Persistence jobs that failed since start
    pub fn persistence_failures(&self) -> u64 {
        self.persistence.failures()
    }

    /// Counters since start plus the current live battle gauges
    pub fn stats(&self) -> MetricsSnapshot {
        let (mut active, mut pending) = (0, 0);
        for slot in self.registry.slots() {
            let guard = slot.lock();
            if guard.battle.is_active() {
                active += 1;
            } else if guard.battle.is_pending() {
                pending += 1;
            }
        }
        self.metrics.snapshot(active, pending)
    }

    // ---- Challenges ----

    /// Create a pending challenge
    pub async fn create_challenge(
        &self,
        community_id: &str,
        challenger_id: &str,
        opponent_id: &str,
    ) -> Result<Battle> {
        if challenger_id == opponent_id {
            return Err(BattleError::validation("cannot challenge yourself"));
        }

        self.clean_up_expired_challenges();

        for user in [challenger_id, opponent_id] {
            let remaining = self.remaining_cooldown(community_id, user);
            if !remaining.is_zero() {
                return Err(BattleError::state(format!(
                    "{} is on cooldown for {}s",
                    user,
                    remaining.as_secs().max(1)
                )));
            }
        }

        self.load_character(community_id, challenger_id).await?;
        self.load_character(community_id, opponent_id).await?;

        let battle = Battle::new_pending(community_id, challenger_id, opponent_id);
        let slot = self.registry.insert(
            BattleSlot::new(battle),
            Some(self.config.combat.max_concurrent_per_community),
        )?;

        self.metrics.record_challenge_created();
        let guard = slot.lock();
        let snapshot = guard.battle.clone();
        self.record(&snapshot, None);
        self.events.publish(BattleEvent::ChallengeCreated {
            battle_id: snapshot.id.clone(),
            community_id: snapshot.community_id.clone(),
            challenger_id: snapshot.challenger_id.clone(),
            opponent_id: snapshot.opponent_id.clone(),
        });
        drop(guard);

        Ok(snapshot)
    }

    /// Opponent accepts; both characters are snapshotted and the battle starts
    pub async fn accept_challenge(&self, battle_id: &str, accepter_id: &str) -> Result<Battle> {
        let slot = self.registry.require(battle_id)?;

        let (community_id, challenger_id, opponent_id) = {
            let mut guard = slot.lock();
            if self.is_expired(&guard.battle) {
                guard.battle.abort(EndReason::Expired)?;
                guard.battle.add_log("Challenge expired before it was accepted");
                let snapshot = guard.battle.clone();
                self.record(&snapshot, None);
                drop(guard);
                self.finish(&snapshot);
                return Err(BattleError::state("this challenge has expired"));
            }
            let battle = &guard.battle;
            if !battle.is_pending() {
                return Err(BattleError::state(format!(
                    "battle {} is {}, not pending",
                    battle.id, battle.status
                )));
            }
            if battle.opponent_id != accepter_id {
                return Err(BattleError::permission("only the challenged user may accept"));
            }
            (
                battle.community_id.clone(),
                battle.challenger_id.clone(),
                battle.opponent_id.clone(),
            )
        };

        let challenger = Combatant::new(
            self.load_character(&community_id, &challenger_id).await?,
            &self.config,
        );
        let opponent = Combatant::new(
            self.load_character(&community_id, &opponent_id).await?,
            &self.config,
        );

        let mut guard = slot.lock();
        // The slot was unlocked during the lookups
        guard.battle.start(challenger.max_hp(), opponent.max_hp())?;
        guard.set_combatant(challenger);
        guard.set_combatant(opponent);
        self.metrics.record_challenge_accepted();

        let snapshot = guard.battle.clone();
        self.record(&snapshot, None);
        self.events.publish(BattleEvent::ChallengeAccepted {
            battle_id: snapshot.id.clone(),
            community_id: snapshot.community_id.clone(),
            challenger_hp: snapshot.challenger.hp,
            opponent_hp: snapshot.opponent.hp,
        });
        drop(guard);

        Ok(snapshot)
    }

    /// Either participant withdraws a pending challenge
    pub fn decline_challenge(&self, battle_id: &str, user_id: &str) -> Result<Battle> {
        let slot = self.registry.require(battle_id)?;
        let mut guard = slot.lock();
        if !guard.battle.is_participant(user_id) {
            return Err(BattleError::permission(format!(
                "{} is not part of battle {}",
                user_id, battle_id
            )));
        }
        guard.battle.decline(user_id)?;
        guard.effects.clear_battle();

        let snapshot = guard.battle.clone();
        self.record(&snapshot, None);
        self.events.publish(BattleEvent::ChallengeDeclined {
            battle_id: snapshot.id.clone(),
            declined_by: user_id.to_string(),
        });
        drop(guard);

        self.finish(&snapshot);
        Ok(snapshot)
    }

    // ---- Turn actions ----

    pub fn perform_attack(&self, battle_id: &str, actor_id: &str) -> Result<ActionOutcome> {
        self.act(battle_id, actor_id, Action::Attack)
    }

    pub fn perform_defend(&self, battle_id: &str, actor_id: &str) -> Result<ActionOutcome> {
        self.act(battle_id, actor_id, Action::Defend)
    }

    pub fn perform_spell(
        &self,
        battle_id: &str,
        actor_id: &str,
        ability_key: &str,
    ) -> Result<ActionOutcome> {
        self.act(battle_id, actor_id, Action::Spell(ability_key))
    }

    /// A participant gives up; the other side wins
    pub fn forfeit(&self, battle_id: &str, user_id: &str) -> Result<Battle> {
        let slot = self.registry.require(battle_id)?;
        let mut guard = slot.lock();
        let battle = &mut guard.battle;
        if !battle.is_active() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not active",
                battle.id, battle.status
            )));
        }
        let winner = battle
            .opponent_of(user_id)
            .map(str::to_string)
            .ok_or_else(|| {
                BattleError::permission(format!("{} is not part of battle {}", user_id, battle.id))
            })?;

        let turn_number = battle.turn_number;
        battle.add_log(format!("{} forfeits the battle", user_id));
        battle.end(Some(&winner), EndReason::Forfeit)?;
        guard.effects.clear_battle();

        let snapshot = guard.battle.clone();
        let turn = TurnRecord::new(&snapshot, turn_number, user_id, TurnAction::Forfeit);
        self.record(&snapshot, Some(turn));
        drop(guard);

        self.finish(&snapshot);
        Ok(snapshot)
    }

    fn act(&self, battle_id: &str, actor_id: &str, action: Action<'_>) -> Result<ActionOutcome> {
        let slot = self.registry.require(battle_id)?;
        let mut guard = slot.lock();
        let state = &mut *guard;

        // Reject before anything mutates
        let battle = &state.battle;
        if !battle.is_active() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not active",
                battle.id, battle.status
            )));
        }
        let target_id = battle
            .opponent_of(actor_id)
            .map(str::to_string)
            .ok_or_else(|| {
                BattleError::permission(format!("{} is not part of battle {}", actor_id, battle.id))
            })?;
        if !battle.is_turn_of(actor_id) {
            return Err(BattleError::permission(format!("it is not {}'s turn", actor_id)));
        }
        state.combatant(&target_id)?;
        let spell = match action {
            Action::Spell(key) => {
                let caster = &state.combatant(actor_id)?.character;
                let spell = caster.spell(key).cloned().ok_or_else(|| {
                    BattleError::not_found(format!("spell {} for {}", key, actor_id))
                })?;
                self.resources.check(caster, &spell)?;
                Some(spell)
            }
            _ => {
                state.combatant(actor_id)?;
                None
            }
        };

        let turn_action = match action {
            Action::Attack => TurnAction::Attack,
            Action::Defend => TurnAction::Defend,
            Action::Spell(_) => TurnAction::Spell,
        };
        let mut outcome = ActionOutcome::new(&state.battle, actor_id, turn_action);
        outcome.ability_key = spell.as_ref().map(|s| s.key.clone());

        let start = state.effects.start_turn(actor_id);
        self.apply_turn_start(state, actor_id, &start, &mut outcome)?;

        if state.battle.hp(actor_id) == 0 {
            outcome.action = TurnAction::Special;
            state.battle.add_log(format!("{} succumbs before acting", actor_id));
            state.battle.end(Some(&target_id), EndReason::Completed)?;
        } else if start.stunned {
            outcome.action = TurnAction::Special;
            outcome.stunned = true;
            state.battle.add_log(format!("{} is stunned and cannot act", actor_id));
            self.end_turn(state, actor_id, &target_id, &mut outcome)?;
        } else {
            match (action, &spell) {
                (Action::Spell(_), Some(spell)) => {
                    self.resolve_spell(state, actor_id, &target_id, spell, &mut outcome)?
                }
                (Action::Defend, _) => self.resolve_defend(state, actor_id)?,
                _ => self.resolve_attack(state, actor_id, &target_id, &mut outcome)?,
            }

            if state.battle.hp(&target_id) == 0 {
                state.battle.end(Some(actor_id), EndReason::Completed)?;
            } else {
                self.end_turn(state, actor_id, &target_id, &mut outcome)?;
            }
        }

        state.battle.touch();
        if state.battle.is_ended() {
            state.effects.clear_battle();
        }

        self.metrics.record_turn(outcome.action, outcome.critical());
        let snapshot = state.battle.clone();
        let turn = turn_record(&snapshot, &outcome);
        self.record(&snapshot, Some(turn));
        self.events.publish(BattleEvent::TurnResolved {
            battle_id: snapshot.id.clone(),
            turn_number: outcome.turn_number,
            actor_id: actor_id.to_string(),
            action: outcome.action,
            hit: outcome.hit(),
            crit: outcome.critical(),
            damage: outcome.damage,
            healing: outcome.healing,
        });
        drop(guard);

        if snapshot.is_ended() {
            self.finish(&snapshot);
        }
        outcome.battle = snapshot;
        Ok(outcome)
    }

    fn apply_turn_start(
        &self,
        state: &mut BattleSlot,
        actor_id: &str,
        report: &TurnStartReport,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        if report.damage > 0 {
            state.battle.apply_damage(actor_id, report.damage)?;
        }
        if report.healing > 0 {
            outcome.healing += state.battle.heal(actor_id, report.healing)?;
        }
        for message in &report.messages {
            state.battle.add_log(message.clone());
            outcome.messages.push(message.clone());
        }
        Ok(())
    }

    /// Turn-end effects, then hand the turn over (or end on a DoT death)
    fn end_turn(
        &self,
        state: &mut BattleSlot,
        actor_id: &str,
        target_id: &str,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let report = state.effects.end_turn(actor_id);
        for message in report.messages {
            state.battle.add_log(message.clone());
            outcome.messages.push(message);
        }

        if state.battle.hp(actor_id) == 0 {
            state.battle.end(Some(target_id), EndReason::Completed)?;
        } else {
            state.battle.advance_turn()?;
        }
        Ok(())
    }

    fn resolve_attack(
        &self,
        state: &mut BattleSlot,
        actor_id: &str,
        target_id: &str,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let (offense, defense) = {
            let attacker = state.combatant(actor_id)?;
            let bonus = attacker.stats.attack_bonus(attacker.character.class);
            let offense = Offense {
                to_hit: bonus
                    .saturating_add(attacker.stats.proficiency)
                    .saturating_add(state.effects.attack_modifier(actor_id)),
                damage_bonus: bonus,
                crit_damage_bonus: attacker.stats.crit_damage_bonus,
                outgoing_percent: state.effects.outgoing_percent(actor_id),
            };
            (offense, self.defense(state, target_id)?)
        };

        let strike = resolve_strike(
            self.dice.as_ref(),
            &self.weapon_die,
            &offense,
            &defense,
            &self.crit,
        );
        self.land_strike(state, actor_id, target_id, "attacks", &strike, outcome)
    }

    fn resolve_defend(&self, state: &mut BattleSlot, actor_id: &str) -> Result<()> {
        let bonus = self.config.combat.defend_ac_bonus;
        state.battle.grant_temp_ac_bonus(actor_id, bonus)?;
        state.battle.add_log(format!(
            "{} takes a defensive stance (+{} AC until their next turn)",
            actor_id, bonus
        ));
        Ok(())
    }

    fn resolve_spell(
        &self,
        state: &mut BattleSlot,
        actor_id: &str,
        target_id: &str,
        spell: &LearnedAbility,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let effect = spell.parsed_effect();

        // The slot is spent before any dice are rolled
        if let Some(level) = spell.slot_level() {
            let caster = &state.combatant(actor_id)?.character;
            if !self.resources.consume_slot(caster, level) {
                warn!(user = actor_id, level, "Spell slot vanished between check and cast");
            }
            outcome.slot_level = Some(level);
        }

        if effect.has_tag(HEAL_TAG) {
            let caster = state.combatant(actor_id)?;
            let amount = self
                .spell_die
                .roll(self.dice.as_ref())
                .saturating_add(caster.stats.healing_bonus)
                .saturating_add(effect.total(EffectStat::HealBonus))
                .max(0) as u32;
            let healed = state.battle.heal(actor_id, amount)?;
            outcome.healing += healed;
            state.battle.add_log(format!(
                "{} casts {} and recovers {} HP",
                actor_id, spell.key, healed
            ));
        } else {
            let (offense, defense) = {
                let caster = state.combatant(actor_id)?;
                let bonus = caster.stats.spell_damage_bonus;
                let offense = Offense {
                    to_hit: bonus
                        .saturating_add(caster.stats.proficiency)
                        .saturating_add(state.effects.attack_modifier(actor_id)),
                    damage_bonus: bonus
                        .saturating_add(effect.total(EffectStat::SpellDamage))
                        .saturating_add(effect.total(EffectStat::Damage)),
                    crit_damage_bonus: caster
                        .stats
                        .crit_damage_bonus
                        .saturating_add(effect.total(EffectStat::CritDamage)),
                    outgoing_percent: state.effects.outgoing_percent(actor_id),
                };
                (offense, self.defense(state, target_id)?)
            };

            let strike = resolve_strike(
                self.dice.as_ref(),
                &self.spell_die,
                &offense,
                &defense,
                &self.crit,
            );
            let verb = format!("casts {} at", spell.key);
            self.land_strike(state, actor_id, target_id, &verb, &strike, outcome)?;
        }

        // Status effects land whether or not the spell hit
        for application in effect.status_applications() {
            let recipient = if application.category.behavior().beneficial {
                actor_id
            } else {
                target_id
            };
            let status = StatusEffect::from_application(&application)
                .with_source(actor_id, Some(&spell.key))
                .applied_on(state.battle.turn_number);
            let applied = state.effects.apply(recipient, status);
            state
                .battle
                .add_log(format!("{} is affected by {}", recipient, applied.display()));
            outcome.effects_applied.push(AppliedEffect {
                participant: recipient.to_string(),
                effect: applied,
            });
        }

        self.resources.start_cooldown(&state.combatant(actor_id)?.character, spell);
        Ok(())
    }

    fn defense(&self, state: &BattleSlot, target_id: &str) -> Result<Defense> {
        let defender = state.combatant(target_id)?;
        Ok(Defense {
            armor_class: defender
                .stats
                .armor_class
                .saturating_add(state.battle.effective_ac_bonus(target_id))
                .saturating_add(state.effects.ac_modifier(target_id)),
            incoming_percent: state.effects.incoming_percent(target_id),
        })
    }

    /// Shield first, then HP
    fn land_strike(
        &self,
        state: &mut BattleSlot,
        actor_id: &str,
        target_id: &str,
        verb: &str,
        strike: &Strike,
        outcome: &mut ActionOutcome,
    ) -> Result<()> {
        let roll = strike.roll;
        outcome.roll = Some(roll);

        let mut line = format!(
            "{} {} {} (roll {}, total {} vs AC {}) ",
            actor_id, verb, target_id, roll.raw, roll.total, roll.target_ac
        );
        if !roll.hit {
            line.push_str("and misses");
        } else {
            let through = state.effects.absorb(target_id, strike.damage);
            outcome.absorbed = strike.damage - through;
            outcome.damage = state.battle.apply_damage(target_id, through)?;
            if roll.critical {
                line.push_str(&format!("and CRITS for {} damage", outcome.damage));
            } else {
                line.push_str(&format!("and hits for {} damage", outcome.damage));
            }
            if outcome.absorbed > 0 {
                line.push_str(&format!(" ({} absorbed by shield)", outcome.absorbed));
            }
        }
        debug!(
            battle_id = %state.battle.id,
            actor = actor_id,
            raw = roll.raw,
            total = roll.total,
            ac = roll.target_ac,
            damage = outcome.damage,
            "Strike resolved"
        );
        state.battle.add_log(line);
        Ok(())
    }

    // ---- Timeouts and cleanup ----

    /// Whether the participant on turn has been idle past the turn timeout
    pub fn check_turn_timeout(&self, battle: &Battle) -> bool {
        battle.is_active() && elapsed_since(battle.last_action_at) >= self.config.turn_timeout()
    }

    /// The participant on turn forfeits by timeout
    pub fn timeout_turn(&self, battle_id: &str) -> Result<Battle> {
        let slot = self.registry.require(battle_id)?;
        let mut guard = slot.lock();
        let snapshot = self.expire_turn(&mut guard)?;
        drop(guard);

        self.finish(&snapshot);
        Ok(snapshot)
    }

    fn expire_turn(&self, state: &mut BattleSlot) -> Result<Battle> {
        let battle = &mut state.battle;
        if !battle.is_active() {
            return Err(BattleError::state(format!(
                "battle {} is {}, not active",
                battle.id, battle.status
            )));
        }
        let loser = battle.current_turn.clone().ok_or_else(|| {
            BattleError::state(format!("battle {} has no current turn", battle.id))
        })?;
        let winner = battle
            .opponent_of(&loser)
            .map(str::to_string)
            .ok_or_else(|| {
                BattleError::state(format!("{} is not part of battle {}", loser, battle.id))
            })?;

        let turn_number = battle.turn_number;
        battle.add_log(format!("{} ran out of time", loser));
        battle.end(Some(&winner), EndReason::Timeout)?;
        state.effects.clear_battle();

        let snapshot = state.battle.clone();
        let turn = TurnRecord::new(&snapshot, turn_number, &loser, TurnAction::Timeout);
        self.record(&snapshot, Some(turn));
        self.events.publish(BattleEvent::TurnTimedOut {
            battle_id: snapshot.id.clone(),
            user_id: loser,
        });
        Ok(snapshot)
    }

    /// Time out every battle whose current turn has gone idle
    pub fn sweep_turn_timeouts(&self) -> usize {
        let mut timed_out = Vec::new();
        for slot in self.registry.slots() {
            let mut guard = slot.lock();
            // Re-checked under the lock so a just-submitted action wins
            if !self.check_turn_timeout(&guard.battle) {
                continue;
            }
            match self.expire_turn(&mut guard) {
                Ok(snapshot) => timed_out.push(snapshot),
                Err(e) => {
                    warn!(battle_id = %guard.battle.id, error = %e, "Failed to time out turn")
                }
            }
        }

        for snapshot in &timed_out {
            self.finish(snapshot);
        }
        if !timed_out.is_empty() {
            info!("Timed out {} idle battle turn(s)", timed_out.len());
        }
        timed_out.len()
    }

    /// Expire pending challenges older than the challenge expiry
    pub fn clean_up_expired_challenges(&self) -> usize {
        let mut expired = Vec::new();
        for slot in self.registry.slots() {
            let mut guard = slot.lock();
            if !self.is_expired(&guard.battle) {
                continue;
            }
            if let Err(e) = guard.battle.abort(EndReason::Expired) {
                warn!(battle_id = %guard.battle.id, error = %e, "Failed to expire challenge");
                continue;
            }
            guard.battle.add_log("Challenge expired due to inactivity");
            let snapshot = guard.battle.clone();
            self.record(&snapshot, None);
            expired.push(snapshot);
        }

        for snapshot in &expired {
            self.finish(snapshot);
        }
        if !expired.is_empty() {
            info!("Expired {} stale battle challenge(s)", expired.len());
        }
        expired.len()
    }

    /// Drop ended battles kept past their retention
    pub fn sweep_ended(&self) -> usize {
        let retention = self.config.ended_retention();
        let stale: Vec<String> = self
            .registry
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let guard = slot.lock();
                let battle = &guard.battle;
                let ended_at = battle.ended_at?;
                (battle.is_ended() && elapsed_since(ended_at) >= retention)
                    .then(|| battle.id.clone())
            })
            .collect();

        for id in &stale {
            self.registry.remove(id);
        }
        if !stale.is_empty() {
            debug!("Dropped {} ended battle(s)", stale.len());
        }
        stale.len()
    }

    fn is_expired(&self, battle: &Battle) -> bool {
        battle.is_pending() && elapsed_since(battle.created_at) >= self.config.challenge_expiry()
    }

    // ---- Lookups ----

    pub fn get_battle(&self, battle_id: &str) -> Option<Battle> {
        self.registry
            .get(battle_id)
            .map(|slot| slot.lock().battle.clone())
    }

    pub fn get_all_active_battles(&self) -> Vec<Battle> {
        self.registry
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let guard = slot.lock();
                guard.battle.is_active().then(|| guard.battle.clone())
            })
            .collect()
    }

    fn reserved_battle(&self, community_id: &str, user_id: &str) -> Option<Battle> {
        let battle_id = self.registry.reservation(community_id, user_id)?;
        self.get_battle(&battle_id)
    }

    pub fn find_active_battle_for(&self, community_id: &str, user_id: &str) -> Option<Battle> {
        self.reserved_battle(community_id, user_id)
            .filter(|b| b.is_active())
    }

    pub fn find_pending_challenge_for(&self, community_id: &str, user_id: &str) -> Option<Battle> {
        self.reserved_battle(community_id, user_id)
            .filter(|b| b.is_pending())
    }

    /// Whether a participant is held by a pending or active battle
    pub fn is_busy(&self, community_id: &str, user_id: &str) -> bool {
        self.registry.reservation(community_id, user_id).is_some()
    }

    pub fn is_on_cooldown(&self, community_id: &str, user_id: &str) -> bool {
        !self.remaining_cooldown(community_id, user_id).is_zero()
    }

    pub fn remaining_cooldown(&self, community_id: &str, user_id: &str) -> Duration {
        self.registry.cooldown_remaining(community_id, user_id)
    }

    /// Active status effects on a participant
    pub fn effects_for(&self, battle_id: &str, user_id: &str) -> Result<Vec<StatusEffect>> {
        let slot = self.registry.require(battle_id)?;
        let guard = slot.lock();
        if !guard.battle.is_participant(user_id) {
            return Err(BattleError::permission(format!(
                "{} is not part of battle {}",
                user_id, battle_id
            )));
        }
        Ok(guard.effects.for_participant(user_id).active_effects())
    }

    // ---- Spell resources ----

    /// Slot pools of a character (empty for non-casters)
    pub async fn spell_slots(&self, community_id: &str, user_id: &str) -> Result<Vec<SlotPool>> {
        let character = self.load_character(community_id, user_id).await?;
        Ok(self.resources.slots(&character))
    }

    /// Time before an ability can be used again
    pub async fn ability_cooldown(
        &self,
        community_id: &str,
        user_id: &str,
        ability_key: &str,
    ) -> Result<Duration> {
        let character = self.load_character(community_id, user_id).await?;
        Ok(self.resources.cooldown_remaining(&character, ability_key))
    }

    /// Refill a character's spell slots; not allowed mid-battle
    pub async fn long_rest(&self, community_id: &str, user_id: &str) -> Result<Vec<SlotPool>> {
        if let Some(battle_id) = self.registry.reservation(community_id, user_id) {
            return Err(BattleError::state(format!(
                "{} cannot rest during battle {}",
                user_id, battle_id
            )));
        }
        let character = self.load_character(community_id, user_id).await?;
        self.resources.long_rest(&character);
        info!(community_id, user_id, "Spell slots restored by long rest");
        Ok(self.resources.slots(&character))
    }

    /// Drop elapsed ability cooldowns
    pub fn clean_up_expired_cooldowns(&self) -> usize {
        let removed = self.resources.clean_up_expired_cooldowns();
        if removed > 0 {
            debug!("Dropped {} elapsed ability cooldown(s)", removed);
        }
        removed
    }

    // ---- Recovery ----

    /// Reload live sessions after a restart
    ///
    /// Pending challenges and idle active battles are aborted; fresh active
    /// battles resume with stats recomputed from current characters and no
    /// status effects.
    pub async fn recover(&self, store: &dyn BattleStore) -> Result<RecoveryReport> {
        let sessions = store.load_live_sessions().await?;
        let mut report = RecoveryReport::default();

        for session in sessions {
            match self.resume(&session).await {
                Ok(()) => {
                    report.resumed += 1;
                    info!(battle_id = %session.id, "Resumed battle");
                }
                Err(reason) => {
                    report.aborted += 1;
                    self.abort_session(&session, &reason);
                }
            }
        }

        info!(
            resumed = report.resumed,
            aborted = report.aborted,
            "Battle recovery complete"
        );
        Ok(report)
    }

    async fn resume(&self, session: &SessionRecord) -> std::result::Result<(), String> {
        if session.status != SessionStatus::Active {
            return Err("pending challenge".to_string());
        }
        let last_action = session
            .last_action_at
            .ok_or_else(|| "no recorded activity".to_string())?;
        if elapsed_since(last_action) >= self.config.turn_timeout() {
            return Err("idle past the turn timeout".to_string());
        }

        let battle = session.to_battle().map_err(|e| e.to_string())?;
        let mut slot = BattleSlot::new(battle);
        for user in [&session.challenger_id, &session.opponent_id] {
            let character = self
                .characters
                .find_character(&session.community_id, user)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("character for {} no longer exists", user))?;
            slot.set_combatant(Combatant::new(character, &self.config));
        }

        self.registry.insert(slot, None).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn abort_session(&self, session: &SessionRecord, reason: &str) {
        warn!(battle_id = %session.id, reason, "Aborting stored battle");

        let mut record = session.clone();
        record.status = SessionStatus::Aborted;
        record.ended_at = Some(Utc::now());
        record.current_turn = None;
        record.winner = None;
        self.persistence.save_session(record);
        self.metrics.record_ended(EndReason::Aborted);

        self.events.publish(BattleEvent::Aborted {
            battle_id: session.id.clone(),
            reason: reason.to_string(),
        });
    }

    // ---- Internals ----

    async fn load_character(&self, community_id: &str, user_id: &str) -> Result<Character> {
        let character = self
            .characters
            .find_character(community_id, user_id)
            .await?
            .ok_or_else(|| BattleError::not_found(format!("character for {}", user_id)))?;
        character::validate(&character, &self.config.character.point_buy)?;
        Ok(character)
    }

    fn record(&self, battle: &Battle, turn: Option<TurnRecord>) {
        self.persistence.save_session(SessionRecord::from(battle));
        if let Some(turn) = turn {
            self.persistence.append_turn(turn);
        }
    }

    /// Bookkeeping once a battle has ended and its slot is unlocked
    fn finish(&self, battle: &Battle) {
        let played = battle.end_reason.is_some_and(|r| r.is_played());
        // Cooldowns start in the same critical section that frees the participants
        self.registry.release(battle, played.then(|| self.config.cooldown()));

        let Some(reason) = battle.end_reason else {
            return;
        };
        self.metrics.record_ended(reason);

        let event = match reason {
            // Published by decline_challenge, which knows who declined
            EndReason::Declined => None,
            EndReason::Expired => Some(BattleEvent::ChallengeExpired {
                battle_id: battle.id.clone(),
                community_id: battle.community_id.clone(),
            }),
            EndReason::Aborted => Some(BattleEvent::Aborted {
                battle_id: battle.id.clone(),
                reason: reason.to_string(),
            }),
            EndReason::Completed | EndReason::Forfeit | EndReason::Timeout => {
                Some(BattleEvent::Completed {
                    battle_id: battle.id.clone(),
                    community_id: battle.community_id.clone(),
                    winner: battle.winner.clone(),
                    reason,
                    turns: battle.turn_number,
                })
            }
        };
        if let Some(event) = event {
            self.events.publish(event);
        }

        if !played {
            return;
        }

        let first_outcome = match battle.winner.as_deref() {
            Some(winner) if winner == battle.challenger_id => Outcome::Win,
            Some(_) => Outcome::Loss,
            None => Outcome::Draw,
        };
        self.persistence.settle_outcome(OutcomeJob {
            battle_id: battle.id.clone(),
            community_id: battle.community_id.clone(),
            first: battle.challenger_id.clone(),
            second: battle.opponent_id.clone(),
            first_outcome,
        });
    }
}

fn elapsed_since(at: DateTime<Utc>) -> Duration {
    (Utc::now() - at).to_std().unwrap_or(Duration::ZERO)
}

fn turn_record(battle: &Battle, outcome: &ActionOutcome) -> TurnRecord {
    let mut turn = TurnRecord::new(battle, outcome.turn_number, &outcome.actor_id, outcome.action);
    turn.ability_key = outcome.ability_key.clone();
    turn.damage = outcome.damage;
    turn.healing = outcome.healing;
    if let Some(roll) = outcome.roll {
        turn.hit = roll.hit;
        turn.crit = roll.critical;
        turn.raw_roll = Some(roll.raw);
        turn.total_roll = Some(roll.total);
        turn.defender_ac = Some(roll.target_ac);
    }
    if !outcome.effects_applied.is_empty() {
        match serde_json::to_string(&outcome.effects_applied) {
            Ok(json) => turn.status_effects_applied = json,
            Err(e) => warn!(battle_id = %battle.id, error = %e, "Failed to encode applied effects"),
        }
    }
    turn
}
