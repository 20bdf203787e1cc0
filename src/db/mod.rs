//! Database module - SQLite adapter for battle sessions and characters

#[cfg(test)]
pub mod test_utils;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::character::{
    AbilityKind, AbilityScores, Character, CharacterClass, LearnedAbility, Progression, Race,
};
use crate::persistence::{
    BattleStore, CharacterRepository, SessionRecord, SessionStatus, StoreError, TurnAction,
    TurnRecord,
};

/// SQLite-backed [`BattleStore`] and [`CharacterRepository`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self, StoreError> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Every in-memory connection is its own database, so keep exactly one
        let pool = match path {
            Some(_) => SqlitePoolOptions::new().max_connections(10),
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        }
        .connect_with(options)
        .await?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS battle_session (
                id TEXT PRIMARY KEY,
                community_id TEXT NOT NULL,
                challenger_id TEXT NOT NULL,
                opponent_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                current_turn TEXT,
                challenger_hp INTEGER NOT NULL DEFAULT 0,
                challenger_max_hp INTEGER NOT NULL DEFAULT 0,
                opponent_hp INTEGER NOT NULL DEFAULT 0,
                opponent_max_hp INTEGER NOT NULL DEFAULT 0,
                winner TEXT,
                turn_number INTEGER NOT NULL DEFAULT 0,
                temp_ac_bonus INTEGER NOT NULL DEFAULT 0,
                temp_ac_owner TEXT,
                last_action_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS battle_turn (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                battle_id TEXT NOT NULL,
                community_id TEXT NOT NULL,
                turn_number INTEGER NOT NULL,
                actor_id TEXT NOT NULL,
                action TEXT NOT NULL,
                target_id TEXT,
                ability_key TEXT,
                damage INTEGER NOT NULL DEFAULT 0,
                healing INTEGER NOT NULL DEFAULT 0,
                crit INTEGER NOT NULL DEFAULT 0,
                hit INTEGER NOT NULL DEFAULT 0,
                raw_roll INTEGER,
                total_roll INTEGER,
                defender_ac INTEGER,
                actor_hp_after INTEGER NOT NULL,
                target_hp_after INTEGER NOT NULL,
                status_effects_applied TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                community_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                class TEXT NOT NULL,
                race TEXT NOT NULL,
                strength INTEGER NOT NULL,
                dexterity INTEGER NOT NULL,
                constitution INTEGER NOT NULL,
                intelligence INTEGER NOT NULL,
                wisdom INTEGER NOT NULL,
                charisma INTEGER NOT NULL,
                xp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                elo INTEGER NOT NULL DEFAULT 1000,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                draws INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (community_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_abilities (
                community_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                ability_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                effect TEXT,
                spell_slot_level INTEGER,
                cooldown_secs INTEGER,
                PRIMARY KEY (community_id, user_id, ability_key),
                FOREIGN KEY (community_id, user_id)
                    REFERENCES characters(community_id, user_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_battle_session_status ON battle_session(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_battle_turn_battle ON battle_turn(battle_id)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or update a character together with its abilities
    pub async fn upsert_character(&self, character: &Character) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let s = &character.scores;
        let p = &character.progression;

        sqlx::query(
            r#"
            INSERT INTO characters (community_id, user_id, class, race,
                strength, dexterity, constitution, intelligence, wisdom, charisma,
                xp, level, elo, wins, losses, draws)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(community_id, user_id) DO UPDATE SET
                class = excluded.class,
                race = excluded.race,
                strength = excluded.strength,
                dexterity = excluded.dexterity,
                constitution = excluded.constitution,
                intelligence = excluded.intelligence,
                wisdom = excluded.wisdom,
                charisma = excluded.charisma,
                xp = excluded.xp,
                level = excluded.level,
                elo = excluded.elo,
                wins = excluded.wins,
                losses = excluded.losses,
                draws = excluded.draws
            "#,
        )
        .bind(&character.community_id)
        .bind(&character.user_id)
        .bind(character.class.to_string())
        .bind(character.race.to_string())
        .bind(s.strength)
        .bind(s.dexterity)
        .bind(s.constitution)
        .bind(s.intelligence)
        .bind(s.wisdom)
        .bind(s.charisma)
        .bind(p.xp as i64)
        .bind(p.level as i64)
        .bind(p.elo)
        .bind(p.wins as i64)
        .bind(p.losses as i64)
        .bind(p.draws as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM character_abilities WHERE community_id = ? AND user_id = ?")
            .bind(&character.community_id)
            .bind(&character.user_id)
            .execute(&mut *tx)
            .await?;

        for ability in &character.abilities {
            sqlx::query(
                r#"
                INSERT INTO character_abilities (community_id, user_id, ability_key, kind, effect,
                    spell_slot_level, cooldown_secs)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&character.community_id)
            .bind(&character.user_id)
            .bind(&ability.key)
            .bind(ability.kind.to_string())
            .bind(&ability.effect)
            .bind(ability.spell_slot_level.map(i64::from))
            .bind(ability.cooldown_secs.map(|secs| secs as i64))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Turn history of one battle, oldest first
    pub async fn turns_for(&self, battle_id: &str) -> Result<Vec<TurnRecord>, StoreError> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT battle_id, community_id, turn_number, actor_id, action, target_id,
                ability_key, damage, healing, crit, hit, raw_roll, total_roll, defender_ac,
                actor_hp_after, target_hp_after, status_effects_applied, created_at
            FROM battle_turn WHERE battle_id = ? ORDER BY id
            "#,
        )
        .bind(battle_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TurnRow::into_record).collect()
    }

    /// Load one session regardless of status
    pub async fn session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM battle_session WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_record).transpose()
    }
}

const SESSION_COLUMNS: &str = "id, community_id, challenger_id, opponent_id, status, \
    created_at, started_at, ended_at, current_turn, challenger_hp, challenger_max_hp, \
    opponent_hp, opponent_max_hp, winner, turn_number, temp_ac_bonus, temp_ac_owner, \
    last_action_at";

#[async_trait]
impl BattleStore for SqliteStore {
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO battle_session ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SESSION_COLUMNS
        ))
        .bind(&session.id)
        .bind(&session.community_id)
        .bind(&session.challenger_id)
        .bind(&session.opponent_id)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.current_turn)
        .bind(session.challenger_hp as i64)
        .bind(session.challenger_max_hp as i64)
        .bind(session.opponent_hp as i64)
        .bind(session.opponent_max_hp as i64)
        .bind(&session.winner)
        .bind(session.turn_number as i64)
        .bind(session.temp_ac_bonus)
        .bind(&session.temp_ac_owner)
        .bind(session.last_action_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_live_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM battle_session WHERE status IN ('PENDING', 'ACTIVE') ORDER BY created_at",
            SESSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }

    async fn append_turn(&self, turn: &TurnRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO battle_turn (battle_id, community_id, turn_number, actor_id, action,
                target_id, ability_key, damage, healing, crit, hit, raw_roll, total_roll,
                defender_ac, actor_hp_after, target_hp_after, status_effects_applied, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.battle_id)
        .bind(&turn.community_id)
        .bind(turn.turn_number as i64)
        .bind(&turn.actor_id)
        .bind(turn.action.as_str())
        .bind(&turn.target_id)
        .bind(&turn.ability_key)
        .bind(turn.damage as i64)
        .bind(turn.healing as i64)
        .bind(turn.crit)
        .bind(turn.hit)
        .bind(turn.raw_roll.map(|r| r as i64))
        .bind(turn.total_roll)
        .bind(turn.defender_ac)
        .bind(turn.actor_hp_after as i64)
        .bind(turn.target_hp_after as i64)
        .bind(&turn.status_effects_applied)
        .bind(turn.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CharacterRepository for SqliteStore {
    async fn find_character(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<Character>, StoreError> {
        let row: Option<CharacterRow> = sqlx::query_as(
            r#"
            SELECT community_id, user_id, class, race, strength, dexterity, constitution,
                intelligence, wisdom, charisma, xp, level, elo, wins, losses, draws
            FROM characters WHERE community_id = ? AND user_id = ?
            "#,
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let abilities: Vec<AbilityRow> = sqlx::query_as(
            r#"
            SELECT ability_key, kind, effect, spell_slot_level, cooldown_secs
            FROM character_abilities
            WHERE community_id = ? AND user_id = ? ORDER BY ability_key
            "#,
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut character = row.into_character()?;
        for ability in abilities {
            character.abilities.push(ability.into_ability()?);
        }
        Ok(Some(character))
    }

    async fn record_outcome(
        &self,
        community_id: &str,
        user_id: &str,
        progression: &Progression,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE characters SET xp = ?, level = ?, elo = ?, wins = ?, losses = ?, draws = ?
            WHERE community_id = ? AND user_id = ?
            "#,
        )
        .bind(progression.xp as i64)
        .bind(progression.level as i64)
        .bind(progression.elo)
        .bind(progression.wins as i64)
        .bind(progression.losses as i64)
        .bind(progression.draws as i64)
        .bind(community_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Invalid(format!(
                "no character for {} in {}",
                user_id, community_id
            )));
        }
        Ok(())
    }
}

fn to_u32(value: i64, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Invalid(format!("{} out of range: {}", field, value)))
}

fn invalid(e: impl std::fmt::Display) -> StoreError {
    StoreError::Invalid(e.to_string())
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    community_id: String,
    challenger_id: String,
    opponent_id: String,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    current_turn: Option<String>,
    challenger_hp: i64,
    challenger_max_hp: i64,
    opponent_hp: i64,
    opponent_max_hp: i64,
    winner: Option<String>,
    turn_number: i64,
    temp_ac_bonus: i32,
    temp_ac_owner: Option<String>,
    last_action_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord, StoreError> {
        Ok(SessionRecord {
            status: SessionStatus::from_str(&self.status)?,
            challenger_hp: to_u32(self.challenger_hp, "challenger_hp")?,
            challenger_max_hp: to_u32(self.challenger_max_hp, "challenger_max_hp")?,
            opponent_hp: to_u32(self.opponent_hp, "opponent_hp")?,
            opponent_max_hp: to_u32(self.opponent_max_hp, "opponent_max_hp")?,
            turn_number: to_u32(self.turn_number, "turn_number")?,
            id: self.id,
            community_id: self.community_id,
            challenger_id: self.challenger_id,
            opponent_id: self.opponent_id,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            current_turn: self.current_turn,
            winner: self.winner,
            temp_ac_bonus: self.temp_ac_bonus,
            temp_ac_owner: self.temp_ac_owner,
            last_action_at: self.last_action_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    battle_id: String,
    community_id: String,
    turn_number: i64,
    actor_id: String,
    action: String,
    target_id: Option<String>,
    ability_key: Option<String>,
    damage: i64,
    healing: i64,
    crit: bool,
    hit: bool,
    raw_roll: Option<i64>,
    total_roll: Option<i32>,
    defender_ac: Option<i32>,
    actor_hp_after: i64,
    target_hp_after: i64,
    status_effects_applied: String,
    created_at: DateTime<Utc>,
}

impl TurnRow {
    fn into_record(self) -> Result<TurnRecord, StoreError> {
        Ok(TurnRecord {
            turn_number: to_u32(self.turn_number, "turn_number")?,
            action: TurnAction::from_str(&self.action)?,
            damage: to_u32(self.damage, "damage")?,
            healing: to_u32(self.healing, "healing")?,
            raw_roll: self.raw_roll.map(|r| to_u32(r, "raw_roll")).transpose()?,
            actor_hp_after: to_u32(self.actor_hp_after, "actor_hp_after")?,
            target_hp_after: to_u32(self.target_hp_after, "target_hp_after")?,
            battle_id: self.battle_id,
            community_id: self.community_id,
            actor_id: self.actor_id,
            target_id: self.target_id,
            ability_key: self.ability_key,
            crit: self.crit,
            hit: self.hit,
            total_roll: self.total_roll,
            defender_ac: self.defender_ac,
            status_effects_applied: self.status_effects_applied,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CharacterRow {
    community_id: String,
    user_id: String,
    class: String,
    race: String,
    strength: i32,
    dexterity: i32,
    constitution: i32,
    intelligence: i32,
    wisdom: i32,
    charisma: i32,
    xp: i64,
    level: i64,
    elo: i32,
    wins: i64,
    losses: i64,
    draws: i64,
}

impl CharacterRow {
    fn into_character(self) -> Result<Character, StoreError> {
        let class = CharacterClass::from_str(&self.class).map_err(invalid)?;
        let race = Race::from_str(&self.race).map_err(invalid)?;
        let scores = AbilityScores::new(
            self.strength,
            self.dexterity,
            self.constitution,
            self.intelligence,
            self.wisdom,
            self.charisma,
        );

        let mut character = Character::new(&self.community_id, &self.user_id, class, race, scores);
        character.progression = Progression {
            xp: u64::try_from(self.xp).map_err(invalid)?,
            level: to_u32(self.level, "level")?,
            elo: self.elo,
            wins: to_u32(self.wins, "wins")?,
            losses: to_u32(self.losses, "losses")?,
            draws: to_u32(self.draws, "draws")?,
        };
        Ok(character)
    }
}

#[derive(sqlx::FromRow)]
struct AbilityRow {
    ability_key: String,
    kind: String,
    effect: Option<String>,
    spell_slot_level: Option<i64>,
    cooldown_secs: Option<i64>,
}

impl AbilityRow {
    fn into_ability(self) -> Result<LearnedAbility, StoreError> {
        let spell_slot_level = self
            .spell_slot_level
            .map(|level| u8::try_from(level).map_err(|_| invalid(format!("slot level {}", level))))
            .transpose()?;
        let cooldown_secs = self
            .cooldown_secs
            .map(|secs| u64::try_from(secs).map_err(|_| invalid(format!("cooldown {}", secs))))
            .transpose()?;
        Ok(LearnedAbility {
            kind: AbilityKind::from_str(&self.kind).map_err(invalid)?,
            key: self.ability_key,
            effect: self.effect,
            spell_slot_level,
            cooldown_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::test_utils::test_store;
    use crate::combat::state::{Battle, EndReason};

    fn mage() -> Character {
        Character::new(
            "g1",
            "merlin",
            CharacterClass::Mage,
            Race::Elf,
            AbilityScores::new(8, 14, 13, 15, 12, 10),
        )
        .with_ability(LearnedAbility::new("focus", AbilityKind::Talent, "SPELL_DAMAGE+1"))
        .with_ability(
            LearnedAbility::new("firebolt", AbilityKind::Spell, "DAMAGE+2,APPLY_STATUS:BURN:2:1:2")
                .with_slot_level(1)
                .with_cooldown(30),
        )
    }

    #[tokio::test]
    async fn test_db_creation() {
        let store = test_store().await;
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_run() {
        let store = test_store().await;

        // Verify tables exist
        let result: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM battle_session")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(result.0, 0);
    }

    #[tokio::test]
    async fn test_session_upsert_and_live_filter() {
        let store = test_store().await;

        let mut battle = Battle::new_pending("g1", "alice", "bob");
        store.save_session(&SessionRecord::from(&battle)).await.unwrap();
        battle.start(12, 10).unwrap();
        battle.apply_damage("bob", 3).unwrap();
        store.save_session(&SessionRecord::from(&battle)).await.unwrap();

        let live = store.load_live_sessions().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].status, SessionStatus::Active);
        assert_eq!(live[0].opponent_hp, 7);
        assert_eq!(live[0].current_turn.as_deref(), Some("alice"));

        battle.end(Some("alice"), EndReason::Forfeit).unwrap();
        store.save_session(&SessionRecord::from(&battle)).await.unwrap();
        assert!(store.load_live_sessions().await.unwrap().is_empty());

        let saved = store.session(&battle.id).await.unwrap().unwrap();
        assert_eq!(saved.status, SessionStatus::Completed);
        assert_eq!(saved.winner.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_turn_history() {
        let store = test_store().await;
        let mut battle = Battle::new_pending("g1", "alice", "bob");
        battle.start(12, 10).unwrap();

        let mut turn = TurnRecord::new(&battle, 1, "alice", TurnAction::Attack);
        turn.hit = true;
        turn.damage = 5;
        turn.raw_roll = Some(14);
        turn.total_roll = Some(18);
        turn.defender_ac = Some(12);
        store.append_turn(&turn).await.unwrap();
        store
            .append_turn(&TurnRecord::new(&battle, 2, "bob", TurnAction::Defend))
            .await
            .unwrap();

        let turns = store.turns_for(&battle.id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].action, TurnAction::Attack);
        assert_eq!(turns[0].damage, 5);
        assert_eq!(turns[0].raw_roll, Some(14));
        assert_eq!(turns[1].action, TurnAction::Defend);
    }

    #[tokio::test]
    async fn test_character_round_trip() {
        let store = test_store().await;
        store.upsert_character(&mage()).await.unwrap();

        let found = store.find_character("g1", "merlin").await.unwrap().unwrap();
        assert_eq!(found.class, CharacterClass::Mage);
        assert_eq!(found.abilities.len(), 2);
        let firebolt = found.spell("firebolt").unwrap();
        assert_eq!(firebolt.slot_level(), Some(1));
        assert_eq!(firebolt.cooldown_secs, Some(30));
        assert_eq!(found.spell("focus"), None);
        assert_eq!(found.passive_effect().total_named("SPELL_DAMAGE"), 1);

        assert!(store.find_character("g2", "merlin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_outcome() {
        let store = test_store().await;
        store.upsert_character(&mage()).await.unwrap();

        let progression = Progression {
            xp: 100,
            elo: 1016,
            wins: 1,
            ..Progression::default()
        };
        store
            .record_outcome("g1", "merlin", &progression)
            .await
            .unwrap();

        let found = store.find_character("g1", "merlin").await.unwrap().unwrap();
        assert_eq!(found.progression, progression);

        assert!(store.record_outcome("g1", "nobody", &progression).await.is_err());
    }
}
