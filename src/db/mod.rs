//! Database module - SQLite pool and schema migrations

#[cfg(test)]
pub mod test_utils;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Schema statements, applied in order. Every statement is idempotent.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS characters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        avatar_url TEXT NOT NULL DEFAULT '',
        gender TEXT,
        age INTEGER,
        species TEXT,
        occupation TEXT,
        appearance_url TEXT,
        sanity_increase_desc TEXT,
        sanity_decrease_desc TEXT,
        health_current INTEGER NOT NULL DEFAULT 100,
        health_max INTEGER NOT NULL DEFAULT 100,
        sanity_current INTEGER NOT NULL DEFAULT 100,
        sanity_max INTEGER NOT NULL DEFAULT 100,
        level INTEGER NOT NULL DEFAULT 1,
        experience INTEGER NOT NULL DEFAULT 0,
        attack_chain_max INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(owner_id, name),
        CHECK (health_current BETWEEN 0 AND health_max),
        CHECK (sanity_current BETWEEN 0 AND sanity_max)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_settings (
        owner_id TEXT PRIMARY KEY,
        selected_character_id INTEGER REFERENCES characters(id) ON DELETE SET NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS affinities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        description TEXT NOT NULL DEFAULT '',
        effect TEXT NOT NULL,
        inflicted_status TEXT,
        status_duration INTEGER NOT NULL DEFAULT 2
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attack_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attacks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        type_id INTEGER NOT NULL REFERENCES attack_types(id),
        affinity_id INTEGER REFERENCES affinities(id),
        description TEXT NOT NULL DEFAULT '',
        base_damage_dice TEXT NOT NULL,
        effect_description TEXT NOT NULL DEFAULT '',
        health_cost INTEGER NOT NULL DEFAULT 0,
        sanity_cost INTEGER NOT NULL DEFAULT 0,
        cooldown_rounds INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS character_attacks (
        character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        attack_id INTEGER NOT NULL REFERENCES attacks(id) ON DELETE CASCADE,
        is_unlocked INTEGER NOT NULL DEFAULT 1,
        level INTEGER NOT NULL DEFAULT 0,
        perfect_hits INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (character_id, attack_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        item_type TEXT NOT NULL DEFAULT 'misc',
        rarity TEXT NOT NULL DEFAULT 'Common',
        description TEXT NOT NULL DEFAULT '',
        effect TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS character_items (
        character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        PRIMARY KEY (character_id, item_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS npcs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        avatar_url TEXT,
        health_max INTEGER NOT NULL DEFAULT 100,
        sanity_max INTEGER NOT NULL DEFAULT 100,
        level INTEGER NOT NULL DEFAULT 1,
        base_damage_dice TEXT NOT NULL DEFAULT '1d4',
        attack_chain_max INTEGER NOT NULL DEFAULT 1,
        is_boss INTEGER NOT NULL DEFAULT 0,
        rarity TEXT NOT NULL DEFAULT 'Common'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS battles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'ended', 'paused')),
        current_turn_participant_id INTEGER,
        turn_order TEXT NOT NULL DEFAULT '[]',
        round_number INTEGER NOT NULL DEFAULT 1,
        version INTEGER NOT NULL DEFAULT 0,
        end_reason TEXT,
        created_at TEXT NOT NULL,
        last_activity TEXT NOT NULL
    )
    "#,
    // At most one active battle per scope
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_battles_one_active
        ON battles(guild_id, channel_id) WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS battle_participants (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        battle_id INTEGER NOT NULL REFERENCES battles(id) ON DELETE CASCADE,
        character_id INTEGER REFERENCES characters(id) ON DELETE CASCADE,
        npc_id INTEGER REFERENCES npcs(id) ON DELETE CASCADE,
        current_health INTEGER NOT NULL,
        max_health INTEGER NOT NULL,
        current_sanity INTEGER NOT NULL,
        max_sanity INTEGER NOT NULL,
        is_player INTEGER NOT NULL,
        defending INTEGER NOT NULL DEFAULT 0,
        focus_bonus INTEGER NOT NULL DEFAULT 0,
        skip_next_turn INTEGER NOT NULL DEFAULT 0,
        CHECK ((character_id IS NULL) <> (npc_id IS NULL))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participant_effects (
        participant_id INTEGER NOT NULL REFERENCES battle_participants(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        remaining_turns INTEGER NOT NULL,
        magnitude INTEGER NOT NULL,
        PRIMARY KEY (participant_id, status)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participant_cooldowns (
        participant_id INTEGER NOT NULL REFERENCES battle_participants(id) ON DELETE CASCADE,
        attack_id INTEGER NOT NULL,
        ready_round INTEGER NOT NULL,
        PRIMARY KEY (participant_id, attack_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_rating_refs (
        owner_id TEXT NOT NULL,
        tier TEXT NOT NULL,
        url TEXT NOT NULL,
        PRIMARY KEY (owner_id, tier)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_characters_owner ON characters(owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_participants_battle ON battle_participants(battle_id)",
];

/// Database handle wrapping SQLite connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Open an existing database file (migrations still run, they are idempotent)
    pub async fn open(path: &str) -> Result<Self> {
        Self::new(Some(path)).await
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
