//! SQLite persistence.
//!
//! All queries are runtime-checked so the crate builds without a database.
//! Writes belonging to one submission go through a single transaction
//! obtained from [`Store::begin`].

pub mod players;
pub mod servers;
pub mod words;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::common::error::StoreResult;

pub use players::{LeaderboardMetric, PlayerRecord, PlayerStats};
pub use servers::ServerRecord;

/// The DDL for the database schema.
const DB_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS server_config (
    server_id INTEGER NOT NULL,
    reliable_role_id INTEGER,
    failed_role_id INTEGER,
    is_banned BOOLEAN NOT NULL DEFAULT 0,
    languages TEXT NOT NULL DEFAULT 'en',
    PRIMARY KEY (server_id)
);
CREATE TABLE IF NOT EXISTS chain_state (
    server_id INTEGER NOT NULL,
    game_mode INTEGER NOT NULL,
    channel_id INTEGER,
    current_count INTEGER NOT NULL DEFAULT 0,
    current_word TEXT,
    high_score INTEGER NOT NULL DEFAULT 0,
    used_high_score_emoji BOOLEAN NOT NULL DEFAULT 0,
    last_member_id INTEGER,
    failed_member_id INTEGER,
    correct_inputs_by_failed_member INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (server_id, game_mode)
);
CREATE TABLE IF NOT EXISTS word_cache (
    word TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (word, language)
);
CREATE TABLE IF NOT EXISTS used_word (
    server_id INTEGER NOT NULL,
    game_mode INTEGER NOT NULL,
    word TEXT NOT NULL,
    PRIMARY KEY (server_id, game_mode, word)
);
CREATE TABLE IF NOT EXISTS member (
    server_id INTEGER NOT NULL,
    member_id INTEGER NOT NULL,
    score INTEGER NOT NULL DEFAULT 0,
    correct INTEGER NOT NULL DEFAULT 0,
    wrong INTEGER NOT NULL DEFAULT 0,
    karma REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (server_id, member_id)
);
CREATE TABLE IF NOT EXISTS blacklist (
    server_id INTEGER NOT NULL,
    word TEXT NOT NULL,
    PRIMARY KEY (server_id, word)
);
CREATE TABLE IF NOT EXISTS whitelist (
    server_id INTEGER NOT NULL,
    word TEXT NOT NULL,
    PRIMARY KEY (server_id, word)
);
CREATE TABLE IF NOT EXISTS banned_member (
    member_id INTEGER NOT NULL,
    PRIMARY KEY (member_id)
);";

/// Handle to the game database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        info!("Database ready at {}", url);
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    #[cfg(test)]
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(DB_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Start the transaction that groups the writes of one submission.
    pub async fn begin(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Convert a Discord snowflake for storage.
pub(crate) fn to_db(id: u64) -> i64 {
    id as i64
}

/// Convert a stored snowflake back.
pub(crate) fn from_db(id: i64) -> u64 {
    id as u64
}
