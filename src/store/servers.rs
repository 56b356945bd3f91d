//! Server configuration, chain state, bans and purges.

use std::collections::HashMap;

use sqlx::{Row, SqliteConnection};
use tracing::warn;

use crate::chain::language::Language;
use crate::chain::state::ChainState;
use crate::common::error::{StoreError, StoreResult};
use crate::common::{ChannelId, GameMode, InsertResult, PlayerId, RemoveResult, RoleId, RoleKind, ServerId};
use crate::store::{from_db, to_db, Store};

/// Persisted settings of one server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub server_id: ServerId,
    pub reliable_role: Option<RoleId>,
    pub failed_role: Option<RoleId>,
    pub is_banned: bool,
    pub languages: Vec<Language>,
    /// Channel bound to each game mode.
    pub channels: HashMap<GameMode, ChannelId>,
}

impl ServerRecord {
    pub fn new(server_id: ServerId, languages: Vec<Language>) -> Self {
        Self {
            server_id,
            reliable_role: None,
            failed_role: None,
            is_banned: false,
            languages,
            channels: HashMap::new(),
        }
    }

    pub fn role(&self, kind: RoleKind) -> Option<RoleId> {
        match kind {
            RoleKind::Reliable => self.reliable_role,
            RoleKind::Failed => self.failed_role,
        }
    }
}

fn encode_languages(languages: &[Language]) -> String {
    languages.iter().map(|l| l.code()).collect::<Vec<_>>().join(",")
}

fn decode_languages(server_id: ServerId, codes: &str) -> Vec<Language> {
    codes
        .split(',')
        .filter(|c| !c.is_empty())
        .filter_map(|code| {
            let language = Language::from_code(code);
            if language.is_none() {
                warn!(server_id, "Ignoring unknown stored language '{}'", code);
            }
            language
        })
        .collect()
}

fn mode_column(value: i64) -> StoreResult<GameMode> {
    GameMode::from_id(value).ok_or_else(|| StoreError::CorruptRow {
        table: "chain_state",
        message: format!("unknown game mode {}", value),
    })
}

impl Store {
    /// Load every server together with its channel bindings.
    pub async fn load_servers(&self) -> StoreResult<Vec<ServerRecord>> {
        let rows = sqlx::query(
            "SELECT server_id, reliable_role_id, failed_role_id, is_banned, languages FROM server_config",
        )
        .fetch_all(self.pool())
        .await?;

        let mut servers: HashMap<ServerId, ServerRecord> = HashMap::new();
        for row in rows {
            let server_id = from_db(row.try_get("server_id")?);
            let languages: String = row.try_get("languages")?;
            servers.insert(
                server_id,
                ServerRecord {
                    server_id,
                    reliable_role: row.try_get::<Option<i64>, _>("reliable_role_id")?.map(from_db),
                    failed_role: row.try_get::<Option<i64>, _>("failed_role_id")?.map(from_db),
                    is_banned: row.try_get("is_banned")?,
                    languages: decode_languages(server_id, &languages),
                    channels: HashMap::new(),
                },
            );
        }

        let bindings = sqlx::query(
            "SELECT server_id, game_mode, channel_id FROM chain_state WHERE channel_id IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;
        for row in bindings {
            let server_id = from_db(row.try_get("server_id")?);
            let mode = mode_column(row.try_get("game_mode")?)?;
            let channel_id = from_db(row.try_get("channel_id")?);
            if let Some(server) = servers.get_mut(&server_id) {
                server.channels.insert(mode, channel_id);
            }
        }

        Ok(servers.into_values().collect())
    }

    /// Create the config row of a server if it does not exist yet.
    pub async fn ensure_server(&self, server_id: ServerId, languages: &[Language]) -> StoreResult<InsertResult> {
        let result = sqlx::query("INSERT OR IGNORE INTO server_config (server_id, languages) VALUES (?1, ?2)")
            .bind(to_db(server_id))
            .bind(encode_languages(languages))
            .execute(self.pool())
            .await?;
        Ok(if result.rows_affected() > 0 {
            InsertResult::Added
        } else {
            InsertResult::AlreadyPresent
        })
    }

    pub async fn set_role(&self, server_id: ServerId, kind: RoleKind, role: Option<RoleId>) -> StoreResult<()> {
        let column = match kind {
            RoleKind::Reliable => "reliable_role_id",
            RoleKind::Failed => "failed_role_id",
        };
        sqlx::query(&format!("UPDATE server_config SET {} = ?1 WHERE server_id = ?2", column))
            .bind(role.map(to_db))
            .bind(to_db(server_id))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_languages(&self, server_id: ServerId, languages: &[Language]) -> StoreResult<()> {
        sqlx::query("UPDATE server_config SET languages = ?1 WHERE server_id = ?2")
            .bind(encode_languages(languages))
            .bind(to_db(server_id))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_server_banned(&self, server_id: ServerId, banned: bool) -> StoreResult<()> {
        sqlx::query("UPDATE server_config SET is_banned = ?1 WHERE server_id = ?2")
            .bind(banned)
            .bind(to_db(server_id))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn banned_servers(&self) -> StoreResult<Vec<ServerId>> {
        let ids: Vec<(i64,)> =
            sqlx::query_as("SELECT server_id FROM server_config WHERE is_banned = 1 ORDER BY server_id")
                .fetch_all(self.pool())
                .await?;
        Ok(ids.into_iter().map(|(id,)| from_db(id)).collect())
    }

    /// Bind a channel to a game mode, creating the chain state if needed.
    pub async fn bind_channel(&self, server_id: ServerId, mode: GameMode, channel_id: ChannelId) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chain_state (server_id, game_mode, channel_id) VALUES (?1, ?2, ?3)
             ON CONFLICT (server_id, game_mode) DO UPDATE SET channel_id = excluded.channel_id",
        )
        .bind(to_db(server_id))
        .bind(mode.to_id())
        .bind(to_db(channel_id))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn load_chain_state(&self, server_id: ServerId, mode: GameMode) -> StoreResult<Option<ChainState>> {
        let row = sqlx::query(
            "SELECT current_count, current_word, high_score, used_high_score_emoji, last_member_id,
                    failed_member_id, correct_inputs_by_failed_member
             FROM chain_state WHERE server_id = ?1 AND game_mode = ?2",
        )
        .bind(to_db(server_id))
        .bind(mode.to_id())
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ChainState {
            server_id,
            mode,
            current_word: row.try_get("current_word")?,
            last_member: row.try_get::<Option<i64>, _>("last_member_id")?.map(from_db),
            count: row.try_get::<i64, _>("current_count")? as u32,
            high_score: row.try_get::<i64, _>("high_score")? as u32,
            used_high_score_emoji: row.try_get("used_high_score_emoji")?,
            failed_member: row.try_get::<Option<i64>, _>("failed_member_id")?.map(from_db),
            failed_member_streak: row.try_get::<i64, _>("correct_inputs_by_failed_member")? as u32,
        }))
    }

    /// Write a chain state as part of a submission transaction.
    /// The channel binding is left untouched.
    pub async fn save_chain_state(conn: &mut SqliteConnection, state: &ChainState) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chain_state (server_id, game_mode, current_count, current_word, high_score,
                                      used_high_score_emoji, last_member_id, failed_member_id,
                                      correct_inputs_by_failed_member)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (server_id, game_mode) DO UPDATE SET
                current_count = excluded.current_count,
                current_word = excluded.current_word,
                high_score = excluded.high_score,
                used_high_score_emoji = excluded.used_high_score_emoji,
                last_member_id = excluded.last_member_id,
                failed_member_id = excluded.failed_member_id,
                correct_inputs_by_failed_member = excluded.correct_inputs_by_failed_member",
        )
        .bind(to_db(state.server_id))
        .bind(state.mode.to_id())
        .bind(state.count as i64)
        .bind(state.current_word.as_deref())
        .bind(state.high_score as i64)
        .bind(state.used_high_score_emoji)
        .bind(state.last_member.map(to_db))
        .bind(state.failed_member.map(to_db))
        .bind(state.failed_member_streak as i64)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Current chain states of a server, one per mode that has been played or bound.
    pub async fn chain_states(&self, server_id: ServerId) -> StoreResult<Vec<ChainState>> {
        let mut states = Vec::new();
        for mode in GameMode::ALL {
            if let Some(state) = self.load_chain_state(server_id, mode).await? {
                states.push(state);
            }
        }
        Ok(states)
    }

    /// Servers ordered by their best high score in `mode`, banned servers excluded.
    pub async fn top_servers(&self, mode: GameMode, limit: u32) -> StoreResult<Vec<(ServerId, u32)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT c.server_id, c.high_score FROM chain_state c
             JOIN server_config s ON s.server_id = c.server_id
             WHERE c.game_mode = ?1 AND s.is_banned = 0 AND c.high_score > 0
             ORDER BY c.high_score DESC, c.server_id ASC LIMIT ?2",
        )
        .bind(mode.to_id())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id, high)| (from_db(id), high as u32)).collect())
    }

    pub async fn ban_member(&self, member_id: PlayerId) -> StoreResult<InsertResult> {
        let result = sqlx::query("INSERT OR IGNORE INTO banned_member (member_id) VALUES (?1)")
            .bind(to_db(member_id))
            .execute(self.pool())
            .await?;
        Ok(if result.rows_affected() > 0 {
            InsertResult::Added
        } else {
            InsertResult::AlreadyPresent
        })
    }

    pub async fn unban_member(&self, member_id: PlayerId) -> StoreResult<RemoveResult> {
        let result = sqlx::query("DELETE FROM banned_member WHERE member_id = ?1")
            .bind(to_db(member_id))
            .execute(self.pool())
            .await?;
        Ok(if result.rows_affected() > 0 {
            RemoveResult::Removed
        } else {
            RemoveResult::NotPresent
        })
    }

    pub async fn banned_members(&self) -> StoreResult<Vec<PlayerId>> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT member_id FROM banned_member ORDER BY member_id")
            .fetch_all(self.pool())
            .await?;
        Ok(ids.into_iter().map(|(id,)| from_db(id)).collect())
    }

    /// Remove every row belonging to a server. Returns the number of rows deleted.
    pub async fn purge_server(&self, server_id: ServerId) -> StoreResult<u64> {
        let mut tx = self.begin().await?;
        let mut deleted = 0;
        for table in ["server_config", "chain_state", "member", "used_word", "blacklist", "whitelist"] {
            deleted += sqlx::query(&format!("DELETE FROM {} WHERE server_id = ?1", table))
                .bind(to_db(server_id))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Remove every row belonging to a user. Returns the number of rows deleted.
    pub async fn purge_member(&self, member_id: PlayerId) -> StoreResult<u64> {
        let mut tx = self.begin().await?;
        let mut deleted = 0;
        for table in ["member", "banned_member"] {
            deleted += sqlx::query(&format!("DELETE FROM {} WHERE member_id = ?1", table))
                .bind(to_db(member_id))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        sqlx::query("UPDATE chain_state SET last_member_id = NULL WHERE last_member_id = ?1")
            .bind(to_db(member_id))
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE chain_state SET failed_member_id = NULL, correct_inputs_by_failed_member = 0
             WHERE failed_member_id = ?1",
        )
        .bind(to_db(member_id))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(deleted)
    }
}
