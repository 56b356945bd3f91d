//! Word cache, used words and server word lists.

use std::collections::HashMap;

use sqlx::{Row, SqliteConnection};

use crate::chain::lists::ScopeLists;
use crate::common::error::StoreResult;
use crate::common::{GameMode, InsertResult, ListKind, RemoveResult, ServerId};
use crate::store::{from_db, to_db, Store};

/// Language key of cache entries stored without a language.
const NO_LANGUAGE: &str = "";

impl Store {
    /// Whether the cache holds `word`, for `language` or for any language.
    pub async fn cache_contains(&self, word: &str, language: Option<&str>) -> StoreResult<bool> {
        let found: Option<(i64,)> = match language {
            Some(language) => {
                sqlx::query_as("SELECT 1 FROM word_cache WHERE word = ?1 AND language = ?2 LIMIT 1")
                    .bind(word)
                    .bind(language)
                    .fetch_optional(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT 1 FROM word_cache WHERE word = ?1 LIMIT 1")
                    .bind(word)
                    .fetch_optional(self.pool())
                    .await?
            }
        };
        Ok(found.is_some())
    }

    /// Insert words, ignoring ones already present. Returns how many were new.
    pub async fn cache_insert_all(&self, words: &[String], language: Option<&str>) -> StoreResult<u64> {
        let language = language.unwrap_or(NO_LANGUAGE);
        let mut tx = self.begin().await?;
        let mut inserted = 0;
        for word in words {
            inserted += sqlx::query("INSERT OR IGNORE INTO word_cache (word, language) VALUES (?1, ?2)")
                .bind(word)
                .bind(language)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Administrative removal of a cached word in every language.
    pub async fn cache_remove(&self, word: &str) -> StoreResult<RemoveResult> {
        let result = sqlx::query("DELETE FROM word_cache WHERE word = ?1")
            .bind(word)
            .execute(self.pool())
            .await?;
        Ok(if result.rows_affected() > 0 {
            RemoveResult::Removed
        } else {
            RemoveResult::NotPresent
        })
    }

    pub async fn is_word_used(&self, server_id: ServerId, mode: GameMode, word: &str) -> StoreResult<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM used_word WHERE server_id = ?1 AND game_mode = ?2 AND word = ?3",
        )
        .bind(to_db(server_id))
        .bind(mode.to_id())
        .bind(word)
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    /// Record a consumed word as part of a submission transaction.
    pub async fn record_used_word(
        conn: &mut SqliteConnection,
        server_id: ServerId,
        mode: GameMode,
        word: &str,
    ) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO used_word (server_id, game_mode, word) VALUES (?1, ?2, ?3)")
            .bind(to_db(server_id))
            .bind(mode.to_id())
            .bind(word)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Forget the used words of a chain. Returns how many were removed.
    pub async fn clear_used_words(&self, server_id: ServerId, mode: GameMode) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM used_word WHERE server_id = ?1 AND game_mode = ?2")
            .bind(to_db(server_id))
            .bind(mode.to_id())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn add_list_entry(&self, server_id: ServerId, kind: ListKind, word: &str) -> StoreResult<InsertResult> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (server_id, word) VALUES (?1, ?2)",
            kind.table()
        ))
        .bind(to_db(server_id))
        .bind(word)
        .execute(self.pool())
        .await?;
        Ok(if result.rows_affected() > 0 {
            InsertResult::Added
        } else {
            InsertResult::AlreadyPresent
        })
    }

    pub async fn remove_list_entry(&self, server_id: ServerId, kind: ListKind, word: &str) -> StoreResult<RemoveResult> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE server_id = ?1 AND word = ?2", kind.table()))
            .bind(to_db(server_id))
            .bind(word)
            .execute(self.pool())
            .await?;
        Ok(if result.rows_affected() > 0 {
            RemoveResult::Removed
        } else {
            RemoveResult::NotPresent
        })
    }

    /// Every server's blacklist and whitelist.
    pub async fn load_list_entries(&self) -> StoreResult<HashMap<ServerId, ScopeLists>> {
        let mut scopes: HashMap<ServerId, ScopeLists> = HashMap::new();
        for kind in [ListKind::Blacklist, ListKind::Whitelist] {
            let rows = sqlx::query(&format!("SELECT server_id, word FROM {}", kind.table()))
                .fetch_all(self.pool())
                .await?;
            for row in rows {
                let server_id = from_db(row.try_get("server_id")?);
                let word: String = row.try_get("word")?;
                let lists = scopes.entry(server_id).or_default();
                match kind {
                    ListKind::Blacklist => lists.blacklist.insert(word),
                    ListKind::Whitelist => lists.whitelist.insert(word),
                };
            }
        }
        Ok(scopes)
    }
}
