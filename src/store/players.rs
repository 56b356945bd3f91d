//! Player records, statistics and leaderboards.

use sqlx::{Row, SqliteConnection};

use crate::common::error::StoreResult;
use crate::common::{PlayerId, ServerId};
use crate::store::{from_db, to_db, Store};

/// Cumulative results of one player in one server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub server_id: ServerId,
    pub member_id: PlayerId,
    pub score: i64,
    pub correct: i64,
    pub wrong: i64,
    pub karma: f64,
}

impl PlayerRecord {
    /// Share of correct submissions, `None` before the first one.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.correct + self.wrong;
        (total > 0).then(|| self.correct as f64 / total as f64)
    }
}

/// A player record with its position in the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub record: PlayerRecord,
    pub score_rank: u32,
    pub karma_rank: u32,
}

/// Ordering of a user leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardMetric {
    Score,
    Karma,
}

impl LeaderboardMetric {
    fn column(self) -> &'static str {
        match self {
            LeaderboardMetric::Score => "score",
            LeaderboardMetric::Karma => "karma",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "score" => Some(LeaderboardMetric::Score),
            "karma" => Some(LeaderboardMetric::Karma),
            _ => None,
        }
    }
}

impl Store {
    /// Credit an accepted word. Karma never drops below zero.
    pub async fn record_accept(
        conn: &mut SqliteConnection,
        server_id: ServerId,
        member_id: PlayerId,
        karma_delta: f64,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO member (server_id, member_id, score, correct, wrong, karma)
             VALUES (?1, ?2, 1, 1, 0, MAX(0.0, ?3))
             ON CONFLICT (server_id, member_id) DO UPDATE SET
                score = score + 1,
                correct = correct + 1,
                karma = MAX(0.0, karma + ?3)",
        )
        .bind(to_db(server_id))
        .bind(to_db(member_id))
        .bind(karma_delta)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Penalize a mistake. Karma never drops below zero.
    pub async fn record_mistake(
        conn: &mut SqliteConnection,
        server_id: ServerId,
        member_id: PlayerId,
        penalty: f64,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO member (server_id, member_id, score, correct, wrong, karma)
             VALUES (?1, ?2, -1, 0, 1, 0.0)
             ON CONFLICT (server_id, member_id) DO UPDATE SET
                score = score - 1,
                wrong = wrong + 1,
                karma = MAX(0.0, karma - ?3)",
        )
        .bind(to_db(server_id))
        .bind(to_db(member_id))
        .bind(penalty)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn player_record(&self, server_id: ServerId, member_id: PlayerId) -> StoreResult<Option<PlayerRecord>> {
        let row = sqlx::query(
            "SELECT score, correct, wrong, karma FROM member WHERE server_id = ?1 AND member_id = ?2",
        )
        .bind(to_db(server_id))
        .bind(to_db(member_id))
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(PlayerRecord {
            server_id,
            member_id,
            score: row.try_get("score")?,
            correct: row.try_get("correct")?,
            wrong: row.try_get("wrong")?,
            karma: row.try_get("karma")?,
        }))
    }

    /// Player record plus score and karma rank within the server.
    pub async fn player_stats(&self, server_id: ServerId, member_id: PlayerId) -> StoreResult<Option<PlayerStats>> {
        let Some(record) = self.player_record(server_id, member_id).await? else {
            return Ok(None);
        };

        let (score_rank,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) + 1 FROM member WHERE server_id = ?1 AND score > ?2")
                .bind(to_db(server_id))
                .bind(record.score)
                .fetch_one(self.pool())
                .await?;
        let (karma_rank,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) + 1 FROM member WHERE server_id = ?1 AND karma > ?2")
                .bind(to_db(server_id))
                .bind(record.karma)
                .fetch_one(self.pool())
                .await?;

        Ok(Some(PlayerStats {
            record,
            score_rank: score_rank as u32,
            karma_rank: karma_rank as u32,
        }))
    }

    /// Top players by `metric`. With a server the board is local to it,
    /// otherwise values are summed over all servers that are not banned.
    pub async fn top_players(
        &self,
        metric: LeaderboardMetric,
        server_id: Option<ServerId>,
        limit: u32,
    ) -> StoreResult<Vec<(PlayerId, f64)>> {
        let column = metric.column();
        let rows = match server_id {
            Some(server_id) => {
                sqlx::query(&format!(
                    "SELECT member_id, CAST({column} AS REAL) AS value FROM member
                     WHERE server_id = ?1 ORDER BY {column} DESC, member_id ASC LIMIT ?2"
                ))
                .bind(to_db(server_id))
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT m.member_id, CAST(SUM(m.{column}) AS REAL) AS value FROM member m
                     LEFT JOIN server_config s ON s.server_id = m.server_id
                     WHERE COALESCE(s.is_banned, 0) = 0
                     GROUP BY m.member_id ORDER BY value DESC, m.member_id ASC LIMIT ?1"
                ))
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
        };

        rows.into_iter()
            .map(|row| Ok((from_db(row.try_get("member_id")?), row.try_get("value")?)))
            .collect()
    }

    /// Members qualifying for the reliable role.
    pub async fn reliable_members(
        &self,
        server_id: ServerId,
        karma_threshold: f64,
        accuracy_threshold: f64,
    ) -> StoreResult<Vec<PlayerId>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT member_id FROM member
             WHERE server_id = ?1 AND karma > ?2 AND correct + wrong > 0
               AND CAST(correct AS REAL) / (correct + wrong) > ?3
             ORDER BY member_id",
        )
        .bind(to_db(server_id))
        .bind(karma_threshold)
        .bind(accuracy_threshold)
        .fetch_all(self.pool())
        .await?;
        Ok(ids.into_iter().map(|(id,)| from_db(id)).collect())
    }
}
