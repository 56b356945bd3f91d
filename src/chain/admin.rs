//! Server administration, statistics and leaderboards.

use tracing::info;

use crate::chain::engine::GameEngine;
use crate::chain::language::Language;
use crate::chain::pipeline::WordCheck;
use crate::chain::state::ChainState;
use crate::common::error::{EngineError, EngineResult};
use crate::common::{
    ChannelId, GameMode, InsertResult, ListKind, PlayerId, RemoveResult, RoleId, RoleKind, ServerId,
};
use crate::store::{LeaderboardMetric, PlayerStats, ServerRecord};

/// Entries shown on a leaderboard.
pub const LEADERBOARD_SIZE: u32 = 10;

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub rows: u64,
}

impl GameEngine {
    /// Make sure a server has a config row, e.g. when the bot joins it.
    pub async fn register_server(&self, server_id: ServerId) -> EngineResult<InsertResult> {
        let inner = &self.inner;
        let result = inner.store.ensure_server(server_id, &inner.default_languages).await?;
        inner
            .servers
            .write()
            .await
            .entry(server_id)
            .or_insert_with(|| ServerRecord::new(server_id, inner.default_languages.clone()));
        if result == InsertResult::Added {
            info!(server_id, "Registered new server");
        }
        Ok(result)
    }

    pub async fn server(&self, server_id: ServerId) -> Option<ServerRecord> {
        self.inner.servers.read().await.get(&server_id).cloned()
    }

    /// Bind `channel_id` to a game mode, replacing the previous binding.
    pub async fn bind_channel(&self, server_id: ServerId, mode: GameMode, channel_id: ChannelId) -> EngineResult<()> {
        self.register_server(server_id).await?;
        let inner = &self.inner;
        inner.store.bind_channel(server_id, mode, channel_id).await?;

        let mut routes = inner.routes.write().await;
        routes.retain(|_, key| *key != (server_id, mode));
        routes.insert(channel_id, (server_id, mode));
        drop(routes);

        if let Some(server) = inner.servers.write().await.get_mut(&server_id) {
            server.channels.insert(mode, channel_id);
        }
        info!(server_id, channel_id, %mode, "Channel bound");
        Ok(())
    }

    /// Set or clear the role the bot manages for `kind`.
    pub async fn set_role(&self, server_id: ServerId, kind: RoleKind, role: Option<RoleId>) -> EngineResult<()> {
        self.register_server(server_id).await?;
        self.inner.store.set_role(server_id, kind, role).await?;
        if let Some(server) = self.inner.servers.write().await.get_mut(&server_id) {
            match kind {
                RoleKind::Reliable => server.reliable_role = role,
                RoleKind::Failed => server.failed_role = role,
            }
        }
        info!(server_id, ?role, "Updated {}", kind);
        Ok(())
    }

    pub async fn languages(&self, server_id: ServerId) -> Vec<Language> {
        self.inner.languages_of(server_id).await
    }

    /// Replace the languages of a server from a comma separated code list.
    pub async fn set_languages(&self, server_id: ServerId, codes: &str) -> EngineResult<Vec<Language>> {
        let languages = Language::parse_list(codes).map_err(|code| EngineError::UnknownLanguage { code })?;
        if languages.is_empty() {
            return Err(EngineError::UnknownLanguage { code: codes.to_string() });
        }
        self.register_server(server_id).await?;
        self.inner.store.set_languages(server_id, &languages).await?;
        if let Some(server) = self.inner.servers.write().await.get_mut(&server_id) {
            server.languages = languages.clone();
        }
        Ok(languages)
    }

    /// Classify a word for a server without playing it.
    ///
    /// A word confirmed by the dictionary is staged for the cache.
    pub async fn check_word(&self, server_id: ServerId, raw: &str) -> EngineResult<WordCheck> {
        let word = raw.trim().to_lowercase();
        let languages = self.inner.languages_of(server_id).await;
        let pipeline = &self.inner.pipeline;
        let check = pipeline.classify(&word, server_id, &languages).await?;
        if let WordCheck::Exists(language) = check {
            pipeline.cache.stage(&word, Some(language)).await;
            self.inner.scheduler.notify_activity();
        }
        Ok(check)
    }

    pub async fn player_stats(&self, server_id: ServerId, member_id: PlayerId) -> EngineResult<Option<PlayerStats>> {
        Ok(self.inner.store.player_stats(server_id, member_id).await?)
    }

    /// Chain states of every mode of a server.
    pub async fn server_stats(&self, server_id: ServerId) -> EngineResult<Vec<ChainState>> {
        Ok(self.inner.store.chain_states(server_id).await?)
    }

    /// Top players, local to a server or global.
    pub async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        server_id: Option<ServerId>,
    ) -> EngineResult<Vec<(PlayerId, f64)>> {
        Ok(self
            .inner
            .store
            .top_players(metric, server_id, LEADERBOARD_SIZE)
            .await?)
    }

    pub async fn top_servers(&self, mode: GameMode) -> EngineResult<Vec<(ServerId, u32)>> {
        Ok(self.inner.store.top_servers(mode, LEADERBOARD_SIZE).await?)
    }

    pub async fn add_list_entry(&self, server_id: ServerId, kind: ListKind, raw: &str) -> EngineResult<InsertResult> {
        let word = self.list_word(server_id, raw).await?;
        let result = self.inner.store.add_list_entry(server_id, kind, &word).await?;
        self.inner.pipeline.lists.write().await.insert(server_id, kind, &word);
        info!(server_id, ?result, "Added '{}' to the {}", word, kind);
        Ok(result)
    }

    pub async fn remove_list_entry(&self, server_id: ServerId, kind: ListKind, raw: &str) -> EngineResult<RemoveResult> {
        let word = raw.trim().to_lowercase();
        let result = self.inner.store.remove_list_entry(server_id, kind, &word).await?;
        self.inner.pipeline.lists.write().await.remove(server_id, kind, &word);
        info!(server_id, ?result, "Removed '{}' from the {}", word, kind);
        Ok(result)
    }

    pub async fn list_entries(&self, server_id: ServerId, kind: ListKind) -> Vec<String> {
        self.inner.pipeline.lists.read().await.entries(server_id, kind)
    }

    /// Normalize a list entry and check that it is spelled in a server language.
    async fn list_word(&self, server_id: ServerId, raw: &str) -> EngineResult<String> {
        let word = raw.trim().to_lowercase();
        let languages = self.inner.languages_of(server_id).await;
        if !self.inner.pipeline.alphabets.is_legal(&languages, &word) {
            return Err(EngineError::IllegalWord { word });
        }
        Ok(word)
    }

    /// Delete everything stored about a server.
    pub async fn purge_server(&self, server_id: ServerId) -> EngineResult<PurgeReport> {
        self.stop_workers(server_id).await;
        let rows = self.inner.store.purge_server(server_id).await?;
        self.inner.servers.write().await.remove(&server_id);
        self.inner.routes.write().await.retain(|_, (id, _)| *id != server_id);
        self.inner.pipeline.lists.write().await.drop_scope(server_id);
        info!(server_id, rows, "Purged server data");
        Ok(PurgeReport { rows })
    }

    /// Delete everything stored about a user.
    pub async fn purge_member(&self, member_id: PlayerId) -> EngineResult<PurgeReport> {
        let rows = self.inner.store.purge_member(member_id).await?;
        self.inner.banned_members.write().await.remove(&member_id);
        self.reload_workers().await?;
        info!(member_id, rows, "Purged member data");
        Ok(PurgeReport { rows })
    }

    /// Exclude a server from the global leaderboards, or include it again.
    pub async fn ban_server(&self, server_id: ServerId, banned: bool) -> EngineResult<()> {
        self.register_server(server_id).await?;
        self.inner.store.set_server_banned(server_id, banned).await?;
        if let Some(server) = self.inner.servers.write().await.get_mut(&server_id) {
            server.is_banned = banned;
        }
        info!(server_id, banned, "Server ban updated");
        Ok(())
    }

    pub async fn banned_servers(&self) -> EngineResult<Vec<ServerId>> {
        Ok(self.inner.store.banned_servers().await?)
    }

    pub async fn banned_members(&self) -> EngineResult<Vec<PlayerId>> {
        Ok(self.inner.store.banned_members().await?)
    }

    /// Every registered server, ordered by id.
    pub async fn known_servers(&self) -> Vec<ServerRecord> {
        let mut servers: Vec<_> = self.inner.servers.read().await.values().cloned().collect();
        servers.sort_by_key(|server| server.server_id);
        servers
    }

    /// Ignore every submission of a member, or stop doing so.
    pub async fn ban_member(&self, member_id: PlayerId, banned: bool) -> EngineResult<bool> {
        let changed = if banned {
            self.inner.store.ban_member(member_id).await? == InsertResult::Added
        } else {
            self.inner.store.unban_member(member_id).await? == RemoveResult::Removed
        };
        let mut members = self.inner.banned_members.write().await;
        if banned {
            members.insert(member_id);
        } else {
            members.remove(&member_id);
        }
        info!(member_id, banned, "Member ban updated");
        Ok(changed)
    }

    /// Remove a word from the cache in every language.
    pub async fn uncache(&self, raw: &str) -> EngineResult<RemoveResult> {
        let word = raw.trim().to_lowercase();
        Ok(self.inner.store.cache_remove(&word).await?)
    }

    /// Run the maintenance flush immediately.
    pub async fn force_flush(&self) -> anyhow::Result<()> {
        self.inner.scheduler.flush().await
    }

    /// Chain state of the game played in `channel_id`, if the channel is bound.
    pub async fn channel_state(&self, channel_id: ChannelId) -> EngineResult<Option<ChainState>> {
        match self.inner.route(channel_id).await {
            Some((server_id, mode)) => Ok(Some(self.chain_state(server_id, mode).await?)),
            None => Ok(None),
        }
    }

    /// Bound channels with their chain state, for the restoration notice.
    pub async fn bound_channels(&self) -> EngineResult<Vec<(ChannelId, ChainState)>> {
        let routes: Vec<_> = self
            .inner
            .routes
            .read()
            .await
            .iter()
            .map(|(channel_id, key)| (*channel_id, *key))
            .collect();
        let mut channels = Vec::with_capacity(routes.len());
        for (channel_id, (server_id, mode)) in routes {
            channels.push((channel_id, self.chain_state(server_id, mode).await?));
        }
        channels.sort_by_key(|(channel_id, _)| *channel_id);
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::engine::tests::{apple_state, seeded_engine, CHANNEL, SERVER};
    use crate::chain::engine::{Outcome, Submission};
    use crate::chain::pipeline::tests::FakeLookup;

    async fn play(engine: &GameEngine, author: PlayerId, content: &str) -> Outcome {
        engine
            .submit(Submission::new(SERVER, CHANNEL, author, content))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_whitelisted_word_never_looked_up() {
        let lookup = FakeLookup::new(None);
        let (engine, _store) = seeded_engine(apple_state(), lookup.clone()).await;

        assert_eq!(
            engine.add_list_entry(SERVER, ListKind::Whitelist, "Eel").await.unwrap(),
            InsertResult::Added
        );
        assert_eq!(
            engine.add_list_entry(SERVER, ListKind::Whitelist, "eel").await.unwrap(),
            InsertResult::AlreadyPresent
        );

        let outcome = play(&engine, 2, "eel").await;
        assert!(matches!(outcome, Outcome::Accepted { count: 5, .. }));
        assert_eq!(lookup.calls(), 0);
        assert_eq!(engine.check_word(SERVER, "eel").await.unwrap(), WordCheck::Whitelisted);
    }

    #[tokio::test]
    async fn test_server_blacklist_is_soft() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        engine.add_list_entry(SERVER, ListKind::Blacklist, "elephant").await.unwrap();
        assert_eq!(engine.list_entries(SERVER, ListKind::Blacklist).await, vec!["elephant"]);

        assert!(matches!(play(&engine, 2, "elephant").await, Outcome::Rejected { .. }));

        assert_eq!(
            engine.remove_list_entry(SERVER, ListKind::Blacklist, "elephant").await.unwrap(),
            RemoveResult::Removed
        );
        assert!(matches!(play(&engine, 2, "elephant").await, Outcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_list_entry_must_be_spelled_in_server_language() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let result = engine.add_list_entry(SERVER, ListKind::Whitelist, "straße").await;
        assert!(matches!(result, Err(EngineError::IllegalWord { .. })));

        engine.set_languages(SERVER, "en,de").await.unwrap();
        assert!(engine.add_list_entry(SERVER, ListKind::Whitelist, "straße").await.is_ok());
        assert_eq!(engine.languages(SERVER).await, vec![Language::English, Language::German]);
    }

    #[tokio::test]
    async fn test_unknown_language_rejected() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let result = engine.set_languages(SERVER, "en,xx").await;
        assert!(matches!(result, Err(EngineError::UnknownLanguage { .. })));
        assert_eq!(engine.languages(SERVER).await, vec![Language::English]);
    }

    #[tokio::test]
    async fn test_rebinding_moves_route() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        engine.bind_channel(SERVER, GameMode::Normal, 777).await.unwrap();

        let old = engine.submit(Submission::new(SERVER, CHANNEL, 2, "elephant")).await.unwrap();
        assert_eq!(old, Outcome::Ignored);
        let new = engine.submit(Submission::new(SERVER, 777, 2, "elephant")).await.unwrap();
        assert!(matches!(new, Outcome::Accepted { count: 5, .. }));

        let server = engine.server(SERVER).await.unwrap();
        assert_eq!(server.channels.get(&GameMode::Normal), Some(&777));
    }

    #[tokio::test]
    async fn test_banned_member_ignored_until_unbanned() {
        let (engine, store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        assert!(engine.ban_member(2, true).await.unwrap());
        assert!(!engine.ban_member(2, true).await.unwrap());
        assert_eq!(play(&engine, 2, "elephant").await, Outcome::Ignored);
        assert_eq!(store.banned_members().await.unwrap(), vec![2]);

        assert!(engine.ban_member(2, false).await.unwrap());
        assert!(matches!(play(&engine, 2, "elephant").await, Outcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_stats_and_leaderboards() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        play(&engine, 2, "elephant").await;
        play(&engine, 3, "tiger").await;
        play(&engine, 2, "rabbit").await;

        let stats = engine.player_stats(SERVER, 2).await.unwrap().unwrap();
        assert_eq!(stats.record.correct, 2);
        assert_eq!(stats.score_rank, 1);

        let board = engine.leaderboard(LeaderboardMetric::Score, Some(SERVER)).await.unwrap();
        assert_eq!(board[0], (2, 2.0));
        assert_eq!(board[1], (3, 1.0));

        let states = engine.server_stats(SERVER).await.unwrap();
        assert_eq!(states[0].count, 7);
        assert_eq!(engine.top_servers(GameMode::Normal).await.unwrap(), vec![(SERVER, 10)]);

        engine.ban_server(SERVER, true).await.unwrap();
        assert!(engine.top_servers(GameMode::Normal).await.unwrap().is_empty());
        assert_eq!(engine.banned_servers().await.unwrap(), vec![SERVER]);
    }

    #[tokio::test]
    async fn test_purge_member_clears_holder() {
        let (engine, store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        play(&engine, 2, "elephant").await;

        let report = engine.purge_member(2).await.unwrap();
        assert_eq!(report.rows, 1);
        assert!(store.player_record(SERVER, 2).await.unwrap().is_none());

        // The worker reloaded the state, so the purged member may play next.
        assert!(matches!(play(&engine, 2, "tiger").await, Outcome::Accepted { count: 6, .. }));
    }

    #[tokio::test]
    async fn test_purge_server_unbinds_channels() {
        let (engine, store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        play(&engine, 2, "elephant").await;

        let report = engine.purge_server(SERVER).await.unwrap();
        assert!(report.rows >= 3);
        assert_eq!(play(&engine, 3, "tiger").await, Outcome::Ignored);
        assert!(store.load_chain_state(SERVER, GameMode::Normal).await.unwrap().is_none());
        assert!(engine.server(SERVER).await.is_none());
    }

    #[tokio::test]
    async fn test_roles_and_uncache() {
        let (engine, store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        engine.set_role(SERVER, RoleKind::Reliable, Some(42)).await.unwrap();
        assert_eq!(engine.server(SERVER).await.unwrap().reliable_role, Some(42));
        engine.set_role(SERVER, RoleKind::Reliable, None).await.unwrap();
        assert_eq!(engine.server(SERVER).await.unwrap().reliable_role, None);

        store.cache_insert_all(&["elephant".to_string()], Some("en")).await.unwrap();
        assert_eq!(engine.uncache("Elephant").await.unwrap(), RemoveResult::Removed);
        assert_eq!(engine.uncache("elephant").await.unwrap(), RemoveResult::NotPresent);
    }

    #[tokio::test]
    async fn test_bound_channels_for_restoration_notice() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let channels = engine.bound_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].0, CHANNEL);
        assert_eq!(channels[0].1.current_word.as_deref(), Some("apple"));
        assert_eq!(channels[0].1.high_score, 10);
    }

    #[tokio::test]
    async fn test_channel_state_and_server_listing() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let state = engine.channel_state(CHANNEL).await.unwrap().unwrap();
        assert_eq!(state.current_word.as_deref(), Some("apple"));
        assert!(engine.channel_state(CHANNEL + 1).await.unwrap().is_none());

        engine.register_server(SERVER - 1).await.unwrap();
        let ids: Vec<_> = engine.known_servers().await.iter().map(|s| s.server_id).collect();
        assert_eq!(ids, vec![SERVER - 1, SERVER]);

        assert!(engine.banned_members().await.unwrap().is_empty());
        engine.ban_member(8, true).await.unwrap();
        engine.ban_member(3, true).await.unwrap();
        assert_eq!(engine.banned_members().await.unwrap(), vec![3, 8]);
    }

    #[tokio::test]
    async fn test_check_word_stages_confirmed_word() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        assert_eq!(
            engine.check_word(SERVER, "Zebra").await.unwrap(),
            WordCheck::Exists(Language::English)
        );
        assert_eq!(
            engine.check_word(SERVER, "zebra").await.unwrap(),
            WordCheck::Cached(Language::English)
        );
        tokio_test::assert_ok!(engine.force_flush().await);
    }
}
