//! Game engine.
//!
//! Every (server, mode) pair gets its own worker task that owns the chain
//! state and processes that channel's submissions one at a time. Channels are
//! independent of each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::chain::cache::WordCache;
use crate::chain::housekeeping::{Housekeeping, RoleSync};
use crate::chain::karma::{self, RecentEndingHistory};
use crate::chain::language::{Alphabets, Language};
use crate::chain::lists::{GlobalLists, ListFilter};
use crate::chain::lookup::DictionaryLookup;
use crate::chain::maintenance::MaintenanceScheduler;
use crate::chain::pipeline::{MistakeReason, SoftRejection, ValidationPipeline, Verdict};
use crate::chain::state::{ChainState, Reaction};
use crate::common::error::{EngineError, EngineResult, StoreResult};
use crate::common::{ChannelId, GameMode, PlayerId, RoleKind, ServerId};
use crate::config::GameSettings;
use crate::store::{ServerRecord, Store};

/// A message posted in a game channel.
#[derive(Debug, Clone)]
pub struct Submission {
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub author: PlayerId,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(server_id: ServerId, channel_id: ChannelId, author: PlayerId, content: impl Into<String>) -> Self {
        Self {
            server_id,
            channel_id,
            author,
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    /// The normalized word.
    pub fn word(&self) -> String {
        self.content.trim().to_lowercase()
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not a game event: unbound channel, banned member or not a word.
    Ignored,
    Rejected {
        word: String,
        reason: SoftRejection,
    },
    Mistake {
        word: String,
        reason: MistakeReason,
        /// Chain length when it broke.
        broken_at: u32,
        high_score: u32,
        /// Start of the next valid word, if known.
        restart_with: Option<String>,
    },
    /// The word could not be validated and was not taken into account.
    Fault {
        word: String,
    },
    Accepted {
        word: String,
        reaction: Reaction,
        count: u32,
        karma_delta: f64,
        /// The count reached an announcement milestone.
        milestone: bool,
        /// The author's failed role was lifted.
        recovered: bool,
    },
}

/// Outcome of a queued submission.
pub struct PendingOutcome {
    server_id: ServerId,
    rx: Option<oneshot::Receiver<Outcome>>,
}

impl PendingOutcome {
    pub async fn outcome(self) -> EngineResult<Outcome> {
        match self.rx {
            Some(rx) => rx.await.map_err(|_| EngineError::WorkerGone {
                server_id: self.server_id,
            }),
            None => Ok(Outcome::Ignored),
        }
    }
}

enum Job {
    Submit {
        submission: Submission,
        reply: oneshot::Sender<Outcome>,
    },
    Reset {
        reply: oneshot::Sender<EngineResult<u64>>,
    },
    Reload {
        reply: oneshot::Sender<EngineResult<()>>,
    },
}

type WorkerKey = (ServerId, GameMode);

pub(super) struct EngineInner {
    pub(super) settings: GameSettings,
    pub(super) store: Store,
    pub(super) pipeline: ValidationPipeline,
    pub(super) scheduler: MaintenanceScheduler,
    pub(super) servers: RwLock<HashMap<ServerId, ServerRecord>>,
    pub(super) routes: RwLock<HashMap<ChannelId, WorkerKey>>,
    pub(super) banned_members: RwLock<HashSet<PlayerId>>,
    pub(super) default_languages: Vec<Language>,
    workers: Mutex<HashMap<WorkerKey, mpsc::UnboundedSender<Job>>>,
    special_reactions: HashMap<String, String>,
}

/// Handle to the game engine. Cheap to clone.
#[derive(Clone)]
pub struct GameEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl GameEngine {
    /// Load servers, lists and bans from `store` and get ready for play.
    ///
    /// Role holders computed by the maintenance flush are sent to `roles_tx`.
    pub async fn start(
        settings: GameSettings,
        store: Store,
        lookup: Arc<dyn DictionaryLookup>,
        global: Arc<GlobalLists>,
        roles_tx: Option<mpsc::UnboundedSender<RoleSync>>,
    ) -> EngineResult<Self> {
        let cache = Arc::new(WordCache::new(store.clone(), global.clone()));
        let housekeeping = Housekeeping::new(
            cache.clone(),
            store.clone(),
            roles_tx,
            settings.reliable_karma_threshold,
            settings.reliable_accuracy_threshold,
        );
        let scheduler = MaintenanceScheduler::new(Arc::new(housekeeping), settings.quiet_period);

        let mut lists = ListFilter::new(global);
        for (server_id, scope) in store.load_list_entries().await? {
            lists.load_scope(server_id, scope);
        }

        let mut servers = HashMap::new();
        let mut routes = HashMap::new();
        for server in store.load_servers().await? {
            for (mode, channel_id) in &server.channels {
                routes.insert(*channel_id, (server.server_id, *mode));
            }
            servers.insert(server.server_id, server);
        }
        let banned_members: HashSet<PlayerId> = store.banned_members().await?.into_iter().collect();

        let default_languages = settings
            .default_languages
            .iter()
            .map(|code| {
                Language::from_code(code).ok_or_else(|| EngineError::UnknownLanguage { code: code.clone() })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let special_reactions = resolve_reactions(&settings.special_reactions);

        let pipeline = ValidationPipeline {
            alphabets: Arc::new(Alphabets::new()),
            lists: Arc::new(RwLock::new(lists)),
            cache,
            lookup,
            store: store.clone(),
            lookup_timeout: settings.lookup_timeout,
            single_player: settings.single_player,
        };

        info!(
            servers = servers.len(),
            channels = routes.len(),
            banned_members = banned_members.len(),
            single_player = settings.single_player,
            "Game engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                store,
                pipeline,
                scheduler,
                servers: RwLock::new(servers),
                routes: RwLock::new(routes),
                banned_members: RwLock::new(banned_members),
                default_languages,
                workers: Mutex::new(HashMap::new()),
                special_reactions,
            }),
        })
    }

    /// Process a submission in its channel's order.
    pub async fn submit(&self, submission: Submission) -> EngineResult<Outcome> {
        self.enqueue(submission).await?.outcome().await
    }

    /// Queue a submission behind the earlier ones of its channel.
    ///
    /// Submissions queued in a given order are processed in that order even if
    /// their outcomes are awaited concurrently.
    pub async fn enqueue(&self, submission: Submission) -> EngineResult<PendingOutcome> {
        let server_id = submission.server_id;
        let ignored = PendingOutcome { server_id, rx: None };
        let Some((bound_server, mode)) = self.inner.route(submission.channel_id).await else {
            return Ok(ignored);
        };
        if bound_server != server_id {
            warn!(
                channel_id = submission.channel_id,
                server_id,
                "Submission from a channel bound to another server"
            );
            return Ok(ignored);
        }
        if self.inner.banned_members.read().await.contains(&submission.author) {
            debug!(author = submission.author, "Ignoring banned member");
            return Ok(ignored);
        }

        let (reply, rx) = oneshot::channel();
        self.inner
            .dispatch(server_id, mode, Job::Submit { submission, reply })
            .await?;
        Ok(PendingOutcome { server_id, rx: Some(rx) })
    }

    /// Restart the chain of a mode and forget its used words.
    ///
    /// Returns the number of used words removed. The high score is kept.
    pub async fn reset(&self, server_id: ServerId, mode: GameMode) -> EngineResult<u64> {
        let (reply, rx) = oneshot::channel();
        self.inner.dispatch(server_id, mode, Job::Reset { reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerGone { server_id })?
    }

    /// Make every running worker re-read its chain state from storage.
    pub(super) async fn reload_workers(&self) -> EngineResult<()> {
        let keys: Vec<WorkerKey> = self.inner.workers.lock().await.keys().copied().collect();
        for (server_id, mode) in keys {
            let (reply, rx) = oneshot::channel();
            self.inner.dispatch(server_id, mode, Job::Reload { reply }).await?;
            rx.await.map_err(|_| EngineError::WorkerGone { server_id })??;
        }
        Ok(())
    }

    /// Stop the workers of a server. Queued jobs are still processed.
    pub(super) async fn stop_workers(&self, server_id: ServerId) {
        self.inner.workers.lock().await.retain(|(id, _), _| *id != server_id);
    }

    /// Last committed chain state of a mode.
    pub async fn chain_state(&self, server_id: ServerId, mode: GameMode) -> EngineResult<ChainState> {
        Ok(self
            .inner
            .store
            .load_chain_state(server_id, mode)
            .await?
            .unwrap_or_else(|| ChainState::new(server_id, mode)))
    }
}

impl EngineInner {
    pub(super) async fn route(&self, channel_id: ChannelId) -> Option<WorkerKey> {
        self.routes.read().await.get(&channel_id).copied()
    }

    /// Languages a server plays in.
    pub(super) async fn languages_of(&self, server_id: ServerId) -> Vec<Language> {
        self.servers
            .read()
            .await
            .get(&server_id)
            .map(|server| server.languages.clone())
            .filter(|languages| !languages.is_empty())
            .unwrap_or_else(|| self.default_languages.clone())
    }

    async fn has_role(&self, server_id: ServerId, kind: RoleKind) -> bool {
        self.servers
            .read()
            .await
            .get(&server_id)
            .is_some_and(|server| server.role(kind).is_some())
    }

    /// Hand a job to the worker of (server, mode), starting it if needed.
    async fn dispatch(self: &Arc<Self>, server_id: ServerId, mode: GameMode, mut job: Job) -> EngineResult<()> {
        let mut workers = self.workers.lock().await;
        if let Some(tx) = workers.get(&(server_id, mode)) {
            match tx.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    warn!(server_id, %mode, "Channel worker stopped, restarting it");
                    job = returned;
                    workers.remove(&(server_id, mode));
                }
            }
        }

        let state = self
            .store
            .load_chain_state(server_id, mode)
            .await?
            .unwrap_or_else(|| ChainState::new(server_id, mode));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = ChannelWorker {
            inner: self.clone(),
            state,
            histories: HashMap::new(),
        };
        tokio::spawn(worker.run(rx));

        tx.send(job).map_err(|_| EngineError::WorkerGone { server_id })?;
        workers.insert((server_id, mode), tx);
        Ok(())
    }
}

/// Resolve configured reaction shortcodes to emoji.
fn resolve_reactions(configured: &HashMap<String, String>) -> HashMap<String, String> {
    configured
        .iter()
        .filter_map(|(word, code)| {
            let emoji = emojis::get_by_shortcode(code.trim_matches(':')).or_else(|| emojis::get(code));
            match emoji {
                Some(emoji) => Some((word.to_lowercase(), emoji.as_str().to_string())),
                None => {
                    warn!("Unknown emoji '{}' for special reaction on '{}'", code, word);
                    None
                }
            }
        })
        .collect()
}

/// Owner of one chain.
struct ChannelWorker {
    inner: Arc<EngineInner>,
    state: ChainState,
    /// Ending history of each player, rebuilt from scratch after a restart.
    histories: HashMap<PlayerId, RecentEndingHistory>,
}

impl ChannelWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        let server_id = self.state.server_id;
        let mode = self.state.mode;
        debug!(server_id, %mode, "Channel worker started");

        while let Some(job) = rx.recv().await {
            match job {
                Job::Submit { submission, reply } => {
                    let outcome = self.process(&submission).await;
                    self.inner.scheduler.notify_activity();
                    let _ = reply.send(outcome);
                }
                Job::Reset { reply } => {
                    let _ = reply.send(self.reset().await);
                }
                Job::Reload { reply } => {
                    let _ = reply.send(self.reload().await);
                }
            }
        }
        debug!(server_id, %mode, "Channel worker stopped");
    }

    async fn process(&mut self, submission: &Submission) -> Outcome {
        let word = submission.word();
        let author = submission.author;
        let languages = self.inner.languages_of(self.state.server_id).await;

        let verdict = self
            .inner
            .pipeline
            .validate(&word, author, &self.state, &languages)
            .await;
        let outcome = match verdict {
            Verdict::Ignored => Outcome::Ignored,
            Verdict::Rejected(reason) => Outcome::Rejected { word, reason },
            Verdict::Fault => Outcome::Fault { word },
            Verdict::Mistake(reason) => self.mistake(word, author, reason).await,
            Verdict::Accepted { language, looked_up } => self.accept(word, author, language, looked_up).await,
        };

        let latency = Utc::now() - submission.received_at;
        debug!(
            server_id = self.state.server_id,
            author,
            latency_ms = latency.num_milliseconds(),
            ?outcome,
            "Submission processed"
        );
        outcome
    }

    async fn accept(&mut self, word: String, author: PlayerId, language: Option<Language>, looked_up: bool) -> Outcome {
        let history_length = self.inner.settings.history_length;
        let recovery = self.inner.settings.failed_member_recovery;
        let announce_every = self.inner.settings.announce_every;

        let mut next = self.state.clone();
        // The count-based reaction is computed first so a new high score still
        // consumes its one-time marker under an override.
        let mut reaction = next.accept(&word, author);
        if let Some(emoji) = self.inner.special_reactions.get(&word) {
            reaction = Reaction::Custom(emoji.clone());
        }
        let recovered = next.record_recovery(author, recovery);

        let mut history = self
            .histories
            .get(&author)
            .cloned()
            .unwrap_or_else(|| RecentEndingHistory::new(history_length));
        let karma_delta = karma::score(&word, &mut history);

        if let Err(e) = self.commit_accept(&next, author, &word, karma_delta).await {
            error!(server_id = next.server_id, "Failed to record accepted word '{}': {}", word, e);
            return Outcome::Fault { word };
        }
        self.state = next;
        self.histories.insert(author, history);
        if looked_up {
            self.inner.pipeline.cache.stage(&word, language).await;
        }

        let count = self.state.count;
        info!(
            server_id = self.state.server_id,
            mode = %self.state.mode,
            author,
            count,
            "Accepted '{}'",
            word
        );
        Outcome::Accepted {
            word,
            reaction,
            count,
            karma_delta,
            milestone: announce_every > 0 && count % announce_every == 0,
            recovered,
        }
    }

    async fn commit_accept(&self, next: &ChainState, author: PlayerId, word: &str, karma_delta: f64) -> StoreResult<()> {
        let mut tx = self.inner.store.begin().await?;
        Store::record_accept(&mut tx, next.server_id, author, karma_delta).await?;
        Store::record_used_word(&mut tx, next.server_id, next.mode, word).await?;
        Store::save_chain_state(&mut tx, next).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mistake(&mut self, word: String, author: PlayerId, reason: MistakeReason) -> Outcome {
        let track_failed = self.inner.has_role(self.state.server_id, RoleKind::Failed).await;
        let penalty = self.inner.settings.mistake_penalty;

        let mut next = self.state.clone();
        let broken_at = next.count;
        next.fail(author, track_failed);

        if let Err(e) = self.commit_mistake(&next, author, penalty).await {
            error!(server_id = next.server_id, "Failed to record mistake '{}': {}", word, e);
            return Outcome::Fault { word };
        }
        self.state = next;

        info!(
            server_id = self.state.server_id,
            mode = %self.state.mode,
            author,
            broken_at,
            ?reason,
            "Chain broken by '{}'",
            word
        );
        Outcome::Mistake {
            word,
            reason,
            broken_at,
            high_score: self.state.high_score,
            restart_with: self.state.expected_prefix(),
        }
    }

    async fn commit_mistake(&self, next: &ChainState, author: PlayerId, penalty: f64) -> StoreResult<()> {
        let mut tx = self.inner.store.begin().await?;
        Store::record_mistake(&mut tx, next.server_id, author, penalty).await?;
        Store::save_chain_state(&mut tx, next).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset(&mut self) -> EngineResult<u64> {
        let server_id = self.state.server_id;
        let mode = self.state.mode;
        let cleared = self.inner.store.clear_used_words(server_id, mode).await?;

        let next = ChainState {
            high_score: self.state.high_score,
            failed_member: self.state.failed_member,
            failed_member_streak: self.state.failed_member_streak,
            ..ChainState::new(server_id, mode)
        };
        let mut tx = self.inner.store.begin().await?;
        Store::save_chain_state(&mut tx, &next).await?;
        tx.commit().await?;

        self.state = next;
        self.histories.clear();
        info!(server_id, %mode, cleared, "Chain reset");
        Ok(cleared)
    }

    async fn reload(&mut self) -> EngineResult<()> {
        let server_id = self.state.server_id;
        let mode = self.state.mode;
        self.state = self
            .inner
            .store
            .load_chain_state(server_id, mode)
            .await?
            .unwrap_or_else(|| ChainState::new(server_id, mode));
        self.histories.clear();
        Ok(())
    }
}
