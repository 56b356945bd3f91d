//! Gateway connection for the word-chain bot.
//!
//! Serenity callbacks only forward events into a channel. One loop consumes
//! them in arrival order together with role syncs from the engine.

use std::time::Duration;

use backon::BackoffBuilder;
use serenity::async_trait;
use serenity::http::HttpBuilder;
use serenity::model::channel::Message;
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::id::{ChannelId as DiscordChannelId, GuildId, MessageId};
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::chain::{GameEngine, RoleSync};
use crate::common::logging::LogControl;
use crate::config::Config;
use crate::discord::handler::GameHandler;
use crate::discord::roles::apply_role_sync;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session (re)established; restoration notices go out here.
    Ready { context: Context, ready: Ready },
    /// Guild joined or became available.
    GuildCreate { guild: Guild },
    /// Any channel message, game word or command.
    Message { context: Context, message: Message },
    MessageDeleted { context: Context, message_id: u64 },
    /// `content` is absent when the edit left the text alone, e.g. an embed update.
    MessageEdited {
        context: Context,
        message_id: u64,
        content: Option<String>,
    },
    Disconnected,
}

struct GatewayForwarder {
    gateway_tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl GatewayForwarder {
    fn new(gateway_tx: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self { gateway_tx }
    }

    fn forward(&self, event: GatewayEvent) {
        if let Err(error) = self.gateway_tx.send(event) {
            warn!("Gateway event dropped: {}", error);
        }
    }
}

#[async_trait]
impl EventHandler for GatewayForwarder {
    async fn ready(&self, context: Context, ready: Ready) {
        self.forward(GatewayEvent::Ready { context, ready });
    }

    async fn guild_create(&self, _context: Context, guild: Guild, _is_new: Option<bool>) {
        self.forward(GatewayEvent::GuildCreate { guild });
    }

    async fn message(&self, context: Context, message: Message) {
        self.forward(GatewayEvent::Message { context, message });
    }

    async fn message_delete(
        &self,
        context: Context,
        _channel_id: DiscordChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        self.forward(GatewayEvent::MessageDeleted {
            context,
            message_id: deleted_message_id.get(),
        });
    }

    async fn message_update(
        &self,
        context: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        self.forward(GatewayEvent::MessageEdited {
            context,
            message_id: event.id.get(),
            content: event.content,
        });
    }
}

/// Collects what the bot needs from the config and the engine.
pub struct DiscordBotBuilder {
    token: String,
    prefix: String,
    admin_guild_id: Option<u64>,
    engine: GameEngine,
    logs: LogControl,
    roles_rx: mpsc::UnboundedReceiver<RoleSync>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBotBuilder {
    pub fn new(
        config: &Config,
        engine: GameEngine,
        logs: LogControl,
        roles_rx: mpsc::UnboundedReceiver<RoleSync>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            token: config.discord.token.clone(),
            prefix: config.command_prefix().to_string(),
            admin_guild_id: config.discord.admin_guild_id,
            engine,
            logs,
            roles_rx,
            shutdown_rx,
        }
    }

    /// Create the serenity client. Fails on an invalid token or HTTP setup.
    pub async fn build(self) -> anyhow::Result<DiscordBot> {
        let (gateway_tx, gateway_rx) = mpsc::unbounded_channel::<GatewayEvent>();
        let client = build_client(&self.token, gateway_tx.clone()).await?;
        let handler = GameHandler::new(self.engine, self.logs, self.prefix, self.admin_guild_id);

        Ok(DiscordBot {
            client: Some(client),
            token: self.token,
            handler,
            gateway_rx,
            gateway_tx,
            roles_rx: self.roles_rx,
            shutdown_rx: self.shutdown_rx,
        })
    }
}

async fn build_client(token: &str, gateway_tx: mpsc::UnboundedSender<GatewayEvent>) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS;

    let http_client = reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()?;
    let http = HttpBuilder::new(token).client(http_client).build();

    Ok(serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(GatewayForwarder::new(gateway_tx))
        .await?)
}

/// Exponential backoff for Discord reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(MAX_RECONNECT_DELAY)
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

pub struct DiscordBot {
    client: Option<Client>,
    token: String,
    handler: GameHandler,
    gateway_rx: mpsc::UnboundedReceiver<GatewayEvent>,
    gateway_tx: mpsc::UnboundedSender<GatewayEvent>,
    roles_rx: mpsc::UnboundedReceiver<RoleSync>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    pub async fn run(mut self) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::select! {
            _ = Self::keep_connected(&mut self.client, &self.token, &self.gateway_tx) => {},
            _ = Self::event_loop(
                &mut self.gateway_rx,
                &self.handler,
                &mut self.roles_rx,
                &mut self.shutdown_rx,
            ) => {},
            _ = async {
                loop {
                    if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                if let Some(ref manager) = shard_manager {
                    info!("Closing gateway shards...");
                    manager.shutdown_all().await;
                    info!("Gateway shards closed");
                }
            } => {}
        }
        info!("Bot stopped");
    }

    /// Keep the gateway connection up. A client that fails to start is
    /// rebuilt after a backoff delay; a clean stop ends the loop.
    async fn keep_connected(
        client: &mut Option<Client>,
        token: &str,
        gateway_tx: &mpsc::UnboundedSender<GatewayEvent>,
    ) {
        let mut backoff = discord_backoff();
        let mut next_delay = move |reset: bool| {
            if reset {
                backoff = discord_backoff();
                return Duration::ZERO;
            }
            backoff.next().unwrap_or(MAX_RECONNECT_DELAY)
        };

        loop {
            let mut current = match client.take() {
                Some(current) => current,
                None => match build_client(token, gateway_tx.clone()).await {
                    Ok(rebuilt) => {
                        next_delay(true);
                        rebuilt
                    }
                    Err(e) => {
                        let delay = next_delay(false);
                        error!("Failed to rebuild Discord client, retrying in {:.1}s: {}", delay.as_secs_f64(), e);
                        sleep(delay).await;
                        continue;
                    }
                },
            };

            info!("Opening gateway session...");
            let result = current.start().await;
            if gateway_tx.send(GatewayEvent::Disconnected).is_err() {
                debug!("Event processing already stopped");
            }
            match result {
                Ok(()) => {
                    info!("Gateway session ended");
                    break;
                }
                Err(e) => {
                    let delay = next_delay(false);
                    warn!("Discord client error: {}. Reconnecting in {:.1}s...", e, delay.as_secs_f64());
                    sleep(delay).await;
                }
            }
        }
    }

    async fn event_loop(
        gateway_rx: &mut mpsc::UnboundedReceiver<GatewayEvent>,
        handler: &GameHandler,
        roles_rx: &mut mpsc::UnboundedReceiver<RoleSync>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut live_context: Option<Context> = None;

        loop {
            tokio::select! {
                event = gateway_rx.recv() => {
                    match event {
                        Some(GatewayEvent::Ready { context, ready }) => {
                            let handler = handler.clone();
                            let notice_context = context.clone();
                            tokio::spawn(async move {
                                handler.handle_ready(&notice_context, &ready).await;
                            });
                            live_context = Some(context);
                        }
                        Some(GatewayEvent::GuildCreate { guild }) => {
                            handler.handle_guild_create(&guild).await;
                        }
                        Some(GatewayEvent::Message { context, message }) => {
                            handler.handle_message(context, message).await;
                        }
                        Some(GatewayEvent::MessageDeleted { context, message_id }) => {
                            handler.handle_message_delete(&context, message_id).await;
                        }
                        Some(GatewayEvent::MessageEdited { context, message_id, content }) => {
                            handler.handle_message_edit(&context, message_id, content.as_deref()).await;
                        }
                        Some(GatewayEvent::Disconnected) => {
                            live_context = None;
                        }
                        None => {
                            debug!("Gateway event channel closed");
                            break;
                        }
                    }
                }

                // Role holders from the maintenance flush (drop if not connected)
                sync = roles_rx.recv() => {
                    match sync {
                        Some(sync) => {
                            if let Some(ref context) = live_context {
                                let context = context.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = apply_role_sync(&context, &sync).await {
                                        error!(server_id = sync.server_id, "Role sync failed: {:#}", e);
                                    }
                                });
                            } else {
                                debug!("Dropping role sync - Discord not connected");
                            }
                        }
                        None => {
                            warn!("Role sync channel closed");
                            break;
                        }
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Stopping event loop");
                        break;
                    }
                }
            }
        }
    }
}
