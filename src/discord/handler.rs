//! Discord message event handling.
//!
//! Game messages are queued on the engine in arrival order. Their outcomes,
//! and commands, are then handled in spawned tasks so a slow dictionary
//! lookup in one channel does not hold up the others.
//!
//! Processed words are remembered by message id for a while, so a player who
//! deletes or edits one can be called out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serenity::model::channel::{Message, ReactionType};
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, Member};
use serenity::model::id::ChannelId as DiscordChannelId;
use serenity::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chain::state::ChainState;
use crate::chain::{GameEngine, MistakeReason, Outcome, SoftRejection, Submission};
use crate::common::logging::LogControl;
use crate::common::{ChannelId, PlayerId};
use crate::discord::commands::{parse_command, Command, CommandHandler, Invocation, Permission, Reply};

/// Processed words remembered for the edit and deletion notices.
const RECENT_WORDS: usize = 1000;

/// What to show for an outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    pub reaction: Option<String>,
    pub reply: Option<String>,
}

const WARNING: &str = "⚠️";
const BROKEN: &str = "❌";

/// Reaction and reply for a processed submission.
pub fn present(outcome: &Outcome, mention: &str) -> Presentation {
    match outcome {
        Outcome::Ignored => Presentation::default(),
        Outcome::Rejected { word, reason } => {
            let why = match reason {
                SoftRejection::TooShort => "Single-letter inputs are not accepted.".to_string(),
                SoftRejection::Blacklisted => "This word has been **blacklisted**. Please do not use it.".to_string(),
                SoftRejection::Repeated => format!("The word *{}* has already been used before.", word),
            };
            Presentation {
                reaction: Some(WARNING.to_string()),
                reply: Some(format!(
                    "{}\nThe chain has **not** been broken. Please enter another word.",
                    why
                )),
            }
        }
        Outcome::Fault { .. } => Presentation {
            reaction: Some(WARNING.to_string()),
            reply: Some(
                ":octagonal_sign: There was an issue in the backend.\nThe above entered word is **NOT** being taken into account."
                    .to_string(),
            ),
        },
        Outcome::Mistake {
            reason,
            broken_at,
            high_score,
            restart_with,
            ..
        } => {
            let why = match reason {
                MistakeReason::SameHolder => "You cannot send two words in a row!".to_string(),
                MistakeReason::WrongStart { expected } => {
                    format!("The word you entered did not begin with **{}**.", expected)
                }
                MistakeReason::NotAWord => "The word you entered does not exist.".to_string(),
            };
            let mut reply = format!("{} messed up the chain! *{}*\n", mention, why);
            if *broken_at > 0 {
                reply.push_str(&format!("The chain length was {} when it was broken. :sob:\n", broken_at));
            }
            match restart_with {
                Some(start) => reply.push_str(&format!(
                    "Restart with a word starting with **{}** and try to beat the current high score of **{}**!",
                    start, high_score
                )),
                None => reply.push_str(&format!(
                    "Restart and try to beat the current high score of **{}**!",
                    high_score
                )),
            }
            Presentation {
                reaction: Some(BROKEN.to_string()),
                reply: Some(reply),
            }
        }
        Outcome::Accepted {
            reaction,
            count,
            milestone,
            ..
        } => Presentation {
            reaction: Some(reaction.emoji().to_string()),
            reply: milestone.then(|| format!("{} words! Nice work, keep it up!", count)),
        },
    }
}

/// How a processed word was changed after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordChange {
    Deleted,
    Edited,
}

/// Notice restating the last valid word after a processed word was changed.
pub fn changed_word_notice(change: WordChange, mention: &str, state: &ChainState) -> String {
    let verb = match change {
        WordChange::Deleted => "deleted",
        WordChange::Edited => "edited",
    };
    match &state.current_word {
        Some(word) => format!(
            "{} {} their word! The **last** word was **{}**.",
            mention, verb, word
        ),
        None => format!("{} {} their word!", mention, verb),
    }
}

/// A word the engine has processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedWord {
    pub channel_id: ChannelId,
    pub author: PlayerId,
    pub word: String,
}

/// Bounded memory of processed words keyed by message id, oldest evicted first.
#[derive(Debug)]
pub struct RecentWords {
    order: VecDeque<u64>,
    words: HashMap<u64, ProcessedWord>,
    capacity: usize,
}

impl RecentWords {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            words: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&mut self, message_id: u64, word: ProcessedWord) {
        if self.words.insert(message_id, word).is_some() {
            return;
        }
        self.order.push_back(message_id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.words.remove(&evicted);
            }
        }
    }

    /// Forget a deleted message.
    pub fn take(&mut self, message_id: u64) -> Option<ProcessedWord> {
        let word = self.words.remove(&message_id)?;
        self.order.retain(|id| *id != message_id);
        Some(word)
    }

    /// The word of an edited message, unless the edit left it unchanged.
    pub fn edited(&mut self, message_id: u64, content: &str) -> Option<ProcessedWord> {
        let word = self.words.get(&message_id)?;
        if word.word == content.trim().to_lowercase() {
            return None;
        }
        self.take(message_id)
    }
}

/// Notice posted in a bound channel when the bot comes online.
pub fn restoration_notice(state: &ChainState) -> String {
    let mut notice = String::from("**I'm now online!**");
    if state.high_score > 0 {
        notice.push_str(&format!(
            "\n\n:fire: Let's beat the high score of {}! :fire:",
            state.high_score
        ));
    }
    if let Some(word) = &state.current_word {
        notice.push_str(&format!("\nLast valid word: **{}**", word));
        if let Some(member) = state.last_member {
            notice.push_str(&format!("\nLast input by <@{}>", member));
        }
    }
    notice
}

#[allow(deprecated)]
fn can_manage(guild: &Guild, member: &Member) -> bool {
    let permissions = guild.member_permissions(member);
    permissions.administrator() || permissions.manage_guild()
}

/// Permission level of the author of `message`.
fn permission_of(ctx: &Context, message: &Message, admin_guild_id: Option<u64>) -> Permission {
    let Some(guild) = message.guild(&ctx.cache) else {
        return Permission::Anyone;
    };
    let manages = guild.owner_id == message.author.id
        || guild
            .members
            .get(&message.author.id)
            .is_some_and(|member| can_manage(&guild, member));
    if !manages {
        Permission::Anyone
    } else if admin_guild_id == Some(guild.id.get()) {
        Permission::BotAdmin
    } else {
        Permission::ServerAdmin
    }
}

/// Discord side of the game.
#[derive(Clone)]
pub struct GameHandler {
    engine: GameEngine,
    commands: CommandHandler,
    admin_guild_id: Option<u64>,
    recent: Arc<Mutex<RecentWords>>,
}

impl GameHandler {
    pub fn new(engine: GameEngine, logs: LogControl, prefix: String, admin_guild_id: Option<u64>) -> Self {
        Self {
            commands: CommandHandler::new(engine.clone(), logs, prefix),
            engine,
            admin_guild_id,
            recent: Arc::new(Mutex::new(RecentWords::new(RECENT_WORDS))),
        }
    }

    /// Post the restoration notice in every bound channel.
    pub async fn handle_ready(&self, ctx: &Context, ready: &Ready) {
        info!("Discord bot connected as {} ({} guilds)", ready.user.name, ready.guilds.len());
        let channels = match self.engine.bound_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                error!("Failed to load bound channels: {}", e);
                return;
            }
        };
        for (channel_id, state) in channels {
            let notice = restoration_notice(&state);
            if let Err(e) = DiscordChannelId::new(channel_id).say(&ctx.http, notice).await {
                warn!(channel_id, "Failed to post restoration notice: {}", e);
            }
        }
    }

    pub async fn handle_guild_create(&self, guild: &Guild) {
        debug!("Received guild data for '{}'", guild.name);
        if let Err(e) = self.engine.register_server(guild.id.get()).await {
            error!(server_id = guild.id.get(), "Failed to register server: {}", e);
        }
    }

    pub async fn handle_message(&self, ctx: Context, message: Message) {
        if message.author.bot {
            return;
        }
        let Some(guild_id) = message.guild_id else {
            return;
        };
        let content = message.content.trim();
        if content.is_empty() {
            return;
        }

        if let Some(parsed) = parse_command(self.commands.prefix(), content) {
            let permission = permission_of(&ctx, &message, self.admin_guild_id);
            let commands = self.commands.clone();
            tokio::spawn(async move {
                if let Err(e) = run_command(&commands, &ctx, &message, parsed, permission).await {
                    error!("Command handler error: {:#}", e);
                }
            });
            return;
        }

        let submission = Submission::new(
            guild_id.get(),
            message.channel_id.get(),
            message.author.id.get(),
            content,
        );
        let processed = ProcessedWord {
            channel_id: submission.channel_id,
            author: submission.author,
            word: submission.word(),
        };
        match self.engine.enqueue(submission).await {
            Ok(pending) => {
                let recent = self.recent.clone();
                tokio::spawn(async move {
                    match pending.outcome().await {
                        Ok(Outcome::Ignored) => {}
                        Ok(outcome) => {
                            recent.lock().await.insert(message.id.get(), processed);
                            show(&ctx, &message, &outcome).await;
                        }
                        Err(e) => error!("Failed to process word: {}", e),
                    }
                });
            }
            Err(e) => error!("Failed to queue word: {}", e),
        }
    }

    pub async fn handle_message_delete(&self, ctx: &Context, message_id: u64) {
        let Some(word) = self.recent.lock().await.take(message_id) else {
            return;
        };
        self.notify_change(ctx, WordChange::Deleted, word).await;
    }

    /// `content` is the new text, absent when the edit did not touch it.
    pub async fn handle_message_edit(&self, ctx: &Context, message_id: u64, content: Option<&str>) {
        let Some(content) = content else {
            return;
        };
        let Some(word) = self.recent.lock().await.edited(message_id, content) else {
            return;
        };
        self.notify_change(ctx, WordChange::Edited, word).await;
    }

    async fn notify_change(&self, ctx: &Context, change: WordChange, word: ProcessedWord) {
        let state = match self.engine.channel_state(word.channel_id).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                error!(channel_id = word.channel_id, "Failed to load chain state: {}", e);
                return;
            }
        };
        debug!(channel_id = word.channel_id, author = word.author, ?change, "Processed word changed");
        let notice = changed_word_notice(change, &format!("<@{}>", word.author), &state);
        if let Err(e) = DiscordChannelId::new(word.channel_id).say(&ctx.http, notice).await {
            warn!(channel_id = word.channel_id, "Failed to post change notice: {}", e);
        }
    }
}

async fn run_command(
    commands: &CommandHandler,
    ctx: &Context,
    message: &Message,
    parsed: Result<Command, &'static str>,
    permission: Permission,
) -> anyhow::Result<()> {
    let reply = match parsed {
        Err(usage) => format!("Usage: `{}{}`", commands.prefix(), usage),
        Ok(command) if command.permission() > permission => {
            info!(
                author = message.author.id.get(),
                ?command,
                "Refused command without permission"
            );
            "You are not allowed to use this command.".to_string()
        }
        Ok(command) => {
            let invocation = Invocation {
                server_id: message.guild_id.map(|id| id.get()).unwrap_or_default(),
                channel_id: message.channel_id.get(),
                author: message.author.id.get(),
            };
            match commands.execute(command, invocation).await? {
                Reply::Text(text) => text,
                Reply::Broadcast { channels, message: text } => broadcast(ctx, &channels, &text).await,
            }
        }
    };
    message.channel_id.say(&ctx.http, reply).await?;
    Ok(())
}

/// Post `text` in every channel and summarize the delivery.
async fn broadcast(ctx: &Context, channels: &[ChannelId], text: &str) -> String {
    let mut sent = 0;
    let mut failed = 0;
    for &channel_id in channels {
        match DiscordChannelId::new(channel_id).say(&ctx.http, text).await {
            Ok(_) => sent += 1,
            Err(e) => {
                error!(channel_id, "Failed to deliver announcement: {}", e);
                failed += 1;
            }
        }
    }
    info!(sent, failed, "Announcement delivered");
    format!("Announcement sent to {} channels, {} failed.", sent, failed)
}

async fn show(ctx: &Context, message: &Message, outcome: &Outcome) {
    let mention = format!("<@{}>", message.author.id.get());
    let presentation = present(outcome, &mention);
    if let Some(emoji) = presentation.reaction {
        if let Err(e) = message.react(&ctx.http, ReactionType::Unicode(emoji)).await {
            warn!("Failed to react to word: {}", e);
        }
    }
    if let Some(reply) = presentation.reply {
        if let Err(e) = message.channel_id.say(&ctx.http, reply).await {
            warn!("Failed to send reply: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Reaction;
    use crate::common::GameMode;

    #[test]
    fn test_present_accepted_with_milestone() {
        let outcome = Outcome::Accepted {
            word: "tiger".to_string(),
            reaction: Reaction::Special(100),
            count: 100,
            karma_delta: 0.4,
            milestone: true,
            recovered: false,
        };
        let presentation = present(&outcome, "<@1>");
        assert_eq!(presentation.reaction.as_deref(), Some("💯"));
        assert_eq!(presentation.reply.as_deref(), Some("100 words! Nice work, keep it up!"));
    }

    #[test]
    fn test_present_soft_rejection() {
        let outcome = Outcome::Rejected {
            word: "tiger".to_string(),
            reason: SoftRejection::Repeated,
        };
        let presentation = present(&outcome, "<@1>");
        assert_eq!(presentation.reaction.as_deref(), Some(WARNING));
        let reply = presentation.reply.unwrap();
        assert!(reply.contains("*tiger* has already been used"));
        assert!(reply.contains("**not** been broken"));
    }

    #[test]
    fn test_present_mistake() {
        let outcome = Outcome::Mistake {
            word: "cat".to_string(),
            reason: MistakeReason::WrongStart {
                expected: "e".to_string(),
            },
            broken_at: 4,
            high_score: 10,
            restart_with: Some("e".to_string()),
        };
        let presentation = present(&outcome, "<@7>");
        assert_eq!(presentation.reaction.as_deref(), Some(BROKEN));
        let reply = presentation.reply.unwrap();
        assert!(reply.starts_with("<@7> messed up the chain!"));
        assert!(reply.contains("The chain length was 4"));
        assert!(reply.contains("starting with **e**"));

        let first_word = Outcome::Mistake {
            word: "qzx".to_string(),
            reason: MistakeReason::NotAWord,
            broken_at: 0,
            high_score: 3,
            restart_with: None,
        };
        let reply = present(&first_word, "<@7>").reply.unwrap();
        assert!(!reply.contains("chain length"));
        assert!(reply.ends_with("Restart and try to beat the current high score of **3**!"));
    }

    #[test]
    fn test_present_ignored_and_fault() {
        assert_eq!(present(&Outcome::Ignored, "<@1>"), Presentation::default());
        let fault = present(&Outcome::Fault { word: "zz".to_string() }, "<@1>");
        assert_eq!(fault.reaction.as_deref(), Some(WARNING));
        assert!(fault.reply.unwrap().contains("**NOT** being taken into account"));
    }

    #[test]
    fn test_restoration_notice() {
        let idle = ChainState::new(1, GameMode::Normal);
        assert_eq!(restoration_notice(&idle), "**I'm now online!**");

        let state = ChainState {
            current_word: Some("apple".to_string()),
            last_member: Some(5),
            high_score: 12,
            count: 3,
            ..ChainState::new(1, GameMode::Normal)
        };
        let notice = restoration_notice(&state);
        assert!(notice.contains("high score of 12"));
        assert!(notice.contains("Last valid word: **apple**"));
        assert!(notice.ends_with("Last input by <@5>"));
    }

    fn processed(word: &str) -> ProcessedWord {
        ProcessedWord {
            channel_id: 555,
            author: 7,
            word: word.to_string(),
        }
    }

    #[test]
    fn test_changed_word_notice() {
        let state = ChainState {
            current_word: Some("apple".to_string()),
            ..ChainState::new(1, GameMode::Normal)
        };
        assert_eq!(
            changed_word_notice(WordChange::Deleted, "<@7>", &state),
            "<@7> deleted their word! The **last** word was **apple**."
        );
        assert_eq!(
            changed_word_notice(WordChange::Edited, "<@7>", &ChainState::new(1, GameMode::Normal)),
            "<@7> edited their word!"
        );
    }

    #[test]
    fn test_recent_words_edit_and_delete() {
        let mut recent = RecentWords::new(10);
        recent.insert(1, processed("apple"));
        recent.insert(2, processed("eagle"));

        assert_eq!(recent.edited(1, "  APPLE "), None);
        assert_eq!(recent.edited(1, "apples"), Some(processed("apple")));
        assert_eq!(recent.take(1), None);

        assert_eq!(recent.take(2), Some(processed("eagle")));
        assert_eq!(recent.take(3), None);
    }

    #[test]
    fn test_recent_words_are_bounded() {
        let mut recent = RecentWords::new(2);
        recent.insert(1, processed("apple"));
        recent.insert(2, processed("eagle"));
        recent.insert(3, processed("elk"));

        assert_eq!(recent.take(1), None);
        assert!(recent.take(2).is_some());
        assert!(recent.take(3).is_some());
    }
}
