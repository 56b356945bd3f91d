//! Text commands (!check, !stats, !leaderboard, etc).
//!
//! Parsing and execution do not depend on serenity: a command is parsed from
//! the message text, checked against the caller's permission level by the
//! handler and executed against the engine, producing the reply text.

use std::fmt::Write;

use tracing::{debug, info};

use crate::chain::state::ChainPhase;
use crate::chain::{GameEngine, WordCheck};
use crate::common::error::EngineError;
use crate::common::logging::LogControl;
use crate::common::{
    ChannelId, GameMode, InsertResult, ListKind, PlayerId, RemoveResult, RoleId, RoleKind, ServerId,
};
use crate::store::LeaderboardMetric;

/// Longest message still parsed as a command, announcements excepted.
const MAX_COMMAND_LENGTH: usize = 200;

/// Servers listed by `!servers` before the list is cut short.
const MAX_LISTED_SERVERS: usize = 40;

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    Anyone,
    /// Members allowed to manage the server.
    ServerAdmin,
    /// Server admins of the configured admin guild.
    BotAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    Add(String),
    Remove(String),
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanTarget {
    Servers,
    Users,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Check { word: String },
    Stats { member: Option<PlayerId> },
    ServerStats,
    Leaderboard { metric: LeaderboardMetric, global: bool },
    TopServers { mode: GameMode },
    SetChannel { mode: GameMode },
    SetRole { kind: RoleKind, role: RoleId },
    UnsetRole { kind: RoleKind },
    List { kind: ListKind, action: ListAction },
    Languages { codes: Option<String> },
    Reset { mode: GameMode },
    PurgeServer { server_id: ServerId },
    PurgeMember { member_id: PlayerId },
    BanServer { server_id: ServerId, banned: bool },
    BanMember { member_id: PlayerId, banned: bool },
    Flush,
    Uncache { word: String },
    Banned { target: BanTarget },
    Servers,
    Announce { message: String },
    /// Show the log filter, or replace it with new directives.
    LogLevel { directives: Option<String> },
}

/// Result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Post `message` in every channel and report back to the caller.
    Broadcast { channels: Vec<ChannelId>, message: String },
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl Command {
    pub fn permission(&self) -> Permission {
        match self {
            Command::Help
            | Command::Check { .. }
            | Command::Stats { .. }
            | Command::ServerStats
            | Command::Leaderboard { .. }
            | Command::TopServers { .. }
            | Command::Languages { codes: None }
            | Command::List {
                action: ListAction::Show,
                ..
            } => Permission::Anyone,
            Command::SetChannel { .. }
            | Command::SetRole { .. }
            | Command::UnsetRole { .. }
            | Command::List { .. }
            | Command::Languages { .. }
            | Command::Reset { .. } => Permission::ServerAdmin,
            Command::PurgeServer { .. }
            | Command::PurgeMember { .. }
            | Command::BanServer { .. }
            | Command::BanMember { .. }
            | Command::Flush
            | Command::Uncache { .. }
            | Command::Banned { .. }
            | Command::Servers
            | Command::Announce { .. }
            | Command::LogLevel { .. } => Permission::BotAdmin,
        }
    }
}

/// Where and by whom a command was sent.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub author: PlayerId,
}

/// Parse `content` as a command.
///
/// Returns `None` when the text is not a command at all, and `Some(Err(usage))`
/// for a known command with bad arguments.
pub fn parse_command(prefix: &str, content: &str) -> Option<Result<Command, &'static str>> {
    let body = content.strip_prefix(prefix)?;
    if let Some(message) = strip_name(body, "announce") {
        let message = message.trim();
        return Some(if message.is_empty() {
            Err("announce <message>")
        } else {
            Ok(Command::Announce {
                message: message.to_string(),
            })
        });
    }
    if content.len() > MAX_COMMAND_LENGTH {
        return None;
    }
    let mut args = body.split_whitespace();
    let name = args.next()?.to_lowercase();
    let args: Vec<&str> = args.collect();

    let command = match name.as_str() {
        "help" => Ok(Command::Help),
        "check" => match args.as_slice() {
            [word] => Ok(Command::Check { word: word.to_string() }),
            _ => Err("check <word>"),
        },
        "stats" => match args.as_slice() {
            [] => Ok(Command::Stats { member: None }),
            [member] => parse_mention(member, "@")
                .map(|id| Command::Stats { member: Some(id) })
                .ok_or("stats [@member]"),
            _ => Err("stats [@member]"),
        },
        "serverstats" => Ok(Command::ServerStats),
        "leaderboard" | "lb" => parse_leaderboard(&args),
        "topservers" => parse_mode(args.first())
            .map(|mode| Command::TopServers { mode })
            .ok_or("topservers [normal|hard]"),
        "setchannel" => parse_mode(args.first())
            .map(|mode| Command::SetChannel { mode })
            .ok_or("setchannel [normal|hard]"),
        "setrole" => match args.as_slice() {
            [kind, role] => match (RoleKind::parse(kind), parse_mention(role, "@&")) {
                (Some(kind), Some(role)) => Ok(Command::SetRole { kind, role }),
                _ => Err("setrole <reliable|failed> <@role>"),
            },
            _ => Err("setrole <reliable|failed> <@role>"),
        },
        "unsetrole" => args
            .first()
            .and_then(|kind| RoleKind::parse(kind))
            .map(|kind| Command::UnsetRole { kind })
            .ok_or("unsetrole <reliable|failed>"),
        "blacklist" => parse_list(ListKind::Blacklist, &args).ok_or("blacklist <add|remove> <word> | blacklist show"),
        "whitelist" => parse_list(ListKind::Whitelist, &args).ok_or("whitelist <add|remove> <word> | whitelist show"),
        "languages" => Ok(Command::Languages {
            codes: (!args.is_empty()).then(|| args.join(",")),
        }),
        "reset" => parse_mode(args.first())
            .map(|mode| Command::Reset { mode })
            .ok_or("reset [normal|hard]"),
        "purge" => match args.as_slice() {
            ["server", id] => id
                .parse()
                .map(|server_id| Command::PurgeServer { server_id })
                .map_err(|_| "purge <server|user> <id>"),
            ["user", id] => parse_mention(id, "@")
                .map(|member_id| Command::PurgeMember { member_id })
                .ok_or("purge <server|user> <id>"),
            _ => Err("purge <server|user> <id>"),
        },
        "ban" | "unban" => {
            let banned = name == "ban";
            match args.as_slice() {
                ["server", id] => id
                    .parse()
                    .map(|server_id| Command::BanServer { server_id, banned })
                    .map_err(|_| "ban|unban <server|user> <id>"),
                ["user", id] => parse_mention(id, "@")
                    .map(|member_id| Command::BanMember { member_id, banned })
                    .ok_or("ban|unban <server|user> <id>"),
                _ => Err("ban|unban <server|user> <id>"),
            }
        }
        "flush" => Ok(Command::Flush),
        "uncache" => match args.as_slice() {
            [word] => Ok(Command::Uncache { word: word.to_string() }),
            _ => Err("uncache <word>"),
        },
        "banned" => match args.as_slice() {
            ["servers"] => Ok(Command::Banned {
                target: BanTarget::Servers,
            }),
            ["users"] => Ok(Command::Banned {
                target: BanTarget::Users,
            }),
            _ => Err("banned <servers|users>"),
        },
        "servers" => Ok(Command::Servers),
        "loglevel" => Ok(Command::LogLevel {
            directives: (!args.is_empty()).then(|| args.join(",")),
        }),
        _ => return None,
    };
    Some(command)
}

/// The text after command `name`, matched case-insensitively.
fn strip_name<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let body = body.trim_start();
    let (head, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    head.eq_ignore_ascii_case(name).then_some(rest)
}

/// Parse a raw id or a mention such as `<@123>`, `<@!123>` or `<@&123>`.
fn parse_mention(text: &str, sigil: &str) -> Option<u64> {
    if let Ok(id) = text.parse() {
        return Some(id);
    }
    let inner = text.strip_prefix('<')?.strip_suffix('>')?.strip_prefix(sigil)?;
    inner.trim_start_matches('!').parse().ok()
}

fn parse_mode(arg: Option<&&str>) -> Option<GameMode> {
    match arg {
        None => Some(GameMode::Normal),
        Some(mode) => GameMode::parse(mode),
    }
}

fn parse_leaderboard(args: &[&str]) -> Result<Command, &'static str> {
    let mut metric = LeaderboardMetric::Score;
    let mut global = false;
    for arg in args {
        if arg.eq_ignore_ascii_case("global") {
            global = true;
        } else if let Some(parsed) = LeaderboardMetric::parse(arg) {
            metric = parsed;
        } else {
            return Err("leaderboard [score|karma] [global]");
        }
    }
    Ok(Command::Leaderboard { metric, global })
}

fn parse_list(kind: ListKind, args: &[&str]) -> Option<Command> {
    let action = match args {
        ["show"] | [] => ListAction::Show,
        ["add", word] => ListAction::Add(word.to_string()),
        ["remove", word] => ListAction::Remove(word.to_string()),
        _ => return None,
    };
    Some(Command::List { kind, action })
}

pub const HELP_TEXT: &str = r#"**Word chain commands:**
• `!check <word>` - Check whether a word can be played
• `!stats [@member]` - Show player statistics
• `!serverstats` - Show the chains of this server
• `!leaderboard [score|karma] [global]` - Show the top players
• `!topservers [normal|hard]` - Show the servers with the highest scores
• `!languages` - Show the languages of this server
• `!blacklist show` / `!whitelist show` - Show the server word lists
**Server admins:**
• `!setchannel [normal|hard]` - Play in this channel
• `!setrole <reliable|failed> <@role>` / `!unsetrole <reliable|failed>`
• `!blacklist <add|remove> <word>` / `!whitelist <add|remove> <word>`
• `!languages <codes>` - Set the languages, e.g. `!languages en de`
• `!reset [normal|hard]` - Restart a chain and forget its used words
**Bot admins:**
• `!purge`, `!ban`, `!unban <server|user> <id>` / `!banned <servers|users>`
• `!servers` / `!announce <message>` / `!loglevel [directives]`
• `!flush` / `!uncache <word>`"#;

/// Executes parsed commands against the engine.
#[derive(Clone)]
pub struct CommandHandler {
    engine: GameEngine,
    logs: LogControl,
    prefix: String,
}

impl CommandHandler {
    pub fn new(engine: GameEngine, logs: LogControl, prefix: String) -> Self {
        Self { engine, logs, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run a command and build the reply.
    pub async fn execute(&self, command: Command, invocation: Invocation) -> anyhow::Result<Reply> {
        debug!(?command, server_id = invocation.server_id, "Executing command");
        let engine = &self.engine;
        let server_id = invocation.server_id;

        let reply = match command {
            Command::Help => HELP_TEXT.replace('!', &self.prefix),
            Command::Check { word } => match engine.check_word(server_id, &word).await {
                Ok(check) => describe_check(&word.to_lowercase(), check),
                Err(EngineError::Store(e)) => return Err(e.into()),
                Err(e) => e.to_string(),
            },
            Command::Stats { member } => {
                let member = member.unwrap_or(invocation.author);
                match engine.player_stats(server_id, member).await? {
                    Some(stats) => {
                        let record = &stats.record;
                        let accuracy = record
                            .accuracy()
                            .map(|a| format!("{:.2}%", a * 100.0))
                            .unwrap_or_else(|| "-".to_string());
                        format!(
                            "**Stats for <@{}>**\nScore: {} (#{})\nKarma: {:.2} (#{})\nCorrect: {}\nWrong: {}\nAccuracy: {}",
                            member,
                            record.score,
                            stats.score_rank,
                            record.karma,
                            stats.karma_rank,
                            record.correct,
                            record.wrong,
                            accuracy
                        )
                    }
                    None => format!("<@{}> has never played in this server.", member),
                }
            }
            Command::ServerStats => {
                let states = engine.server_stats(server_id).await?;
                if states.is_empty() {
                    "No chain has been played in this server yet.".to_string()
                } else {
                    let mut text = String::from("**Server stats**");
                    for state in states {
                        let streak = match state.phase() {
                            ChainPhase::Idle => "no running chain".to_string(),
                            ChainPhase::Active => format!("current count {}", state.count),
                        };
                        let _ = write!(
                            text,
                            "\n{}: {}, high score {}, last word {}",
                            state.mode,
                            streak,
                            state.high_score,
                            state.current_word.as_deref().unwrap_or("-")
                        );
                    }
                    text
                }
            }
            Command::Leaderboard { metric, global } => {
                let scope = (!global).then_some(server_id);
                let rows = engine.leaderboard(metric, scope).await?;
                let title = format!(
                    "**Top players by {}{}**",
                    match metric {
                        LeaderboardMetric::Score => "score",
                        LeaderboardMetric::Karma => "karma",
                    },
                    if global { " (global)" } else { "" }
                );
                format_board(&title, rows.iter().map(|(id, value)| {
                    let value = match metric {
                        LeaderboardMetric::Score => format!("{}", *value as i64),
                        LeaderboardMetric::Karma => format!("{:.2}", value),
                    };
                    format!("<@{}>: {}", id, value)
                }))
            }
            Command::TopServers { mode } => {
                let rows = engine.top_servers(mode).await?;
                format_board(
                    &format!("**Top servers ({})**", mode),
                    rows.iter().map(|(id, high)| format!("{}: {}", id, high)),
                )
            }
            Command::SetChannel { mode } => {
                engine.bind_channel(server_id, mode, invocation.channel_id).await?;
                format!("The {} word chain is now played in <#{}>.", mode, invocation.channel_id)
            }
            Command::SetRole { kind, role } => {
                engine.set_role(server_id, kind, Some(role)).await?;
                format!("The {} was set to <@&{}>.", kind, role)
            }
            Command::UnsetRole { kind } => {
                let had_role = engine
                    .server(server_id)
                    .await
                    .is_some_and(|server| server.role(kind).is_some());
                engine.set_role(server_id, kind, None).await?;
                if had_role {
                    format!("The {} was removed.", kind)
                } else {
                    format!("The {} was already removed.", kind)
                }
            }
            Command::List { kind, action } => self.list(server_id, kind, action).await?,
            Command::Languages { codes: None } => {
                let languages = engine.languages(server_id).await;
                format!("Languages of this server: {}", join_languages(&languages))
            }
            Command::Languages { codes: Some(codes) } => match engine.set_languages(server_id, &codes).await {
                Ok(languages) => format!("Languages set to {}.", join_languages(&languages)),
                Err(EngineError::Store(e)) => return Err(e.into()),
                Err(e) => e.to_string(),
            },
            Command::Reset { mode } => {
                let removed = engine.reset(server_id, mode).await?;
                info!(server_id, %mode, removed, "Chain reset by {}", invocation.author);
                format!("The {} chain was reset and {} used words were forgotten.", mode, removed)
            }
            Command::PurgeServer { server_id } => {
                let report = engine.purge_server(server_id).await?;
                if report.rows > 0 {
                    format!("Removed data for server {}.", server_id)
                } else {
                    format!("No data to remove for server {}.", server_id)
                }
            }
            Command::PurgeMember { member_id } => {
                let report = engine.purge_member(member_id).await?;
                if report.rows > 0 {
                    format!("Removed data for user {} in {} rows.", member_id, report.rows)
                } else {
                    format!("No data to remove for user {}.", member_id)
                }
            }
            Command::BanServer { server_id, banned } => {
                engine.ban_server(server_id, banned).await?;
                if banned {
                    format!("Server {} is excluded from the global leaderboards.", server_id)
                } else {
                    format!("Server {} is included in the global leaderboards again.", server_id)
                }
            }
            Command::BanMember { member_id, banned } => {
                let changed = engine.ban_member(member_id, banned).await?;
                match (banned, changed) {
                    (true, true) => format!("User {} is now ignored.", member_id),
                    (true, false) => format!("User {} was already banned.", member_id),
                    (false, true) => format!("User {} may play again.", member_id),
                    (false, false) => format!("User {} was not banned.", member_id),
                }
            }
            Command::Flush => {
                engine.force_flush().await?;
                "Maintenance flush complete.".to_string()
            }
            Command::Uncache { word } => match engine.uncache(&word).await? {
                RemoveResult::Removed => format!("Removed *{}* from the word cache.", word),
                RemoveResult::NotPresent => format!("*{}* was not cached.", word),
            },
            Command::Banned { target } => match target {
                BanTarget::Servers => format_ids(
                    "These servers are currently banned:",
                    "No servers are banned currently.",
                    &engine.banned_servers().await?,
                ),
                BanTarget::Users => format_ids(
                    "These users are currently banned:",
                    "No users are banned currently.",
                    &engine.banned_members().await?,
                ),
            },
            Command::Servers => self.servers().await,
            Command::Announce { message } => {
                let channels = engine
                    .bound_channels()
                    .await?
                    .into_iter()
                    .map(|(channel_id, _)| channel_id)
                    .collect();
                info!(author = invocation.author, "Announcement requested");
                return Ok(Reply::Broadcast {
                    channels,
                    message: format!("**Announcement from the developers**\n{}", message),
                });
            }
            Command::LogLevel { directives: None } => match self.logs.current() {
                Ok(current) => format!("Log filter: `{}`", current),
                Err(e) => e.to_string(),
            },
            Command::LogLevel {
                directives: Some(directives),
            } => match self.logs.set(&directives) {
                Ok(current) => {
                    info!(author = invocation.author, filter = %current, "Log filter changed");
                    format!("Log filter set to `{}`.", current)
                }
                Err(e) => e.to_string(),
            },
        };
        Ok(Reply::Text(reply))
    }

    async fn servers(&self) -> String {
        let servers = self.engine.known_servers().await;
        let mut text = format!("**Servers ({})**", servers.len());
        for server in servers.iter().take(MAX_LISTED_SERVERS) {
            let mut channels: Vec<_> = server.channels.iter().collect();
            channels.sort_by_key(|(mode, _)| mode.token_width());
            let channels = channels
                .iter()
                .map(|(mode, channel_id)| format!("{} <#{}>", mode, channel_id))
                .collect::<Vec<_>>();
            let _ = write!(
                text,
                "\n{}: {}; {}{}",
                server.server_id,
                join_languages(&server.languages),
                if channels.is_empty() {
                    "no channel".to_string()
                } else {
                    channels.join(", ")
                },
                if server.is_banned { " (banned)" } else { "" }
            );
        }
        if servers.len() > MAX_LISTED_SERVERS {
            let _ = write!(text, "\n... and {} more", servers.len() - MAX_LISTED_SERVERS);
        }
        text
    }

    async fn list(&self, server_id: ServerId, kind: ListKind, action: ListAction) -> anyhow::Result<String> {
        let engine = &self.engine;
        let reply = match action {
            ListAction::Show => {
                let entries = engine.list_entries(server_id, kind).await;
                if entries.is_empty() {
                    format!("The {} of this server is empty.", kind)
                } else {
                    format!("**{} words:** {}", kind, entries.join(", "))
                }
            }
            ListAction::Add(word) => match engine.add_list_entry(server_id, kind, &word).await {
                Ok(InsertResult::Added) => format!("Added *{}* to the {}.", word, kind),
                Ok(InsertResult::AlreadyPresent) => format!("*{}* is already in the {}.", word, kind),
                Err(EngineError::IllegalWord { word }) => {
                    format!("*{}* is not spelled in the languages of this server.", word)
                }
                Err(e) => return Err(e.into()),
            },
            ListAction::Remove(word) => match engine.remove_list_entry(server_id, kind, &word).await? {
                RemoveResult::Removed => format!("Removed *{}* from the {}.", word, kind),
                RemoveResult::NotPresent => format!("*{}* is not in the {}.", word, kind),
            },
        };
        Ok(reply)
    }
}

fn describe_check(word: &str, check: WordCheck) -> String {
    match check {
        WordCheck::Illegal => format!("*{}* contains characters no configured language uses.", word),
        WordCheck::TooShort => "Single letters are not accepted.".to_string(),
        WordCheck::Blacklisted => format!("*{}* is **blacklisted**.", word),
        WordCheck::Whitelisted => format!("*{}* is **whitelisted** and can be played.", word),
        WordCheck::Cached(language) | WordCheck::Exists(language) => {
            format!("*{}* is a valid word ({}).", word, language)
        }
        WordCheck::NotAWord => format!("*{}* is **not** a valid word.", word),
        WordCheck::Unknown => "The dictionary could not be reached. Try again later.".to_string(),
    }
}

fn format_ids(title: &str, empty: &str, ids: &[u64]) -> String {
    if ids.is_empty() {
        return empty.to_string();
    }
    let mut text = title.to_string();
    for id in ids {
        let _ = write!(text, "\n* {}", id);
    }
    text
}

fn format_board(title: &str, rows: impl Iterator<Item = String>) -> String {
    let mut text = title.to_string();
    let mut empty = true;
    for (index, row) in rows.enumerate() {
        empty = false;
        let _ = write!(text, "\n{}. {}", index + 1, row);
    }
    if empty {
        text.push_str("\nNobody yet.");
    }
    text
}

fn join_languages(languages: &[crate::chain::Language]) -> String {
    languages
        .iter()
        .map(|language| language.code())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::engine::tests::{apple_state, seeded_engine, CHANNEL, SERVER};
    use crate::chain::pipeline::tests::FakeLookup;
    use crate::chain::Submission;
    use crate::common::logging::tests::detached_control;

    fn parse(content: &str) -> Command {
        parse_command("!", content).unwrap().unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("!help"), Command::Help);
        assert_eq!(parse("!CHECK Apple"), Command::Check { word: "Apple".to_string() });
        assert_eq!(parse("!stats <@!42>"), Command::Stats { member: Some(42) });
        assert_eq!(
            parse("!leaderboard karma global"),
            Command::Leaderboard {
                metric: LeaderboardMetric::Karma,
                global: true
            }
        );
        assert_eq!(parse("!setchannel hard"), Command::SetChannel { mode: GameMode::Hard });
        assert_eq!(
            parse("!setrole failed <@&77>"),
            Command::SetRole {
                kind: RoleKind::Failed,
                role: 77
            }
        );
        assert_eq!(
            parse("!whitelist add eel"),
            Command::List {
                kind: ListKind::Whitelist,
                action: ListAction::Add("eel".to_string())
            }
        );
        assert_eq!(
            parse("!languages en de"),
            Command::Languages {
                codes: Some("en,de".to_string())
            }
        );
        assert_eq!(
            parse("!unban user 9"),
            Command::BanMember {
                member_id: 9,
                banned: false
            }
        );
    }

    #[test]
    fn test_parse_non_commands_and_usage() {
        assert!(parse_command("!", "apple").is_none());
        assert!(parse_command("!", "!dance").is_none());
        assert!(parse_command("!", "!").is_none());
        assert_eq!(parse_command("!", "!check"), Some(Err("check <word>")));
        assert!(matches!(parse_command("!", "!setchannel easy"), Some(Err(_))));
        assert!(matches!(parse_command("!", "!purge planet 1"), Some(Err(_))));
        assert_eq!(parse_command("?", "?flush"), Some(Ok(Command::Flush)));
    }

    #[test]
    fn test_permissions() {
        assert_eq!(Command::ServerStats.permission(), Permission::Anyone);
        assert_eq!(Command::Languages { codes: None }.permission(), Permission::Anyone);
        assert_eq!(
            Command::Languages {
                codes: Some("en".to_string())
            }
            .permission(),
            Permission::ServerAdmin
        );
        assert_eq!(
            Command::List {
                kind: ListKind::Blacklist,
                action: ListAction::Show
            }
            .permission(),
            Permission::Anyone
        );
        assert_eq!(Command::Flush.permission(), Permission::BotAdmin);
        assert!(Permission::BotAdmin > Permission::ServerAdmin);
    }

    #[test]
    fn test_parse_mention() {
        assert_eq!(parse_mention("123", "@"), Some(123));
        assert_eq!(parse_mention("<@123>", "@"), Some(123));
        assert_eq!(parse_mention("<@&5>", "@&"), Some(5));
        assert_eq!(parse_mention("<#5>", "@"), None);
    }

    fn invocation(author: PlayerId) -> Invocation {
        Invocation {
            server_id: SERVER,
            channel_id: CHANNEL,
            author,
        }
    }

    async fn text(handler: &CommandHandler, command: Command, author: PlayerId) -> String {
        match handler.execute(command, invocation(author)).await.unwrap() {
            Reply::Text(text) => text,
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_stats_and_lists() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let (_layer, logs) = detached_control();
        let handler = CommandHandler::new(engine.clone(), logs, "!".to_string());

        let reply = text(&handler, Command::Stats { member: None }, 2).await;
        assert_eq!(reply, "<@2> has never played in this server.");

        engine.submit(Submission::new(SERVER, CHANNEL, 2, "elephant")).await.unwrap();
        let reply = text(&handler, Command::Stats { member: None }, 2).await;
        assert!(reply.contains("Score: 1 (#1)"));
        assert!(reply.contains("Accuracy: 100.00%"));

        let add = Command::List {
            kind: ListKind::Blacklist,
            action: ListAction::Add("tiger".to_string()),
        };
        let reply = text(&handler, add.clone(), 1).await;
        assert_eq!(reply, "Added *tiger* to the blacklist.");
        let reply = text(&handler, add, 1).await;
        assert_eq!(reply, "*tiger* is already in the blacklist.");

        let illegal = Command::List {
            kind: ListKind::Whitelist,
            action: ListAction::Add("straße".to_string()),
        };
        let reply = text(&handler, illegal, 1).await;
        assert!(reply.contains("not spelled"));
    }

    #[tokio::test]
    async fn test_execute_board_and_languages() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let (_layer, logs) = detached_control();
        let handler = CommandHandler::new(engine.clone(), logs, "?".to_string());

        let board = Command::Leaderboard {
            metric: LeaderboardMetric::Score,
            global: false,
        };
        let reply = text(&handler, board, 1).await;
        assert!(reply.ends_with("Nobody yet."));

        let reply = text(&handler, Command::Languages { codes: Some("xx".to_string()) }, 1).await;
        assert_eq!(reply, "Unknown language code 'xx'");

        let reply = text(&handler, Command::Help, 1).await;
        assert!(reply.contains("`?check <word>`"));

        let reply = text(&handler, Command::Check { word: "Zebra".to_string() }, 1).await;
        assert_eq!(reply, "*zebra* is a valid word (en).");
    }

    #[test]
    fn test_parse_bot_admin_commands() {
        assert_eq!(
            parse("!banned servers"),
            Command::Banned {
                target: BanTarget::Servers
            }
        );
        assert_eq!(parse_command("!", "!banned planets"), Some(Err("banned <servers|users>")));
        assert_eq!(parse("!servers"), Command::Servers);
        assert_eq!(parse("!loglevel"), Command::LogLevel { directives: None });
        assert_eq!(
            parse("!loglevel warn wordchain::chain=debug"),
            Command::LogLevel {
                directives: Some("warn,wordchain::chain=debug".to_string())
            }
        );
        assert_eq!(parse_command("!", "!announce   "), Some(Err("announce <message>")));

        let long = format!("!ANNOUNCE New release!\n{}", "x".repeat(MAX_COMMAND_LENGTH));
        let Command::Announce { message } = parse(&long) else {
            panic!("announcement not parsed");
        };
        assert!(message.starts_with("New release!\nxxx"));

        for command in [Command::Servers, Command::LogLevel { directives: None }] {
            assert_eq!(command.permission(), Permission::BotAdmin);
        }
    }

    #[tokio::test]
    async fn test_execute_bot_admin_listings() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let (_layer, logs) = detached_control();
        let handler = CommandHandler::new(engine.clone(), logs, "!".to_string());
        let banned_users = Command::Banned {
            target: BanTarget::Users,
        };

        assert_eq!(text(&handler, banned_users.clone(), 1).await, "No users are banned currently.");
        engine.ban_member(9, true).await.unwrap();
        assert_eq!(
            text(&handler, banned_users, 1).await,
            "These users are currently banned:\n* 9"
        );

        engine.ban_server(SERVER, true).await.unwrap();
        let reply = text(&handler, Command::Servers, 1).await;
        assert_eq!(reply, format!("**Servers (1)**\n{}: en; normal <#{}> (banned)", SERVER, CHANNEL));
        let reply = text(
            &handler,
            Command::Banned {
                target: BanTarget::Servers,
            },
            1,
        )
        .await;
        assert!(reply.ends_with(&format!("* {}", SERVER)));
    }

    #[tokio::test]
    async fn test_execute_announce_and_log_level() {
        let (engine, _store) = seeded_engine(apple_state(), FakeLookup::new(Some(true))).await;
        let (_layer, logs) = detached_control();
        let handler = CommandHandler::new(engine, logs, "!".to_string());

        let reply = handler
            .execute(
                Command::Announce {
                    message: "Hello".to_string(),
                },
                invocation(1),
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Broadcast {
                channels: vec![CHANNEL],
                message: "**Announcement from the developers**\nHello".to_string(),
            }
        );

        let reply = text(&handler, Command::LogLevel { directives: None }, 1).await;
        assert_eq!(reply, "Log filter: `info`");
        let set = Command::LogLevel {
            directives: Some("debug".to_string()),
        };
        assert_eq!(text(&handler, set, 1).await, "Log filter set to `debug`.");
        let bad = Command::LogLevel {
            directives: Some("wordchain=loud".to_string()),
        };
        assert!(text(&handler, bad, 1).await.starts_with("Invalid log directive 'wordchain=loud'"));
    }
}
