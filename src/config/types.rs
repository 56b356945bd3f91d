//! Configuration type definitions.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    pub game: Option<GameConfig>,
    pub roles: Option<RolesConfig>,
    pub lookup: Option<LookupConfig>,
    pub lists: Option<ListsConfig>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Guild whose administrators may run bot-wide commands (purge, ban, flush).
    pub admin_guild_id: Option<u64>,
    /// Prefix for text commands. Defaults to "!".
    pub command_prefix: Option<String>,
}

/// SQLite database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. "sqlite://wordchain.sqlite3".
    pub url: String,
    pub max_connections: Option<u32>,
}

/// Gameplay tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameConfig {
    /// Allow the same player to submit consecutive words.
    pub single_player: Option<bool>,
    /// Number of recent word endings kept per player for karma decay.
    pub history_length: Option<usize>,
    /// Karma subtracted for a mistake.
    pub mistake_penalty: Option<f64>,
    pub lookup_timeout_secs: Option<u64>,
    /// Quiet period before deferred maintenance runs.
    pub quiet_period_secs: Option<u64>,
    /// Post an announcement every N accepted words.
    pub announce_every: Option<u32>,
    /// Correct words a failed member needs before the failed role is lifted.
    pub failed_member_recovery: Option<u32>,
    /// Language codes used for servers without their own setting.
    pub default_languages: Option<Vec<String>>,
    /// Word -> emoji shortcode overrides for the success reaction.
    pub special_reactions: Option<HashMap<String, String>>,
}

/// Reliable role thresholds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolesConfig {
    pub reliable_karma_threshold: Option<f64>,
    pub reliable_accuracy_threshold: Option<f64>,
}

/// Dictionary lookup adapter settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupConfig {
    /// Endpoint URL. `{lang}` is replaced by the language code.
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
}

/// Additions to the built-in global word lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListsConfig {
    pub two_letter_blacklist: Option<Vec<String>>,
    pub banned_words: Option<Vec<String>>,
    pub three_letter_whitelist: Option<Vec<String>>,
}

pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const DEFAULT_LOOKUP_ENDPOINT: &str = "https://{lang}.wiktionary.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str = concat!("wordchain/", env!("CARGO_PKG_VERSION"));

/// Resolved gameplay settings with defaults applied.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub single_player: bool,
    pub history_length: usize,
    pub mistake_penalty: f64,
    pub lookup_timeout: Duration,
    pub quiet_period: Duration,
    pub announce_every: u32,
    pub failed_member_recovery: u32,
    pub default_languages: Vec<String>,
    pub special_reactions: HashMap<String, String>,
    pub reliable_karma_threshold: f64,
    pub reliable_accuracy_threshold: f64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            single_player: false,
            history_length: 5,
            mistake_penalty: 5.0,
            lookup_timeout: Duration::from_secs(5),
            quiet_period: Duration::from_secs(5),
            announce_every: 100,
            failed_member_recovery: 30,
            default_languages: vec!["en".to_string()],
            special_reactions: HashMap::new(),
            reliable_karma_threshold: 50.0,
            reliable_accuracy_threshold: 0.99,
        }
    }
}

impl Config {
    pub fn command_prefix(&self) -> &str {
        self.discord
            .command_prefix
            .as_deref()
            .unwrap_or(DEFAULT_COMMAND_PREFIX)
    }

    pub fn lookup_endpoint(&self) -> &str {
        self.lookup
            .as_ref()
            .and_then(|l| l.endpoint.as_deref())
            .unwrap_or(DEFAULT_LOOKUP_ENDPOINT)
    }

    pub fn lookup_user_agent(&self) -> &str {
        self.lookup
            .as_ref()
            .and_then(|l| l.user_agent.as_deref())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Gameplay settings with defaults filled in for every absent field.
    pub fn game_settings(&self) -> GameSettings {
        let defaults = GameSettings::default();
        let game = self.game.clone().unwrap_or_default();
        let roles = self.roles.clone().unwrap_or_default();

        GameSettings {
            single_player: game.single_player.unwrap_or(defaults.single_player),
            history_length: game.history_length.unwrap_or(defaults.history_length),
            mistake_penalty: game.mistake_penalty.unwrap_or(defaults.mistake_penalty),
            lookup_timeout: game
                .lookup_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lookup_timeout),
            quiet_period: game
                .quiet_period_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.quiet_period),
            announce_every: game.announce_every.unwrap_or(defaults.announce_every),
            failed_member_recovery: game
                .failed_member_recovery
                .unwrap_or(defaults.failed_member_recovery),
            default_languages: game
                .default_languages
                .unwrap_or(defaults.default_languages),
            special_reactions: game.special_reactions.unwrap_or_default(),
            reliable_karma_threshold: roles
                .reliable_karma_threshold
                .unwrap_or(defaults.reliable_karma_threshold),
            reliable_accuracy_threshold: roles
                .reliable_accuracy_threshold
                .unwrap_or(defaults.reliable_accuracy_threshold),
        }
    }
}
