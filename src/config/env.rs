//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `WORDCHAIN_DISCORD_TOKEN` - Discord bot token
//! - `WORDCHAIN_ADMIN_GUILD_ID` - Guild allowed to run bot-wide admin commands
//! - `WORDCHAIN_DATABASE_URL` - SQLite connection URL
//! - `WORDCHAIN_SINGLE_PLAYER` - Disable the turn-order rule ("true"/"1")

use std::env;

use crate::config::types::{Config, GameConfig};

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "WORDCHAIN";

/// Apply environment variable overrides to a config.
///
/// This allows secrets like the bot token to be provided via environment
/// variables instead of the config file.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |name| env::var(name).ok())
}

/// Apply overrides read through `lookup`, keyed by full variable name.
fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let var = |suffix: &str| lookup(&format!("{}_{}", ENV_PREFIX, suffix));

    if let Some(token) = var("DISCORD_TOKEN") {
        config.discord.token = token;
    }

    if let Some(id) = var("ADMIN_GUILD_ID").and_then(|id| id.parse().ok()) {
        config.discord.admin_guild_id = Some(id);
    }

    if let Some(url) = var("DATABASE_URL") {
        config.database.url = url;
    }

    if let Some(flag) = var("SINGLE_PLAYER") {
        let game = config.game.get_or_insert_with(GameConfig::default);
        game.single_player = Some(parse_flag(&flag));
    }

    config
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}

/// Check if any required environment variables are set but empty.
///
/// Returns a list of variable names that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    empty_vars(|name| env::var(name).ok())
}

fn empty_vars(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    ["DISCORD_TOKEN", "DATABASE_URL"]
        .into_iter()
        .map(|suffix| format!("{}_{}", ENV_PREFIX, suffix))
        .filter(|name| lookup(name).is_some_and(|v| v.is_empty()))
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `WORDCHAIN_CONFIG` environment variable, otherwise returns "wordchain.conf".
pub fn get_config_path() -> String {
    config_path(|name| env::var(name).ok())
}

fn config_path(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(&format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|| "wordchain.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;
    use std::collections::HashMap;

    fn make_test_config() -> Config {
        Config {
            discord: DiscordConfig {
                token: "original_token".to_string(),
                admin_guild_id: None,
                command_prefix: None,
            },
            database: DatabaseConfig {
                url: "sqlite://original.sqlite3".to_string(),
                max_connections: None,
            },
            game: None,
            roles: None,
            lookup: None,
            lists: None,
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "WORDCHAIN");
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_config_path() {
        assert_eq!(config_path(vars(&[])), "wordchain.conf");
        assert_eq!(config_path(vars(&[("WORDCHAIN_CONFIG", "/etc/wc.conf")])), "/etc/wc.conf");
    }

    #[test]
    fn test_apply_overrides_no_vars() {
        let result = apply_overrides(make_test_config(), vars(&[]));

        assert_eq!(result.discord.token, "original_token");
        assert_eq!(result.database.url, "sqlite://original.sqlite3");
        assert!(result.game.is_none());
    }

    #[test]
    fn test_apply_overrides() {
        let result = apply_overrides(
            make_test_config(),
            vars(&[
                ("WORDCHAIN_DISCORD_TOKEN", "secret"),
                ("WORDCHAIN_ADMIN_GUILD_ID", "42"),
                ("WORDCHAIN_DATABASE_URL", "sqlite::memory:"),
                ("WORDCHAIN_SINGLE_PLAYER", "yes"),
            ]),
        );

        assert_eq!(result.discord.token, "secret");
        assert_eq!(result.discord.admin_guild_id, Some(42));
        assert_eq!(result.database.url, "sqlite::memory:");
        assert_eq!(result.game.and_then(|g| g.single_player), Some(true));
    }

    #[test]
    fn test_bad_guild_id_ignored() {
        let result = apply_overrides(make_test_config(), vars(&[("WORDCHAIN_ADMIN_GUILD_ID", "abc")]));
        assert_eq!(result.discord.admin_guild_id, None);
    }

    #[test]
    fn test_empty_vars_reported() {
        let empty = empty_vars(vars(&[("WORDCHAIN_DISCORD_TOKEN", ""), ("WORDCHAIN_DATABASE_URL", "x")]));
        assert_eq!(empty, vec!["WORDCHAIN_DISCORD_TOKEN".to_string()]);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
