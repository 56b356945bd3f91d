//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::chain::language::Language;
use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Discord
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if let Some(ref prefix) = config.discord.command_prefix {
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            errors.push(format!(
                "discord.command_prefix '{}' must be non-empty and contain no whitespace",
                prefix
            ));
        }
    }

    // Database
    if config.database.url.is_empty() {
        errors.push("database.url is required".to_string());
    } else if !config.database.url.starts_with("sqlite:") {
        errors.push(format!(
            "database.url '{}' must be a sqlite URL (sqlite://path or sqlite::memory:)",
            config.database.url
        ));
    }
    if config.database.max_connections == Some(0) {
        errors.push("database.max_connections must be non-zero".to_string());
    }

    // Game
    if let Some(ref game) = config.game {
        if let Some(len) = game.history_length {
            if !(1..=50).contains(&len) {
                errors.push(format!("game.history_length must be 1-50 (got {})", len));
            }
        }
        if let Some(penalty) = game.mistake_penalty {
            if !penalty.is_finite() || penalty < 0.0 {
                errors.push(format!("game.mistake_penalty must be a non-negative number (got {})", penalty));
            }
        }
        if game.lookup_timeout_secs == Some(0) {
            errors.push("game.lookup_timeout_secs must be non-zero".to_string());
        }
        if game.quiet_period_secs == Some(0) {
            errors.push("game.quiet_period_secs must be non-zero".to_string());
        }
        if game.announce_every == Some(0) {
            errors.push("game.announce_every must be non-zero".to_string());
        }
        if game.failed_member_recovery == Some(0) {
            errors.push("game.failed_member_recovery must be non-zero".to_string());
        }
        if let Some(ref codes) = game.default_languages {
            if codes.is_empty() {
                errors.push("game.default_languages must not be empty".to_string());
            }
            for code in codes {
                if Language::from_code(code).is_none() {
                    errors.push(format!("game.default_languages contains unknown language '{}'", code));
                }
            }
        }
        if let Some(ref reactions) = game.special_reactions {
            for (word, shortcode) in reactions {
                if emojis::get_by_shortcode(shortcode).is_none() && emojis::get(shortcode).is_none() {
                    errors.push(format!(
                        "game.special_reactions.{} uses unknown emoji '{}'",
                        word, shortcode
                    ));
                }
            }
        }
    }

    // Roles
    if let Some(ref roles) = config.roles {
        if let Some(accuracy) = roles.reliable_accuracy_threshold {
            if !(0.0..=1.0).contains(&accuracy) {
                errors.push(format!(
                    "roles.reliable_accuracy_threshold must be between 0 and 1 (got {})",
                    accuracy
                ));
            }
        }
        if let Some(karma) = roles.reliable_karma_threshold {
            if !karma.is_finite() || karma < 0.0 {
                errors.push(format!("roles.reliable_karma_threshold must be non-negative (got {})", karma));
            }
        }
    }

    // Lookup
    if let Some(ref lookup) = config.lookup {
        if let Some(ref endpoint) = lookup.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                errors.push(format!("lookup.endpoint '{}' must be an http(s) URL", endpoint));
            }
        }
    }

    // Global lists
    if let Some(ref lists) = config.lists {
        check_list(&mut errors, "lists.two_letter_blacklist", &lists.two_letter_blacklist, Some(2));
        check_list(&mut errors, "lists.banned_words", &lists.banned_words, None);
        check_list(&mut errors, "lists.three_letter_whitelist", &lists.three_letter_whitelist, Some(3));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn check_list(errors: &mut Vec<String>, field: &str, words: &Option<Vec<String>>, length: Option<usize>) {
    let Some(words) = words else {
        return;
    };
    for (i, word) in words.iter().enumerate() {
        if word.chars().any(char::is_uppercase) {
            errors.push(format!("{}[{}] '{}' must be lower-case", field, i, word));
        }
        if let Some(length) = length {
            if word.chars().count() != length {
                errors.push(format!("{}[{}] '{}' must be exactly {} letters", field, i, word, length));
            }
        }
    }
}
