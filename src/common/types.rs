//! Shared types used across the application.

use std::fmt;

/// Discord guild id; every game state, player record and list entry is scoped by it.
pub type ServerId = u64;

/// Discord user id of a participant.
pub type PlayerId = u64;

/// Discord channel id bound to a game mode.
pub type ChannelId = u64;

/// Discord role id.
pub type RoleId = u64;

/// Game variant played in a channel.
///
/// The mode decides how many trailing characters of the current word the
/// next word has to start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Normal,
    Hard,
}

impl GameMode {
    pub const ALL: [GameMode; 2] = [GameMode::Normal, GameMode::Hard];

    /// Number of characters linking two consecutive words.
    pub fn token_width(self) -> usize {
        match self {
            GameMode::Normal => 1,
            GameMode::Hard => 2,
        }
    }

    /// Convert to the value stored in the database.
    pub fn to_id(self) -> i64 {
        self.token_width() as i64
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(GameMode::Normal),
            2 => Some(GameMode::Hard),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" | "n" => Some(GameMode::Normal),
            "hard" | "h" => Some(GameMode::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Normal => write!(f, "normal"),
            GameMode::Hard => write!(f, "hard"),
        }
    }
}

/// Server-scoped word list kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Blacklist,
    Whitelist,
}

impl ListKind {
    /// Table holding entries of this kind.
    pub fn table(self) -> &'static str {
        match self {
            ListKind::Blacklist => "blacklist",
            ListKind::Whitelist => "whitelist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Roles the bot manages on behalf of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// Given to players with high karma and accuracy.
    Reliable,
    /// Given to the last player who broke the chain.
    Failed,
}

impl RoleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reliable" | "reliable_role" => Some(RoleKind::Reliable),
            "failed" | "failed_role" => Some(RoleKind::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Reliable => write!(f, "reliable role"),
            RoleKind::Failed => write!(f, "failed role"),
        }
    }
}

/// Outcome of adding an entry to a set-like table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Added,
    AlreadyPresent,
}

/// Outcome of removing an entry from a set-like table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    Removed,
    NotPresent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_id_roundtrip() {
        for mode in GameMode::ALL {
            assert_eq!(GameMode::from_id(mode.to_id()), Some(mode));
        }
        assert_eq!(GameMode::from_id(3), None);
    }

    #[test]
    fn test_game_mode_parse() {
        assert_eq!(GameMode::parse("HARD"), Some(GameMode::Hard));
        assert_eq!(GameMode::parse("normal"), Some(GameMode::Normal));
        assert_eq!(GameMode::parse("easy"), None);
    }

    #[test]
    fn test_role_kind_parse() {
        assert_eq!(RoleKind::parse("failed_role"), Some(RoleKind::Failed));
        assert_eq!(RoleKind::parse("Reliable"), Some(RoleKind::Reliable));
        assert_eq!(RoleKind::parse("admin"), None);
    }
}
