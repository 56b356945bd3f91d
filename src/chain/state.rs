//! Per-channel chain state and the reaction policy.

use crate::common::{GameMode, PlayerId, ServerId};

/// Counts with a dedicated reaction.
const SPECIAL_COUNTS: &[(u32, &str)] = &[(69, "😏"), (100, "💯"), (666, "👹")];

/// Reaction placed on an accepted word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// First time this streak reached the all-time high score.
    NewHighScore,
    /// Still at the high score after the marker was already shown.
    AtHighScore,
    /// Count with a fixed meaning.
    Special(u32),
    /// Plain success.
    Correct,
    /// Word-specific override.
    Custom(String),
}

impl Reaction {
    pub fn emoji(&self) -> &str {
        match self {
            Reaction::NewHighScore => "🎉",
            Reaction::AtHighScore => "☑️",
            Reaction::Special(count) => SPECIAL_COUNTS
                .iter()
                .find(|(c, _)| c == count)
                .map(|(_, emoji)| *emoji)
                .unwrap_or("✅"),
            Reaction::Correct => "✅",
            Reaction::Custom(emoji) => emoji,
        }
    }
}

fn special(count: u32) -> Option<Reaction> {
    SPECIAL_COUNTS
        .iter()
        .any(|(c, _)| *c == count)
        .then_some(Reaction::Special(count))
}

/// Whether the chain has a running streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPhase {
    Idle,
    Active,
}

/// Game state of one (server, mode) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    pub server_id: ServerId,
    pub mode: GameMode,
    /// Last accepted word. Kept across a reset so the next start is known.
    pub current_word: Option<String>,
    /// Player who submitted `current_word`.
    pub last_member: Option<PlayerId>,
    pub count: u32,
    pub high_score: u32,
    /// Whether 🎉 was already shown for the running streak.
    pub used_high_score_emoji: bool,
    /// Holder of the failed role, if that feature is configured.
    pub failed_member: Option<PlayerId>,
    /// Correct words submitted by `failed_member` since the mistake.
    pub failed_member_streak: u32,
}

impl ChainState {
    pub fn new(server_id: ServerId, mode: GameMode) -> Self {
        Self {
            server_id,
            mode,
            current_word: None,
            last_member: None,
            count: 0,
            high_score: 0,
            used_high_score_emoji: false,
            failed_member: None,
            failed_member_streak: 0,
        }
    }

    pub fn phase(&self) -> ChainPhase {
        if self.count == 0 {
            ChainPhase::Idle
        } else {
            ChainPhase::Active
        }
    }

    /// Characters the next word has to start with.
    pub fn expected_prefix(&self) -> Option<String> {
        let word = self.current_word.as_deref()?;
        let width = self.mode.token_width();
        let chars: Vec<char> = word.chars().collect();
        let start = chars.len().saturating_sub(width);
        Some(chars[start..].iter().collect())
    }

    /// Whether `word` continues the chain.
    pub fn links_to(&self, word: &str) -> bool {
        match self.expected_prefix() {
            Some(prefix) => word.starts_with(&prefix),
            None => true,
        }
    }

    pub fn is_holder(&self, player: PlayerId) -> bool {
        self.last_member == Some(player)
    }

    /// Advance the chain with an accepted word and pick its reaction.
    pub fn accept(&mut self, word: &str, player: PlayerId) -> Reaction {
        self.count += 1;
        self.current_word = Some(word.to_string());
        self.last_member = Some(player);
        self.high_score = self.high_score.max(self.count);
        self.reaction()
    }

    fn reaction(&mut self) -> Reaction {
        if self.count == self.high_score {
            if !self.used_high_score_emoji {
                self.used_high_score_emoji = true;
                return Reaction::NewHighScore;
            }
            return special(self.count).unwrap_or(Reaction::AtHighScore);
        }
        special(self.count).unwrap_or(Reaction::Correct)
    }

    /// Break the chain. The current word and holder are kept.
    pub fn fail(&mut self, player: PlayerId, track_failed: bool) {
        self.count = 0;
        self.used_high_score_emoji = false;
        if track_failed {
            self.failed_member = Some(player);
            self.failed_member_streak = 0;
        }
    }

    /// Count a correct word towards lifting the failed role.
    ///
    /// Returns `true` when `player` has just recovered.
    pub fn record_recovery(&mut self, player: PlayerId, threshold: u32) -> bool {
        if self.failed_member != Some(player) {
            return false;
        }
        self.failed_member_streak += 1;
        if self.failed_member_streak >= threshold {
            self.failed_member = None;
            self.failed_member_streak = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state(word: &str, count: u32, high_score: u32) -> ChainState {
        ChainState {
            current_word: Some(word.to_string()),
            last_member: Some(1),
            count,
            high_score,
            ..ChainState::new(10, GameMode::Normal)
        }
    }

    #[test]
    fn test_idle_accepts_any_start() {
        let state = ChainState::new(10, GameMode::Normal);
        assert_eq!(state.phase(), ChainPhase::Idle);
        assert_eq!(state.expected_prefix(), None);
        assert!(state.links_to("zebra"));
    }

    #[test]
    fn test_accept_advances_chain() {
        let mut state = make_state("apple", 4, 10);
        assert!(state.links_to("elephant"));
        let reaction = state.accept("elephant", 2);

        assert_eq!(state.count, 5);
        assert_eq!(state.current_word.as_deref(), Some("elephant"));
        assert_eq!(state.last_member, Some(2));
        assert_eq!(state.high_score, 10);
        assert_eq!(reaction, Reaction::Correct);
        assert_eq!(state.phase(), ChainPhase::Active);
    }

    #[test]
    fn test_hard_mode_prefix() {
        let state = ChainState {
            mode: GameMode::Hard,
            ..make_state("apple", 1, 1)
        };
        assert_eq!(state.expected_prefix().as_deref(), Some("le"));
        assert!(state.links_to("legend"));
        assert!(!state.links_to("elephant"));
    }

    #[test]
    fn test_prefix_with_multibyte_letters() {
        let state = ChainState {
            mode: GameMode::Hard,
            ..make_state("café", 1, 1)
        };
        assert_eq!(state.expected_prefix().as_deref(), Some("fé"));
    }

    #[test]
    fn test_fail_keeps_word_and_holder() {
        let mut state = make_state("apple", 4, 10);
        state.fail(2, true);

        assert_eq!(state.count, 0);
        assert_eq!(state.current_word.as_deref(), Some("apple"));
        assert_eq!(state.last_member, Some(1));
        assert_eq!(state.failed_member, Some(2));
        assert_eq!(state.expected_prefix().as_deref(), Some("e"));
    }

    #[test]
    fn test_fail_without_failed_role() {
        let mut state = make_state("apple", 4, 10);
        state.fail(2, false);
        assert_eq!(state.failed_member, None);
    }

    #[test]
    fn test_high_score_marker_shown_once_per_streak() {
        let mut state = make_state("apple", 2, 2);

        assert_eq!(state.accept("egg", 2), Reaction::NewHighScore);
        assert!(state.used_high_score_emoji);
        assert_eq!(state.accept("gate", 3), Reaction::AtHighScore);
        assert_eq!(state.high_score, 4);

        state.fail(3, false);
        assert!(!state.used_high_score_emoji);
    }

    #[test]
    fn test_marker_reset_allows_new_celebration() {
        let mut state = make_state("apple", 0, 1);
        state.used_high_score_emoji = true;
        state.fail(1, false);
        assert_eq!(state.accept("egg", 2), Reaction::NewHighScore);
    }

    #[test]
    fn test_special_counts() {
        let mut state = make_state("apple", 99, 500);
        let reaction = state.accept("eagle", 2);
        assert_eq!(reaction, Reaction::Special(100));
        assert_eq!(reaction.emoji(), "💯");

        let mut at_high = make_state("apple", 68, 69);
        at_high.used_high_score_emoji = true;
        assert_eq!(at_high.accept("eagle", 2), Reaction::Special(69));
    }

    #[test]
    fn test_reaction_emojis() {
        assert_eq!(Reaction::NewHighScore.emoji(), "🎉");
        assert_eq!(Reaction::AtHighScore.emoji(), "☑️");
        assert_eq!(Reaction::Correct.emoji(), "✅");
        assert_eq!(Reaction::Custom("👋".to_string()).emoji(), "👋");
    }

    #[test]
    fn test_failed_member_recovery() {
        let mut state = make_state("apple", 0, 5);
        state.fail(7, true);

        assert!(!state.record_recovery(8, 2));
        assert!(!state.record_recovery(7, 2));
        assert!(state.record_recovery(7, 2));
        assert_eq!(state.failed_member, None);
        assert!(!state.record_recovery(7, 2));
    }
}
