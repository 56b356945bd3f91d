//! Karma scoring.
//!
//! A word earns karma for starting with a rare letter and for ending with a
//! letter that leaves the next player many options. Rewards shrink when the
//! same player keeps ending words with the same letter.

use std::collections::VecDeque;

/// How often each letter starts an English word, relative to the average of 1.0.
const FIRST_CHAR_SCORE: &[(char, f64)] = &[
    ('a', 1.7855527485443319),
    ('b', 1.293519406654868),
    ('c', 2.25552748544332),
    ('d', 1.3159995136515314),
    ('e', 0.9973439969738318),
    ('f', 0.8354872265978572),
    ('g', 0.7694519122951594),
    ('h', 0.965450345172316),
    ('i', 0.9272341632779886),
    ('j', 0.1995109495953851),
    ('k', 0.2776293214087894),
    ('l', 0.7026438443144513),
    ('m', 1.3913078720903527),
    ('n', 0.9454992502127775),
    ('o', 0.8908444900771402),
    ('p', 2.4489266559489877),
    ('q', 0.12595884951567798),
    ('r', 1.1790113616406155),
    ('s', 2.7231839613082776),
    ('t', 1.3220410424068847),
    ('u', 1.5993893624782156),
    ('v', 0.37436403182880534),
    ('w', 0.46077194309722913),
    ('x', 0.03561691952283812),
    ('y', 0.08029613217870604),
    ('z', 0.09743721376366166),
];

const SCORE_EXPONENT: f64 = 0.5;
const SCORE_RISE: f64 = 0.025;
const LAST_CHAR_BIAS: f64 = 0.7;
const DECAY_DROP_RATE: f64 = 0.33;

pub const DEFAULT_HISTORY_LENGTH: usize = 5;

fn first_char_score(c: char) -> f64 {
    FIRST_CHAR_SCORE
        .iter()
        .find(|(letter, _)| *letter == c)
        .map(|(_, score)| *score)
        .unwrap_or(1.0)
}

fn adapt(score: f64) -> f64 {
    score.powf(SCORE_EXPONENT) + SCORE_RISE
}

/// Factor in `(-1, 1]` for a weighted count of same-ending repeats.
fn decay(repeats: f64) -> f64 {
    2.0 * (-repeats * DECAY_DROP_RATE).exp() - 1.0
}

/// Karma of a word on its own, usually close to zero.
pub fn base_karma(word: &str) -> f64 {
    let (Some(first), Some(last)) = (word.chars().next(), word.chars().last()) else {
        return 0.0;
    };
    // A common first letter is not penalized, the previous word chose it.
    let first_karma = (-(adapt(first_char_score(first)) - 1.0)).max(0.0);
    let last_karma = adapt(first_char_score(last)) - 1.0;
    first_karma + last_karma * LAST_CHAR_BIAS
}

/// Ending letters of one player's most recent words, oldest first.
#[derive(Debug, Clone)]
pub struct RecentEndingHistory {
    endings: VecDeque<char>,
    capacity: usize,
}

impl RecentEndingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            endings: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, ending: char) {
        if self.endings.len() == self.capacity {
            self.endings.pop_front();
        }
        self.endings.push_back(ending);
    }

    pub fn len(&self) -> usize {
        self.endings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endings.is_empty()
    }

    /// Weighted number of entries ending with `ending`.
    ///
    /// Weights grow linearly from oldest to newest and average 1.0, so a
    /// recent repeat costs more than an old one. Keep this order.
    fn repeats(&self, ending: char) -> f64 {
        let len = self.endings.len() as f64;
        self.endings
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == ending)
            .map(|(i, _)| 2.0 * (i as f64 + 1.0) / len)
            .sum()
    }
}

impl Default for RecentEndingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}

/// Karma delta for `word` given the player's history, without recording it.
pub fn evaluate(word: &str, history: &RecentEndingHistory) -> f64 {
    let base = base_karma(word);
    if base <= 0.0 {
        return base;
    }
    match word.chars().last() {
        Some(ending) => decay(history.repeats(ending)) * base,
        None => base,
    }
}

/// Karma delta for `word`, after which its ending joins the history.
pub fn score(word: &str, history: &mut RecentEndingHistory) -> f64 {
    let delta = evaluate(word, history);
    if let Some(ending) = word.chars().last() {
        history.push(ending);
    }
    delta
}
