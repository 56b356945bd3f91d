//! Classification of a submitted word.
//!
//! Checks run cheapest first. A dictionary lookup is started right after the
//! cache misses and only awaited once repetition, turn order and the start
//! letter have been checked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chain::cache::WordCache;
use crate::chain::language::{Alphabets, Language};
use crate::chain::lists::ListFilter;
use crate::chain::lookup::{DictionaryLookup, LookupHandle, LookupVerdict};
use crate::chain::state::ChainState;
use crate::common::error::StoreResult;
use crate::common::{PlayerId, ServerId};
use crate::store::Store;

/// Rejections that leave the chain intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftRejection {
    TooShort,
    Blacklisted,
    Repeated,
}

/// Rejections that break the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MistakeReason {
    /// The holder of the current word played again.
    SameHolder,
    /// The word does not continue the chain.
    WrongStart { expected: String },
    /// The dictionary does not know the word.
    NotAWord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not a word in any configured alphabet. Not a game event.
    Ignored,
    Rejected(SoftRejection),
    Mistake(MistakeReason),
    /// The validity of the word could not be established.
    Fault,
    Accepted {
        /// Language the word was confirmed in, if any.
        language: Option<Language>,
        /// Whether a live lookup confirmed the word.
        looked_up: bool,
    },
}

/// Standalone classification of a word, independent of any chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCheck {
    Illegal,
    TooShort,
    Blacklisted,
    Whitelisted,
    Cached(Language),
    Exists(Language),
    NotAWord,
    /// The dictionary could not be reached.
    Unknown,
}

/// How a word got past the whitelist, cache and lookup stage.
enum Validity {
    Whitelisted,
    Cached(Language),
    /// Lookups running in every language the spelling allows.
    Pending(Vec<(Language, LookupHandle)>),
}

/// Combined answer of the lookups of one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Confirmed(Language),
    Unknown,
    /// At least one lookup failed and none confirmed the word.
    Failed,
}

/// Resolve the lookups in order and stop at the first confirmation.
///
/// All of them share one deadline. A word is unknown only if every lookup
/// answered that it does not exist.
async fn resolve_lookups(lookups: Vec<(Language, LookupHandle)>, timeout: Duration) -> Resolution {
    let deadline = Instant::now() + timeout;
    let mut failed = false;
    for (language, handle) in lookups {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match handle.resolve(remaining).await {
            LookupVerdict::Exists => return Resolution::Confirmed(language),
            LookupVerdict::NotExists => {}
            LookupVerdict::Error => failed = true,
        }
    }
    if failed {
        Resolution::Failed
    } else {
        Resolution::Unknown
    }
}

pub struct ValidationPipeline {
    pub alphabets: Arc<Alphabets>,
    pub lists: Arc<RwLock<ListFilter>>,
    pub cache: Arc<WordCache>,
    pub lookup: Arc<dyn DictionaryLookup>,
    pub store: Store,
    pub lookup_timeout: Duration,
    pub single_player: bool,
}

impl ValidationPipeline {
    /// Classify `word` played by `player` against the chain `state`.
    pub async fn validate(
        &self,
        word: &str,
        player: PlayerId,
        state: &ChainState,
        languages: &[Language],
    ) -> Verdict {
        match self.run(word, player, state, languages).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Storage failure while validating '{}': {}", word, e);
                Verdict::Fault
            }
        }
    }

    async fn run(
        &self,
        word: &str,
        player: PlayerId,
        state: &ChainState,
        languages: &[Language],
    ) -> StoreResult<Verdict> {
        if !self.alphabets.is_legal(languages, word) {
            return Ok(Verdict::Ignored);
        }
        if word.chars().count() < 2 {
            return Ok(Verdict::Rejected(SoftRejection::TooShort));
        }
        let matching = self.alphabets.matching(languages, word);
        let scope = Some(state.server_id);

        let (whitelisted, blacklisted) = {
            let lists = self.lists.read().await;
            (lists.is_whitelisted(word, scope), lists.is_blacklisted(word, scope))
        };

        let validity = if whitelisted {
            Validity::Whitelisted
        } else {
            if blacklisted {
                return Ok(Verdict::Rejected(SoftRejection::Blacklisted));
            }
            self.check_cache(word, &matching).await?
        };

        if self.store.is_word_used(state.server_id, state.mode, word).await? {
            return Ok(Verdict::Rejected(SoftRejection::Repeated));
        }
        if !self.single_player && state.is_holder(player) {
            return Ok(Verdict::Mistake(MistakeReason::SameHolder));
        }
        if !state.links_to(word) {
            let expected = state.expected_prefix().unwrap_or_default();
            return Ok(Verdict::Mistake(MistakeReason::WrongStart { expected }));
        }

        Ok(match validity {
            Validity::Whitelisted => Verdict::Accepted {
                language: matching.first().copied(),
                looked_up: false,
            },
            Validity::Cached(language) => Verdict::Accepted {
                language: Some(language),
                looked_up: false,
            },
            Validity::Pending(lookups) => match resolve_lookups(lookups, self.lookup_timeout).await {
                Resolution::Confirmed(language) => Verdict::Accepted {
                    language: Some(language),
                    looked_up: true,
                },
                Resolution::Unknown => Verdict::Mistake(MistakeReason::NotAWord),
                Resolution::Failed => Verdict::Fault,
            },
        })
    }

    /// Classify `word` for a server without looking at any chain state.
    pub async fn classify(&self, word: &str, server_id: ServerId, languages: &[Language]) -> StoreResult<WordCheck> {
        if !self.alphabets.is_legal(languages, word) {
            return Ok(WordCheck::Illegal);
        }
        if word.chars().count() < 2 {
            return Ok(WordCheck::TooShort);
        }
        {
            let lists = self.lists.read().await;
            if lists.is_whitelisted(word, Some(server_id)) {
                return Ok(WordCheck::Whitelisted);
            }
            if lists.is_blacklisted(word, Some(server_id)) {
                return Ok(WordCheck::Blacklisted);
            }
        }
        let matching = self.alphabets.matching(languages, word);
        Ok(match self.check_cache(word, &matching).await? {
            Validity::Whitelisted => WordCheck::Whitelisted,
            Validity::Cached(language) => WordCheck::Cached(language),
            Validity::Pending(lookups) => match resolve_lookups(lookups, self.lookup_timeout).await {
                Resolution::Confirmed(language) => WordCheck::Exists(language),
                Resolution::Unknown => WordCheck::NotAWord,
                Resolution::Failed => WordCheck::Unknown,
            },
        })
    }

    /// Find the word in the cache or start a lookup in every matching language.
    async fn check_cache(&self, word: &str, matching: &[Language]) -> StoreResult<Validity> {
        for &language in matching {
            if self.cache.contains(word, Some(language)).await? {
                return Ok(Validity::Cached(language));
            }
        }
        debug!("Cache miss for '{}', looking up in {} language(s)", word, matching.len());
        let lookups = matching
            .iter()
            .map(|&language| (language, self.lookup.begin(word, language)))
            .collect();
        Ok(Validity::Pending(lookups))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::lists::GlobalLists;
    use crate::common::error::LookupError;
    use crate::common::{GameMode, ListKind};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Lookup with a fixed answer that counts its queries.
    pub(crate) struct FakeLookup {
        pub answer: Option<bool>,
        pub calls: AtomicUsize,
    }

    impl FakeLookup {
        pub(crate) fn new(answer: Option<bool>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DictionaryLookup for FakeLookup {
        fn query(&self, _word: &str, _language: Language) -> BoxFuture<'static, Result<bool, LookupError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answer;
            Box::pin(async move {
                answer.ok_or(LookupError::Malformed {
                    message: "scripted failure".to_string(),
                })
            })
        }
    }

    /// Lookup that knows a few words per language and fails for some languages.
    struct PerLanguageLookup {
        known: Vec<(&'static str, Language)>,
        failing: Vec<Language>,
        asked: std::sync::Mutex<Vec<Language>>,
    }

    impl PerLanguageLookup {
        fn new(known: Vec<(&'static str, Language)>, failing: Vec<Language>) -> Arc<Self> {
            Arc::new(Self {
                known,
                failing,
                asked: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    impl DictionaryLookup for PerLanguageLookup {
        fn query(&self, word: &str, language: Language) -> BoxFuture<'static, Result<bool, LookupError>> {
            self.asked.lock().unwrap().push(language);
            let result = if self.failing.contains(&language) {
                Err(LookupError::Malformed {
                    message: "scripted failure".to_string(),
                })
            } else {
                Ok(self.known.iter().any(|&(known, lang)| known == word && lang == language))
            };
            Box::pin(async move { result })
        }
    }

    async fn make_pipeline(lookup: Arc<dyn DictionaryLookup>) -> ValidationPipeline {
        let store = Store::in_memory().await.unwrap();
        let global = Arc::new(GlobalLists::default());
        ValidationPipeline {
            alphabets: Arc::new(Alphabets::new()),
            lists: Arc::new(RwLock::new(ListFilter::new(global.clone()))),
            cache: Arc::new(WordCache::new(store.clone(), global)),
            lookup,
            store,
            lookup_timeout: Duration::from_secs(5),
            single_player: false,
        }
    }

    fn apple_state() -> ChainState {
        ChainState {
            current_word: Some("apple".to_string()),
            last_member: Some(1),
            count: 4,
            high_score: 10,
            ..ChainState::new(100, GameMode::Normal)
        }
    }

    const EN: &[Language] = &[Language::English];

    #[tokio::test]
    async fn test_lookup_confirms_word() {
        let lookup = FakeLookup::new(Some(true));
        let pipeline = make_pipeline(lookup.clone()).await;

        let verdict = pipeline.validate("elephant", 2, &apple_state(), EN).await;
        assert_eq!(
            verdict,
            Verdict::Accepted {
                language: Some(Language::English),
                looked_up: true
            }
        );
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_word_skips_lookup() {
        let lookup = FakeLookup::new(Some(false));
        let pipeline = make_pipeline(lookup.clone()).await;
        pipeline
            .cache
            .add_all(&["elephant".to_string()], Some(Language::English))
            .await
            .unwrap();

        let verdict = pipeline.validate("elephant", 2, &apple_state(), EN).await;
        assert!(matches!(verdict, Verdict::Accepted { looked_up: false, .. }));
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_letter_is_soft() {
        let pipeline = make_pipeline(FakeLookup::new(Some(false))).await;
        let mut state = apple_state();
        state.last_member = Some(2);

        let verdict = pipeline.validate("e", 2, &state, EN).await;
        assert_eq!(verdict, Verdict::Rejected(SoftRejection::TooShort));
    }

    #[tokio::test]
    async fn test_illegal_characters_ignored() {
        let pipeline = make_pipeline(FakeLookup::new(Some(true))).await;
        assert_eq!(pipeline.validate("hello world", 2, &apple_state(), EN).await, Verdict::Ignored);
        assert_eq!(pipeline.validate("e1", 2, &apple_state(), EN).await, Verdict::Ignored);
    }

    #[tokio::test]
    async fn test_closed_three_letter_list() {
        let lookup = FakeLookup::new(Some(true));
        let pipeline = make_pipeline(lookup.clone()).await;
        let state = ChainState {
            current_word: Some("music".to_string()),
            ..apple_state()
        };

        let verdict = pipeline.validate("cat", 2, &state, EN).await;
        assert_eq!(verdict, Verdict::Rejected(SoftRejection::Blacklisted));
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_whitelist_never_looks_up() {
        let lookup = FakeLookup::new(None);
        let pipeline = make_pipeline(lookup.clone()).await;
        pipeline.lists.write().await.insert(100, ListKind::Whitelist, "ecat");

        let verdict = pipeline.validate("ecat", 2, &apple_state(), EN).await;
        assert!(matches!(verdict, Verdict::Accepted { looked_up: false, .. }));
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_whitelist_overrides_global_blacklist() {
        let lookup = FakeLookup::new(None);
        let pipeline = make_pipeline(lookup.clone()).await;
        pipeline.lists.write().await.insert(100, ListKind::Whitelist, "eel");

        let verdict = pipeline.validate("eel", 2, &apple_state(), EN).await;
        assert!(matches!(verdict, Verdict::Accepted { .. }));
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_repetition_is_soft() {
        let pipeline = make_pipeline(FakeLookup::new(Some(true))).await;
        let mut tx = pipeline.store.begin().await.unwrap();
        Store::record_used_word(&mut tx, 100, GameMode::Normal, "elephant").await.unwrap();
        tx.commit().await.unwrap();

        let verdict = pipeline.validate("elephant", 2, &apple_state(), EN).await;
        assert_eq!(verdict, Verdict::Rejected(SoftRejection::Repeated));
    }

    #[tokio::test]
    async fn test_same_holder_is_mistake() {
        let pipeline = make_pipeline(FakeLookup::new(Some(true))).await;
        let verdict = pipeline.validate("eagle", 1, &apple_state(), EN).await;
        assert_eq!(verdict, Verdict::Mistake(MistakeReason::SameHolder));
    }

    #[tokio::test]
    async fn test_single_player_allows_same_holder() {
        let mut pipeline = make_pipeline(FakeLookup::new(Some(true))).await;
        pipeline.single_player = true;
        let verdict = pipeline.validate("eagle", 1, &apple_state(), EN).await;
        assert!(matches!(verdict, Verdict::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_wrong_start_is_mistake() {
        let pipeline = make_pipeline(FakeLookup::new(Some(true))).await;
        let verdict = pipeline.validate("banana", 2, &apple_state(), EN).await;
        assert_eq!(
            verdict,
            Verdict::Mistake(MistakeReason::WrongStart {
                expected: "e".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_word_is_mistake() {
        let pipeline = make_pipeline(FakeLookup::new(Some(false))).await;
        let verdict = pipeline.validate("eeeeek", 2, &apple_state(), EN).await;
        assert_eq!(verdict, Verdict::Mistake(MistakeReason::NotAWord));
    }

    #[tokio::test]
    async fn test_classify_without_chain() {
        let lookup = FakeLookup::new(Some(true));
        let pipeline = make_pipeline(lookup.clone()).await;

        assert_eq!(pipeline.classify("a", 100, EN).await.unwrap(), WordCheck::TooShort);
        assert_eq!(pipeline.classify("a b", 100, EN).await.unwrap(), WordCheck::Illegal);
        assert_eq!(pipeline.classify("cat", 100, EN).await.unwrap(), WordCheck::Blacklisted);
        assert_eq!(pipeline.classify("dog", 100, EN).await.unwrap(), WordCheck::Exists(Language::English));
        assert_eq!(lookup.calls(), 1);

        pipeline.cache.stage("dog", Some(Language::English)).await;
        assert_eq!(pipeline.classify("dog", 100, EN).await.unwrap(), WordCheck::Cached(Language::English));
        assert_eq!(lookup.calls(), 1);
    }

    fn fish_state() -> ChainState {
        ChainState {
            current_word: Some("fish".to_string()),
            ..apple_state()
        }
    }

    const EN_DE: &[Language] = &[Language::English, Language::German];

    #[tokio::test]
    async fn test_word_confirmed_in_second_language() {
        let lookup = PerLanguageLookup::new(vec![("haus", Language::German)], vec![]);
        let pipeline = make_pipeline(lookup.clone()).await;

        let verdict = pipeline.validate("haus", 2, &fish_state(), EN_DE).await;
        assert_eq!(
            verdict,
            Verdict::Accepted {
                language: Some(Language::German),
                looked_up: true
            }
        );
        let mut asked = lookup.asked.lock().unwrap().clone();
        asked.sort_by_key(|language| language.code());
        assert_eq!(asked, vec![Language::German, Language::English]);
    }

    #[tokio::test]
    async fn test_unknown_in_every_language_is_mistake() {
        let pipeline = make_pipeline(PerLanguageLookup::new(vec![], vec![])).await;
        let verdict = pipeline.validate("hxyz", 2, &fish_state(), EN_DE).await;
        assert_eq!(verdict, Verdict::Mistake(MistakeReason::NotAWord));
    }

    #[tokio::test]
    async fn test_failed_lookup_without_confirmation_is_fault() {
        let pipeline = make_pipeline(PerLanguageLookup::new(vec![], vec![Language::English])).await;
        assert_eq!(pipeline.validate("hxyz", 2, &fish_state(), EN_DE).await, Verdict::Fault);
    }

    #[tokio::test]
    async fn test_confirmation_beats_failed_lookup() {
        let lookup = PerLanguageLookup::new(vec![("haus", Language::German)], vec![Language::English]);
        let pipeline = make_pipeline(lookup).await;
        assert_eq!(
            pipeline.classify("haus", 100, EN_DE).await.unwrap(),
            WordCheck::Exists(Language::German)
        );
    }

    #[tokio::test]
    async fn test_lookup_error_is_fault() {
        let pipeline = make_pipeline(FakeLookup::new(None)).await;
        let state = ChainState {
            current_word: Some("jazz".to_string()),
            ..apple_state()
        };
        assert_eq!(pipeline.validate("zz", 2, &state, EN).await, Verdict::Fault);
    }
}
