//! Cache of words known to be valid.
//!
//! Words confirmed by a live lookup are staged in memory and written in one
//! batch by the maintenance flush; lookups see staged words immediately.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chain::language::Language;
use crate::chain::lists::GlobalLists;
use crate::common::error::StoreResult;
use crate::store::Store;

#[derive(Debug)]
pub struct WordCache {
    store: Store,
    global: Arc<GlobalLists>,
    staged: Mutex<HashSet<(String, Option<Language>)>>,
}

impl WordCache {
    pub fn new(store: Store, global: Arc<GlobalLists>) -> Self {
        Self {
            store,
            global,
            staged: Mutex::new(HashSet::new()),
        }
    }

    /// Whether `word` is known valid, for `language` or for any language.
    pub async fn contains(&self, word: &str, language: Option<Language>) -> StoreResult<bool> {
        {
            let staged = self.staged.lock().await;
            let hit = staged
                .iter()
                .any(|(w, l)| w == word && (language.is_none() || *l == language));
            if hit {
                return Ok(true);
            }
        }
        self.store
            .cache_contains(word, language.map(Language::code))
            .await
    }

    /// Insert words, skipping globally blacklisted ones and ignoring words
    /// already cached. Returns how many were new.
    pub async fn add_all(&self, words: &[String], language: Option<Language>) -> StoreResult<u64> {
        let accepted: Vec<String> = words
            .iter()
            .filter(|w| !self.global.is_blacklisted(w))
            .cloned()
            .collect();
        if accepted.is_empty() {
            return Ok(0);
        }
        self.store
            .cache_insert_all(&accepted, language.map(Language::code))
            .await
    }

    /// Remember a word confirmed by a live lookup until the next flush.
    pub async fn stage(&self, word: &str, language: Option<Language>) {
        if self.global.is_blacklisted(word) {
            return;
        }
        debug!("Staging '{}' for the word cache", word);
        self.staged.lock().await.insert((word.to_string(), language));
    }

    pub async fn staged_len(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// Persist staged words. Words stay staged if the write fails.
    pub async fn flush_staged(&self) -> StoreResult<u64> {
        let pending: Vec<(String, Option<Language>)> = self.staged.lock().await.iter().cloned().collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut by_language: Vec<(Option<Language>, Vec<String>)> = Vec::new();
        for (word, language) in &pending {
            match by_language.iter_mut().find(|(l, _)| l == language) {
                Some((_, words)) => words.push(word.clone()),
                None => by_language.push((*language, vec![word.clone()])),
            }
        }

        let mut inserted = 0;
        for (language, words) in &by_language {
            inserted += self.add_all(words, *language).await?;
        }

        let mut staged = self.staged.lock().await;
        for entry in &pending {
            staged.remove(entry);
        }
        info!("Flushed {} staged words ({} new) to the word cache", pending.len(), inserted);
        Ok(inserted)
    }
}
