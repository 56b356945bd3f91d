//! Bulk import of a language word list into the word cache.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info};

use crate::chain::cache::WordCache;
use crate::chain::language::{Alphabets, Language};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Summary of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    /// Tokens found in the file.
    pub read: usize,
    /// Distinct tokens that passed the casing and alphabet filters.
    pub accepted: usize,
    /// Words not cached before.
    pub added: u64,
}

/// Whether a token is an acronym or similar, e.g. "NASA".
fn is_all_uppercase(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// Lower-cased, deduplicated tokens of `text` spelled in `language`.
pub fn filter_tokens(text: &str, language: Language, alphabets: &Alphabets) -> (usize, Vec<String>) {
    let mut read = 0;
    let mut seen = HashSet::new();
    let mut words = Vec::new();
    for token in text.split_whitespace() {
        read += 1;
        if is_all_uppercase(token) {
            continue;
        }
        let word = token.to_lowercase();
        if alphabets.accepts(language, &word) && seen.insert(word.clone()) {
            words.push(word);
        }
    }
    (read, words)
}

/// Read the word list at `path` and add its words to the cache for `language`.
///
/// Globally blacklisted words are skipped by the cache itself.
pub async fn import_file(
    cache: &WordCache,
    alphabets: &Alphabets,
    language: Language,
    path: &Path,
    batch_size: usize,
) -> anyhow::Result<ImportReport> {
    let started = Utc::now();
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read word list '{}'", path.display()))?;

    let (read, words) = filter_tokens(&text, language, alphabets);
    info!(
        language = %language,
        read,
        accepted = words.len(),
        "Importing word list {}",
        path.display()
    );

    let mut added = 0;
    let batches = words.chunks(batch_size.max(1));
    let total = batches.len();
    for (index, batch) in batches.enumerate() {
        added += cache
            .add_all(batch, Some(language))
            .await
            .with_context(|| format!("Failed to store batch {} of {}", index + 1, total))?;
        debug!(batch = index + 1, total, added, "Batch stored");
        if (index + 1) % 10 == 0 {
            info!("Imported {} of {} batches", index + 1, total);
        }
    }

    let elapsed = Utc::now() - started;
    info!(
        added,
        elapsed_ms = elapsed.num_milliseconds(),
        "Import of '{}' words finished",
        language
    );
    Ok(ImportReport {
        read,
        accepted: words.len(),
        added,
    })
}
