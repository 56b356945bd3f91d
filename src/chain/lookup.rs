//! External dictionary lookups.
//!
//! A lookup is started with [`DictionaryLookup::begin`] as soon as a cache miss
//! is known and resolved with [`LookupHandle::resolve`] after the cheaper local
//! checks, so the round trip overlaps them.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chain::language::Language;
use crate::common::error::LookupError;

/// Result of resolving a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupVerdict {
    Exists,
    NotExists,
    /// Timeout, transport fault or malformed response. Never an acceptance
    /// nor a rejection.
    Error,
}

/// A dictionary service that can tell whether a word exists.
pub trait DictionaryLookup: Send + Sync + 'static {
    /// Query the service for `word`.
    fn query(&self, word: &str, language: Language) -> BoxFuture<'static, Result<bool, LookupError>>;

    /// Start a query in the background without waiting for it.
    fn begin(&self, word: &str, language: Language) -> LookupHandle {
        LookupHandle {
            task: tokio::spawn(self.query(word, language)),
        }
    }
}

/// An in-flight lookup. Dropping it cancels the query.
#[derive(Debug)]
pub struct LookupHandle {
    task: JoinHandle<Result<bool, LookupError>>,
}

impl LookupHandle {
    /// Wait at most `timeout` for the verdict.
    pub async fn resolve(mut self, timeout: Duration) -> LookupVerdict {
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(Ok(true))) => LookupVerdict::Exists,
            Ok(Ok(Ok(false))) => LookupVerdict::NotExists,
            Ok(Ok(Err(e))) => {
                warn!("Dictionary lookup failed: {}", e);
                LookupVerdict::Error
            }
            Ok(Err(e)) => {
                let e = LookupError::Task { message: e.to_string() };
                warn!("Dictionary lookup failed: {}", e);
                LookupVerdict::Error
            }
            Err(_) => {
                warn!("Dictionary lookup timed out after {:?}", timeout);
                LookupVerdict::Error
            }
        }
    }
}

impl Drop for LookupHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Lookup against the MediaWiki opensearch API of Wiktionary.
#[derive(Debug, Clone)]
pub struct WiktionaryLookup {
    client: reqwest::Client,
    /// URL template, `{lang}` is replaced by the language code.
    endpoint: String,
}

impl WiktionaryLookup {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn url_for(&self, language: Language) -> String {
        self.endpoint.replace("{lang}", language.code())
    }
}

impl DictionaryLookup for WiktionaryLookup {
    fn query(&self, word: &str, language: Language) -> BoxFuture<'static, Result<bool, LookupError>> {
        let client = self.client.clone();
        let url = self.url_for(language);
        let word = word.to_string();
        Box::pin(async move {
            debug!("Looking up '{}' at {}", word, url);
            let response = client
                .get(&url)
                .query(&[
                    ("action", "opensearch"),
                    ("namespace", "0"),
                    ("search", word.as_str()),
                    ("limit", "2"),
                    ("format", "json"),
                    ("profile", "strict"),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LookupError::Status {
                    status: status.as_u16(),
                });
            }
            let payload: Value = response.json().await.map_err(|e| LookupError::Malformed {
                message: e.to_string(),
            })?;
            parse_opensearch(&word, &payload)
        })
    }
}

/// Interpret an opensearch payload `[query, [titles], [descriptions], [urls]]`.
///
/// Too few fields or an empty best match mean the word does not exist.
pub fn parse_opensearch(word: &str, payload: &Value) -> Result<bool, LookupError> {
    let fields = payload.as_array().ok_or_else(|| LookupError::Malformed {
        message: "payload is not an array".to_string(),
    })?;
    if fields.len() < 2 {
        return Ok(false);
    }
    let titles = fields[1].as_array().ok_or_else(|| LookupError::Malformed {
        message: "titles field is not an array".to_string(),
    })?;
    let Some(best) = titles.first() else {
        return Ok(false);
    };
    let best = best.as_str().ok_or_else(|| LookupError::Malformed {
        message: "best match is not a string".to_string(),
    })?;
    if best.is_empty() {
        return Ok(false);
    }
    Ok(best.to_lowercase() == word)
}
