//! The word-chain engine.
//!
//! Submissions are classified by the [`pipeline`], applied to the chain
//! [`state`] by the channel workers of the [`engine`] and scored by [`karma`].
//! Side effects that can wait are batched by the [`maintenance`] scheduler.

pub mod admin;
pub mod cache;
pub mod engine;
pub mod housekeeping;
pub mod karma;
pub mod language;
pub mod lists;
pub mod lookup;
pub mod maintenance;
pub mod pipeline;
pub mod state;

pub use engine::{GameEngine, Outcome, PendingOutcome, Submission};
pub use housekeeping::RoleSync;
pub use language::{Alphabets, Language};
pub use lists::GlobalLists;
pub use lookup::{DictionaryLookup, WiktionaryLookup};
pub use pipeline::{MistakeReason, SoftRejection, WordCheck};
pub use state::{ChainState, Reaction};
