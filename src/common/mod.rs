//! Common utilities and types shared across the application.

pub mod error;
pub mod logging;
pub mod types;

pub use types::{
    ChannelId, GameMode, InsertResult, ListKind, PlayerId, RemoveResult, RoleId, RoleKind, ServerId,
};
