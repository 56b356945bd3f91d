//! Discord bot integration.
//!
//! This module presents the word-chain game on Discord: it forwards gateway
//! events to the engine, renders outcomes as reactions and replies, runs text
//! commands and applies role holders.

pub mod client;
pub mod commands;
pub mod handler;
pub mod roles;

pub use client::{DiscordBot, DiscordBotBuilder};
