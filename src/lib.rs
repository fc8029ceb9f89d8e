//! petrel-bot — a pluggable chat-relay hub for IRC and XMPP group chat.
//!
//! Inbound messages flow transport → capability adapter → dispatcher →
//! active plugins (concurrently) → deduplicated outputs → capability
//! adapter → transport. The binary entry point is `src/main.rs`; this
//! library root exposes the internals for integration tests.

pub mod auth;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod logger;
pub mod plugin;
pub mod plugins;
pub mod service;
pub mod state;
