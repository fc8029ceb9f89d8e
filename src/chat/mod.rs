//! Capability adapter — the transport-neutral chat operation surface.
//!
//! Plugins and the dispatcher talk to one [`ChatOps`] trait; each transport
//! backend renders the operations into its own outbound command stream. Wire
//! I/O is external: backends own only an outbound queue, and the connection
//! task that drains it is wired up at bootstrap.
//!
//! A transport that structurally cannot perform an operation returns
//! [`ChatError::Unsupported`] — a typed result callers must handle, never a
//! silent no-op.

pub mod irc;
pub mod xmpp;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The underlying transport cannot perform this operation at all.
    #[error("{op} is not supported on the {transport} transport")]
    Unsupported {
        op: &'static str,
        transport: &'static str,
    },

    /// The transport connection refused or dropped the outbound command.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type ChatResult = Result<(), ChatError>;

/// Optional value arguments for a MODE change.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModeArgs<'a> {
    pub limit: Option<u32>,
    pub user: Option<&'a str>,
    pub mask: Option<&'a str>,
}

/// The fixed operation set every transport backend exposes.
///
/// All operations are synchronous and non-blocking: they enqueue an outbound
/// command and return. Privilege checks and command handlers may therefore
/// call them without suspending.
pub trait ChatOps: Send + Sync {
    fn join(&self, channel: &str, key: Option<&str>) -> ChatResult;
    fn leave(&self, channel: &str, reason: Option<&str>) -> ChatResult;
    fn kick(&self, channel: &str, user: &str, reason: Option<&str>) -> ChatResult;
    fn invite(&self, user: &str, channel: &str) -> ChatResult;
    fn topic(&self, channel: &str, topic: Option<&str>) -> ChatResult;
    fn mode(&self, channel: &str, set: bool, modes: &str, args: ModeArgs<'_>) -> ChatResult;
    fn say(&self, channel: &str, text: &str) -> ChatResult;
    fn msg(&self, target: &str, text: &str) -> ChatResult;
    fn notice(&self, user: &str, text: &str) -> ChatResult;
    fn away(&self, text: Option<&str>) -> ChatResult;
    fn whois(&self, nick: &str) -> ChatResult;
    fn register(&self, nick: &str) -> ChatResult;
    fn set_nick(&self, nick: &str) -> ChatResult;
    fn quit(&self, text: Option<&str>) -> ChatResult;
    fn describe(&self, channel: &str, action: &str) -> ChatResult;
    fn ping(&self, user: &str) -> ChatResult;
}
