//! Application-wide error types.

use thiserror::Error;

use crate::chat::ChatError;

/// Everything that can go wrong inside the bot core.
///
/// Plugin reply-computation failures are contained at the fan-out boundary
/// (logged, never user-visible); command-handler failures are surfaced to
/// the invoking user. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum BotError {
    /// No plugin factory is registered under the requested name.
    #[error("no plugin named '{0}' is known")]
    NotFound(String),

    /// Plugin construction or state load failed during enable.
    #[error("plugin '{name}' failed to load: {reason}")]
    LoadFailure { name: String, reason: String },

    /// A plugin declared a command name another active plugin already owns.
    #[error("command '{command}' is already registered by plugin '{owner}'")]
    CommandConflict { command: String, owner: String },

    #[error("permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("config error: {0}")]
    Config(String),

    #[error("state error: {0}")]
    State(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Short variant name, used when relaying a load failure into chat
    /// (`Problem loading X: [LoadFailure] ...`).
    pub fn category(&self) -> &'static str {
        match self {
            BotError::NotFound(_) => "NotFound",
            BotError::LoadFailure { .. } => "LoadFailure",
            BotError::CommandConflict { .. } => "CommandConflict",
            BotError::PermissionDenied => "PermissionDenied",
            BotError::Chat(ChatError::Unsupported { .. }) => "Unsupported",
            BotError::Chat(ChatError::Transport(_)) => "Transport",
            BotError::Config(_) => "Config",
            BotError::State(_) => "State",
            BotError::Logger(_) => "Logger",
            BotError::Io(_) => "Io",
        }
    }
}
