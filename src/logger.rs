//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup. `RUST_LOG` takes precedence so a deployed
//! bot can be turned up without touching its config file.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::BotError;

/// Initialise the global tracing subscriber, writing to stderr.
///
/// `level` accepts standard level strings (`"error"` … `"trace"`) or a full
/// filter directive; it is the fallback when `RUST_LOG` is unset or invalid.
pub fn init(level: &str) -> Result<(), BotError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| BotError::Logger(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| BotError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Validate a log level string from config before use.
pub fn parse_level(level: &str) -> Result<LevelFilter, BotError> {
    if level.is_empty() {
        return Err(BotError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| BotError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn init_succeeds_or_already_init() {
        // Another test in the same process may have initialised the global
        // subscriber first — both outcomes are acceptable.
        match init("info") {
            Ok(()) => {}
            Err(BotError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
