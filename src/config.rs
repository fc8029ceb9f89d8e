//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `PETREL_LOG_LEVEL` and `PETREL_STATE_FILE` overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BotError;

/// Which transport the service connects through.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Irc(IrcConfig),
    Xmpp(XmppConfig),
}

#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// `host:port` of the IRC server the external connection dials.
    pub server: String,
}

#[derive(Debug, Clone)]
pub struct XmppConfig {
    /// Bot account JID (`user@host`).
    pub jid: String,
    /// MUC service host; defaults to the JID's host part.
    pub conference_server: String,
    /// Keep-alive probe interval in seconds.
    pub ping_interval_secs: u64,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub nick: String,
    pub log_level: String,
    /// Plugin state document path (already expanded, no `~`).
    pub state_file: PathBuf,
    /// Channels (or rooms) joined at startup and listed by `channels`.
    pub join_channels: Vec<String>,
    pub transport: TransportConfig,
    /// Identities granted the `admin` privilege at startup.
    pub admins: Vec<String>,
    /// Plugins enabled at startup.
    pub autoload: Vec<String>,
    /// Extend reply dedup across all of an event's plugins.
    pub global_dedup: bool,
}

// ── raw TOML shapes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    transport: RawTransport,
    #[serde(default)]
    auth: RawAuth,
    #[serde(default)]
    plugins: RawPlugins,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    /// Defaults to `name`.
    #[serde(default)]
    nick: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_state_file")]
    state_file: String,
    #[serde(default)]
    channels: Vec<String>,
}

#[derive(Deserialize)]
struct RawTransport {
    #[serde(default = "default_transport_kind")]
    kind: String,
    #[serde(default)]
    irc: RawIrc,
    #[serde(default)]
    xmpp: RawXmpp,
}

impl Default for RawTransport {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            irc: RawIrc::default(),
            xmpp: RawXmpp::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawIrc {
    #[serde(default = "default_irc_server")]
    server: String,
}

impl Default for RawIrc {
    fn default() -> Self {
        Self {
            server: default_irc_server(),
        }
    }
}

#[derive(Deserialize)]
struct RawXmpp {
    #[serde(default)]
    jid: String,
    #[serde(default)]
    conference_server: Option<String>,
    #[serde(default = "default_ping_interval")]
    ping_interval_secs: u64,
}

impl Default for RawXmpp {
    fn default() -> Self {
        Self {
            jid: String::new(),
            conference_server: None,
            ping_interval_secs: default_ping_interval(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawAuth {
    #[serde(default)]
    admins: Vec<String>,
}

#[derive(Deserialize)]
struct RawPlugins {
    #[serde(default = "default_autoload")]
    autoload: Vec<String>,
    #[serde(default)]
    global_dedup: bool,
}

impl Default for RawPlugins {
    fn default() -> Self {
        Self {
            autoload: default_autoload(),
            global_dedup: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_file() -> String {
    "~/.petrel/state.json".to_string()
}

fn default_transport_kind() -> String {
    "irc".to_string()
}

fn default_irc_server() -> String {
    "irc.libera.chat:6667".to_string()
}

fn default_ping_interval() -> u64 {
    120
}

fn default_autoload() -> Vec<String> {
    vec!["admin".to_string(), "echo".to_string()]
}

// ── loading ──────────────────────────────────────────────────────────────────

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, BotError> {
    let log_override = env::var("PETREL_LOG_LEVEL").ok();
    let state_override = env::var("PETREL_STATE_FILE").ok();
    load_from(
        Path::new("config/default.toml"),
        log_override.as_deref(),
        state_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides so
/// tests never mutate env vars.
pub fn load_from(
    path: &Path,
    log_override: Option<&str>,
    state_override: Option<&str>,
) -> Result<Config, BotError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| BotError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| BotError::Config(format!("parse error in {}: {e}", path.display())))?;

    let transport = match parsed.transport.kind.as_str() {
        "irc" => TransportConfig::Irc(IrcConfig {
            server: parsed.transport.irc.server,
        }),
        "xmpp" => {
            let xmpp = parsed.transport.xmpp;
            if xmpp.jid.is_empty() {
                return Err(BotError::Config(
                    "transport.xmpp.jid is required for the xmpp transport".into(),
                ));
            }
            let conference_server = match xmpp.conference_server {
                Some(server) => server,
                None => match xmpp.jid.split_once('@') {
                    Some((_, host)) => host.to_string(),
                    None => {
                        return Err(BotError::Config(format!(
                            "cannot derive conference server from jid '{}'",
                            xmpp.jid
                        )));
                    }
                },
            };
            TransportConfig::Xmpp(XmppConfig {
                jid: xmpp.jid,
                conference_server,
                ping_interval_secs: xmpp.ping_interval_secs,
            })
        }
        other => {
            return Err(BotError::Config(format!("unknown transport kind '{other}'")));
        }
    };

    let nick = parsed.bot.nick.unwrap_or_else(|| parsed.bot.name.clone());
    let state_file = expand_home(state_override.unwrap_or(&parsed.bot.state_file));
    let log_level = log_override.unwrap_or(&parsed.bot.log_level).to_string();

    Ok(Config {
        bot_name: parsed.bot.name,
        nick,
        log_level,
        state_file,
        join_channels: parsed.bot.channels,
        transport,
        admins: parsed.auth.admins,
        autoload: parsed.plugins.autoload,
        global_dedup: parsed.plugins.global_dedup,
    })
}

/// Expand a leading `~` to the user's home directory; other paths are
/// returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ─────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — IRC transport, no admins, no autoload.
#[cfg(test)]
impl Config {
    pub fn test_default(state_file: &Path) -> Self {
        Self {
            bot_name: "petrel".into(),
            nick: "petrel".into(),
            log_level: "info".into(),
            state_file: state_file.to_path_buf(),
            join_channels: vec!["#petrel".into()],
            transport: TransportConfig::Irc(IrcConfig {
                server: "localhost:6667".into(),
            }),
            admins: Vec::new(),
            autoload: Vec::new(),
            global_dedup: false,
        }
    }
}
