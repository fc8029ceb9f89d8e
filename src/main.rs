//! petrel-bot — service entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Init logger at the configured level
//!   3. Load config and plugin state
//!   4. Build the registry, enable autoload plugins, seed privileges
//!   5. Wire the transport backend and its outbound drain
//!   6. Run the service loop until Ctrl-C or `die`, then save state
//!
//! Real wire connections are owned by external drivers; this binary wires a
//! console driver so the whole pipeline runs end to end during development:
//! stdin lines become events, outbound commands are logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use petrel_bot::auth::Privileges;
use petrel_bot::chat::irc::IrcBackend;
use petrel_bot::chat::xmpp::{MucCommand, XmppBackend};
use petrel_bot::chat::ChatOps;
use petrel_bot::config::{self, Config, TransportConfig};
use petrel_bot::dispatch::Dispatcher;
use petrel_bot::error::BotError;
use petrel_bot::event::{ChatEvent, EventKind};
use petrel_bot::logger;
use petrel_bot::plugin::registry::PluginRegistry;
use petrel_bot::plugins;
use petrel_bot::service;
use petrel_bot::state::StateStore;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BotError> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::parse_level(&config.log_level)?;
    logger::init(&config.log_level)?;

    info!(
        bot = %config.bot_name,
        state_file = %config.state_file.display(),
        "config loaded"
    );

    let store = Arc::new(StateStore::open(&config.state_file)?);
    let registry = Arc::new(PluginRegistry::new(store));
    plugins::register_builtins(&registry).await;

    for name in &config.autoload {
        match registry.enable(name).await {
            Ok(outcome) => info!(plugin = %name, ?outcome, "autoload"),
            Err(e) => warn!(plugin = %name, error = %e, "autoload failed"),
        }
    }

    let privs = Arc::new(Privileges::new());
    for admin in &config.admins {
        privs.grant(admin, "admin");
    }
    if let Ok(auto_admin) = std::env::var("PETREL_AUTO_ADMIN") {
        privs.grant(&auto_admin, "admin");
    }

    let shutdown = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(64);

    let ops: Arc<dyn ChatOps> = match &config.transport {
        TransportConfig::Irc(irc) => {
            info!(server = %irc.server, "irc transport selected");
            let (backend, lines) = IrcBackend::new(&config.nick);
            tokio::spawn(drain_irc_outbound(lines, shutdown.clone()));
            Arc::new(backend)
        }
        TransportConfig::Xmpp(xmpp) => {
            info!(jid = %xmpp.jid, "xmpp transport selected");
            let (backend, commands) = XmppBackend::new(&config.nick, &xmpp.conference_server);
            let backend =
                backend.with_ping_interval(Duration::from_secs(xmpp.ping_interval_secs));
            let backend = Arc::new(backend);
            backend.spawn_keepalive(shutdown.clone());
            tokio::spawn(drain_xmpp_outbound(commands, shutdown.clone()));
            backend
        }
    };

    for channel in &config.join_channels {
        if let Err(e) = ops.join(channel, None) {
            warn!(%channel, error = %e, "auto-join failed");
        }
    }

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&ops),
        privs,
        shutdown.clone(),
        config.nick.clone(),
        config.join_channels.clone(),
        config.global_dedup,
    );

    tokio::spawn(console_driver(
        config.clone(),
        event_tx,
        shutdown.clone(),
    ));
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    service::run(event_rx, dispatcher, shutdown).await;

    registry.save_all()?;
    info!("state saved, goodbye");
    Ok(())
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("ctrl-c received");
        shutdown.cancel();
    }
}

/// Development console: each stdin line becomes an event. `#chan text`
/// targets a channel; anything else arrives as a direct message.
async fn console_driver(
    config: Config,
    events: mpsc::Sender<ChatEvent>,
    shutdown: CancellationToken,
) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("console closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "console read error");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (channel, body) = match line.split_once(' ') {
                    Some((first, rest)) if first.starts_with('#') => (first.to_string(), rest),
                    _ => (config.nick.clone(), line),
                };
                let event = ChatEvent::new(
                    EventKind::Privmsg,
                    "console!local@petrel",
                    channel,
                    body,
                );
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn drain_irc_outbound(
    mut lines: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            line = lines.recv() => match line {
                Some(line) => info!(%line, "outbound"),
                None => break,
            },
        }
    }
}

async fn drain_xmpp_outbound(
    mut commands: mpsc::UnboundedReceiver<MucCommand>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            command = commands.recv() => match command {
                Some(command) => info!(command = ?command, "outbound"),
                None => break,
            },
        }
    }
}
