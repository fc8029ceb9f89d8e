//! Event router and response fan-out engine.
//!
//! # Routing
//!
//! Each channel gets its own worker task fed through an unbounded queue, so
//! events within one channel are processed in arrival order while channels
//! proceed independently. A privmsg addressed to the bot (`nick:` /
//! `nick,` in a channel, or any direct message) whose first token names a
//! registered command takes the command path through the privilege guard;
//! everything else fans out.
//!
//! # Fan-out
//!
//! One task per active plugin per event, spawned into a [`JoinSet`]. Each
//! plugin streams outputs through its own [`OutputSink`]; a forwarder
//! drains the merged stream and emits each output whole through the
//! capability adapter, so a stalled plugin never holds up a sibling's
//! outputs and plugin failures are logged and contained here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::Privileges;
use crate::chat::ChatOps;
use crate::event::{ChatEvent, EventKind, ResponseOutput};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::{CommandContext, OutputSink};

/// Cheaply cloneable handle over the shared dispatch state.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<PluginRegistry>,
    ops: Arc<dyn ChatOps>,
    privs: Arc<Privileges>,
    shutdown: CancellationToken,
    bot_nick: String,
    join_channels: Vec<String>,
    global_dedup: bool,
    workers: Mutex<HashMap<String, mpsc::UnboundedSender<ChatEvent>>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<PluginRegistry>,
        ops: Arc<dyn ChatOps>,
        privs: Arc<Privileges>,
        shutdown: CancellationToken,
        bot_nick: impl Into<String>,
        join_channels: Vec<String>,
        global_dedup: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                ops,
                privs,
                shutdown,
                bot_nick: bot_nick.into(),
                join_channels,
                global_dedup,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queue an event on its channel's worker, spawning the worker on first
    /// use. Queueing preserves arrival order within the channel.
    pub fn dispatch(&self, event: ChatEvent) {
        let mut workers = self.shared.workers.lock();
        let tx = workers.entry(event.channel.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_worker(Arc::clone(&self.shared), rx));
            tx
        });
        if tx.send(event).is_err() {
            debug!("channel worker gone, dropping event");
        }
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<ChatEvent>) {
    loop {
        tokio::select! {
            biased;

            _ = shared.shutdown.cancelled() => break,

            event = rx.recv() => match event {
                Some(event) => shared.process(event).await,
                None => break,
            },
        }
    }
}

impl Shared {
    async fn process(&self, event: ChatEvent) {
        if event.kind == EventKind::Privmsg {
            if let Some((name, args)) = parse_command(&event, &self.bot_nick) {
                if self.try_command(&event, &name, &args).await {
                    return;
                }
            }
        }
        self.fan_out(event).await;
    }

    /// Run the command path; `false` means the name resolved to no
    /// registered command and the event should be treated as conversation.
    async fn try_command(&self, event: &ChatEvent, name: &str, args: &[String]) -> bool {
        let Some((plugin, required_priv)) = self.registry.command_entry(name) else {
            return false;
        };

        let ctx = CommandContext {
            ops: Arc::clone(&self.ops),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.clone(),
            bot_nick: self.bot_nick.clone(),
            join_channels: self.join_channels.clone(),
        };

        if let Some(privilege) = required_priv {
            if !self.privs.check(event.sender_nick(), &event.channel, privilege) {
                debug!(
                    command = %name,
                    sender = %event.sender_nick(),
                    "privilege check failed"
                );
                ctx.reply(event, "permission denied");
                return true;
            }
        }

        debug!(command = %name, plugin = plugin.name(), "running command");
        if let Err(e) = plugin.on_command(&ctx, event, name, args).await {
            // handler failures are surfaced to the invoking user
            ctx.reply(event, &format!("error: {e}"));
        }
        true
    }

    async fn fan_out(&self, event: ChatEvent) {
        let plugins = self.registry.active_snapshot();
        if plugins.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let (tx, mut rx) = mpsc::channel::<ResponseOutput>(64);
        let global_seen = self
            .global_dedup
            .then(|| Arc::new(Mutex::new(HashSet::new())));

        let mut tasks: JoinSet<()> = JoinSet::new();
        for plugin in plugins {
            let sink = OutputSink::new(tx.clone(), self.bot_nick.clone(), global_seen.clone());
            let event = Arc::clone(&event);
            tasks.spawn(async move {
                let result = match event.kind {
                    EventKind::Privmsg => plugin.on_privmsg(&event, &sink).await,
                    EventKind::Action => plugin.on_action(&event, &sink).await,
                };
                if let Err(e) = result {
                    // contained: one broken plugin must not starve siblings
                    warn!(plugin = plugin.name(), error = %e, "reply computation failed");
                }
            });
        }
        drop(tx);

        // Outputs stream as produced; the channel closes once every sink is
        // dropped. Each output is one whole message — no fragment
        // interleaving across plugins.
        while let Some(output) = rx.recv().await {
            if let Err(e) = self.ops.msg(&output.target, &output.text) {
                warn!(target = %output.target, error = %e, "could not deliver output");
            }
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "reply task panicked");
            }
        }
    }
}

/// Recognise an explicit command invocation: any direct message, or an
/// in-channel message addressed `nick:` / `nick,`.
pub fn parse_command(event: &ChatEvent, bot_nick: &str) -> Option<(String, Vec<String>)> {
    if event.kind != EventKind::Privmsg {
        return None;
    }
    let line = if event.channel == bot_nick {
        event.body.trim()
    } else {
        let rest = event.body.trim_start().strip_prefix(bot_nick)?;
        rest.strip_prefix([':', ','])?.trim()
    };
    let mut parts = line.split_whitespace();
    let name = parts.next()?.to_string();
    let args: Vec<String> = parts.map(str::to_string).collect();
    Some((name, args))
}
