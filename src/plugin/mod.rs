//! Plugin surface — the extension seam every behavior module implements.
//!
//! A plugin is a `Send + Sync` struct registered in the
//! [`registry::PluginRegistry`] under a unique name. Reply hooks return
//! boxed futures so implementations can suspend on their own I/O; outputs
//! stream through an [`OutputSink`] as they are produced rather than being
//! collected and returned.
//!
//! State Bridge: [`Plugin::load_state`] runs once at enable time with the
//! last-saved blob for the plugin's name (an empty object if none);
//! [`Plugin::save_state`] runs on the external save trigger. Blobs are
//! opaque JSON mappings and plugins must default missing keys.

pub mod registry;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::chat::ChatOps;
use crate::error::BotError;
use crate::event::{ChatEvent, ResponseOutput};
use registry::PluginRegistry;

/// Boxed, borrowed future returned by plugin hooks.
pub type PluginFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BotError>> + Send + 'a>>;

/// A chat command owned by a plugin.
///
/// Names must be unique across all active plugins; a clash is surfaced as
/// [`BotError::CommandConflict`] when the second plugin is enabled.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Privilege required to invoke the command; `None` means anyone.
    pub required_priv: Option<&'static str>,
}

pub trait Plugin: Send + Sync {
    /// Unique plugin name — the registry key.
    fn name(&self) -> &'static str;

    /// Commands this plugin owns.
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn load_state(&self, _blob: Value) -> Result<(), BotError> {
        Ok(())
    }

    fn save_state(&self) -> Value {
        Value::Object(Default::default())
    }

    /// React to a channel or direct message.
    fn on_privmsg<'a>(&'a self, _event: &'a ChatEvent, _out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// React to a `/me` action.
    fn on_action<'a>(&'a self, _event: &'a ChatEvent, _out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Handle one of the commands declared in [`Plugin::commands`]. The
    /// privilege guard has already passed by the time this runs.
    fn on_command<'a>(
        &'a self,
        _ctx: &'a CommandContext,
        _event: &'a ChatEvent,
        _name: &'a str,
        _args: &'a [String],
    ) -> PluginFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

// ── CommandContext ───────────────────────────────────────────────────────────

/// Capability surface handed to command handlers.
pub struct CommandContext {
    pub ops: Arc<dyn ChatOps>,
    pub registry: Arc<PluginRegistry>,
    /// Cancelling this token shuts the whole service down (`die`).
    pub shutdown: CancellationToken,
    pub bot_nick: String,
    /// Channels the service is configured to auto-join.
    pub join_channels: Vec<String>,
}

impl CommandContext {
    /// Send an addressed reply to the command's invoker.
    pub fn reply(&self, event: &ChatEvent, text: &str) {
        let out = ResponseOutput::addressed(event, &self.bot_nick, text, true);
        if let Err(e) = self.ops.msg(&out.target, &out.text) {
            warn!(target = %out.target, error = %e, "could not deliver command reply");
        }
    }
}

// ── OutputSink ───────────────────────────────────────────────────────────────

type SeenSet = HashSet<(String, String)>;

/// Streams one plugin's outputs for one event, suppressing duplicates.
///
/// The per-sink seen-set scopes dedup to a single plugin's reply stream; an
/// optional shared set extends it across all of an event's plugins when the
/// deployment asks for global dedup.
pub struct OutputSink {
    tx: mpsc::Sender<ResponseOutput>,
    bot_nick: String,
    seen: Mutex<SeenSet>,
    global_seen: Option<Arc<Mutex<SeenSet>>>,
}

impl OutputSink {
    pub fn new(
        tx: mpsc::Sender<ResponseOutput>,
        bot_nick: impl Into<String>,
        global_seen: Option<Arc<Mutex<SeenSet>>>,
    ) -> Self {
        Self {
            tx,
            bot_nick: bot_nick.into(),
            seen: Mutex::new(HashSet::new()),
            global_seen,
        }
    }

    /// Emit one output. Returns `false` if it was suppressed as a duplicate
    /// or the event's forwarder has gone away.
    pub async fn send(&self, output: ResponseOutput) -> bool {
        let key = (output.target.clone(), output.text.clone());
        if !self.seen.lock().insert(key.clone()) {
            return false;
        }
        if let Some(global) = &self.global_seen {
            if !global.lock().insert(key) {
                return false;
            }
        }
        self.tx.send(output).await.is_ok()
    }

    /// Emit an unprefixed reply addressed back to the event's origin.
    pub async fn reply(&self, event: &ChatEvent, text: impl Into<String>) -> bool {
        self.send(ResponseOutput::addressed(event, &self.bot_nick, text, false))
            .await
    }
}
