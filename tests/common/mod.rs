//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use petrel_bot::auth::Privileges;
use petrel_bot::chat::irc::IrcBackend;
use petrel_bot::dispatch::Dispatcher;
use petrel_bot::error::BotError;
use petrel_bot::event::{ChatEvent, EventKind};
use petrel_bot::plugin::registry::{PluginFactory, PluginRegistry};
use petrel_bot::plugin::{OutputSink, Plugin, PluginFuture};
use petrel_bot::state::StateStore;

/// A plugin producing a fixed output sequence, optionally after a delay or
/// as a failure.
pub struct ScriptedPlugin {
    name: &'static str,
    outputs: Vec<String>,
    delay: Option<Duration>,
    fail: bool,
    loaded_blob: Arc<Mutex<Option<Value>>>,
}

impl ScriptedPlugin {
    pub fn new(name: &'static str, outputs: Vec<String>) -> Self {
        Self {
            name,
            outputs,
            delay: None,
            fail: false,
            loaded_blob: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_blob_probe(mut self, probe: Arc<Mutex<Option<Value>>>) -> Self {
        self.loaded_blob = probe;
        self
    }
}

impl Plugin for ScriptedPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load_state(&self, blob: Value) -> Result<(), BotError> {
        *self.loaded_blob.lock() = Some(blob);
        Ok(())
    }

    fn save_state(&self) -> Value {
        serde_json::json!({ "plugin": self.name })
    }

    fn on_privmsg<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(BotError::State("scripted failure".into()));
            }
            for text in &self.outputs {
                out.reply(event, text.clone()).await;
            }
            Ok(())
        })
    }
}

/// Factory producing [`ScriptedPlugin`]s and counting constructions.
pub fn counting_factory(
    name: &'static str,
    outputs: Vec<String>,
    counter: Arc<AtomicUsize>,
) -> PluginFactory {
    Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedPlugin::new(name, outputs.clone())) as Arc<dyn Plugin>)
    })
}

/// Factory whose plugin always fails to load its state.
pub fn broken_factory(name: &'static str) -> PluginFactory {
    Arc::new(move || {
        struct BrokenLoad(&'static str);
        impl Plugin for BrokenLoad {
            fn name(&self) -> &'static str {
                self.0
            }
            fn load_state(&self, _blob: Value) -> Result<(), BotError> {
                Err(BotError::State("refusing state".into()))
            }
        }
        Ok(Arc::new(BrokenLoad(name)) as Arc<dyn Plugin>)
    })
}

pub fn fresh_registry() -> (Arc<PluginRegistry>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::open(dir.path().join("state.json")).expect("store opens");
    (Arc::new(PluginRegistry::new(Arc::new(store))), dir)
}

/// Full dispatch pipeline over a real IRC backend with its outbound line
/// stream exposed.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub registry: Arc<PluginRegistry>,
    pub privs: Arc<Privileges>,
    pub lines: mpsc::UnboundedReceiver<String>,
    pub shutdown: CancellationToken,
    _dir: TempDir,
}

pub fn harness(global_dedup: bool) -> Harness {
    let (registry, dir) = fresh_registry();
    let (backend, lines) = IrcBackend::new("petrel");
    let privs = Arc::new(Privileges::new());
    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(backend),
        Arc::clone(&privs),
        shutdown.clone(),
        "petrel",
        vec!["#petrel".into()],
        global_dedup,
    );
    Harness {
        dispatcher,
        registry,
        privs,
        lines,
        shutdown,
        _dir: dir,
    }
}

pub fn privmsg(sender: &str, channel: &str, body: &str) -> ChatEvent {
    ChatEvent::new(EventKind::Privmsg, sender, channel, body)
}

/// Next outbound line, or `None` after `ms` of silence.
pub async fn recv_line(lines: &mut mpsc::UnboundedReceiver<String>, ms: u64) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(ms), lines.recv())
        .await
        .ok()
        .flatten()
}

/// Collect outbound lines until `ms` of silence.
pub async fn drain_lines(lines: &mut mpsc::UnboundedReceiver<String>, ms: u64) -> Vec<String> {
    let mut collected = Vec::new();
    while let Some(line) = recv_line(lines, ms).await {
        collected.push(line);
    }
    collected
}
