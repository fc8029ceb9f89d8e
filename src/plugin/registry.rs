//! Plugin registry — the factory catalog, the active instance map, the
//! pending set, and the lifecycle operations over them.
//!
//! The registry exclusively owns plugin instances; the fan-out engine only
//! borrows a snapshot for the duration of one event. All lifecycle
//! operations for a given name run under that name's async lock, so
//! concurrent enables cannot construct two live instances. The inner maps
//! sit behind a plain mutex that is never held across an await.
//!
//! "Hot reload" is re-invoking the registered factory under the name lock —
//! no in-place code patching.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::{CommandSpec, Plugin};
use crate::error::BotError;
use crate::state::StateStore;

/// Constructor registered for a plugin name; re-invoked on reload.
pub type PluginFactory = Arc<dyn Fn() -> Result<Arc<dyn Plugin>, BotError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// A new instance was constructed and its state loaded.
    Enabled,
    /// The name was already active; the existing instance is untouched.
    AlreadyEnabled,
    /// No factory is known yet; the name is recorded and will auto-enable
    /// when a matching factory registers.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableOutcome {
    Disabled,
    NotLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    NotLoaded,
}

/// Result of [`PluginRegistry::list`]: three disjoint name sets whose union
/// covers the whole catalog plus the pending names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleList {
    pub loaded: BTreeSet<String>,
    pub pending: BTreeSet<String>,
    pub available: BTreeSet<String>,
}

struct CommandEntry {
    owner: String,
    required_priv: Option<&'static str>,
}

#[derive(Default)]
struct Inner {
    catalog: HashMap<String, PluginFactory>,
    active: HashMap<String, Arc<dyn Plugin>>,
    pending: HashSet<String>,
    commands: HashMap<String, CommandEntry>,
}

pub struct PluginRegistry {
    inner: Mutex<Inner>,
    /// Per-name critical sections for enable/disable/reload.
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    store: Arc<StateStore>,
}

impl PluginRegistry {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            name_locks: Mutex::new(HashMap::new()),
            store,
        }
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.name_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Add a factory to the catalog. A name previously recorded as pending
    /// is enabled immediately; that outcome (or failure) is returned.
    pub async fn register_factory(
        &self,
        name: &str,
        factory: PluginFactory,
    ) -> Option<Result<EnableOutcome, BotError>> {
        let was_pending = {
            let mut inner = self.inner.lock();
            inner.catalog.insert(name.to_string(), factory);
            inner.pending.contains(name)
        };
        if was_pending {
            Some(self.enable(name).await)
        } else {
            None
        }
    }

    /// Enable `name`, constructing an instance and loading its saved state.
    ///
    /// Any failure — construction, state load, command conflict — is
    /// returned to the caller verbatim and leaves no partial entry behind.
    pub async fn enable(&self, name: &str) -> Result<EnableOutcome, BotError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let factory = {
            let mut inner = self.inner.lock();
            if inner.active.contains_key(name) {
                return Ok(EnableOutcome::AlreadyEnabled);
            }
            match inner.catalog.get(name) {
                Some(factory) => factory.clone(),
                None => {
                    inner.pending.insert(name.to_string());
                    debug!(plugin = %name, "no factory known, marked pending");
                    return Ok(EnableOutcome::Pending);
                }
            }
        };

        let instance = self.build(name, &factory)?;
        self.install(name, instance)?;
        info!(plugin = %name, "plugin enabled");
        Ok(EnableOutcome::Enabled)
    }

    /// Remove the active instance (or cancel a pending enable) for `name`.
    /// Never saves state implicitly.
    pub async fn disable(&self, name: &str) -> DisableOutcome {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let mut inner = self.inner.lock();
        if inner.active.remove(name).is_some() {
            inner.commands.retain(|_, entry| entry.owner != name);
            info!(plugin = %name, "plugin disabled");
            DisableOutcome::Disabled
        } else if inner.pending.remove(name) {
            info!(plugin = %name, "pending enable cancelled");
            DisableOutcome::Disabled
        } else {
            DisableOutcome::NotLoaded
        }
    }

    /// Atomically replace the active instance with a freshly constructed
    /// one. A name that is not active is reported without side effects; a
    /// failed rebuild leaves the plugin disabled and returns the failure.
    pub async fn reload(&self, name: &str) -> Result<ReloadOutcome, BotError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let factory = {
            let mut inner = self.inner.lock();
            if !inner.active.contains_key(name) {
                return Ok(ReloadOutcome::NotLoaded);
            }
            let Some(factory) = inner.catalog.get(name).cloned() else {
                return Ok(ReloadOutcome::NotLoaded);
            };
            inner.active.remove(name);
            inner.commands.retain(|_, entry| entry.owner != name);
            factory
        };

        let instance = self.build(name, &factory)?;
        self.install(name, instance)?;
        info!(plugin = %name, "plugin reloaded");
        Ok(ReloadOutcome::Reloaded)
    }

    /// Construct an instance and load its saved state. Caller holds the
    /// name lock.
    fn build(&self, name: &str, factory: &PluginFactory) -> Result<Arc<dyn Plugin>, BotError> {
        let instance = factory().map_err(|e| BotError::LoadFailure {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        instance
            .load_state(self.store.get(name))
            .map_err(|e| BotError::LoadFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(instance)
    }

    /// Register the instance and its commands, rejecting command-name
    /// clashes with other active plugins. Caller holds the name lock.
    fn install(&self, name: &str, instance: Arc<dyn Plugin>) -> Result<(), BotError> {
        let specs: Vec<CommandSpec> = instance.commands();
        let mut inner = self.inner.lock();
        for spec in &specs {
            if let Some(entry) = inner.commands.get(spec.name) {
                return Err(BotError::CommandConflict {
                    command: spec.name.to_string(),
                    owner: entry.owner.clone(),
                });
            }
        }
        for spec in &specs {
            inner.commands.insert(
                spec.name.to_string(),
                CommandEntry {
                    owner: name.to_string(),
                    required_priv: spec.required_priv,
                },
            );
        }
        inner.pending.remove(name);
        inner.active.insert(name.to_string(), instance);
        Ok(())
    }

    /// Partition every known or pending name into loaded / pending /
    /// available, computed by set difference over one consistent view.
    pub fn list(&self) -> ModuleList {
        let inner = self.inner.lock();
        let loaded: BTreeSet<String> = inner.active.keys().cloned().collect();
        let pending: BTreeSet<String> = inner.pending.iter().cloned().collect();
        let available: BTreeSet<String> = inner
            .catalog
            .keys()
            .filter(|name| !inner.active.contains_key(*name) && !inner.pending.contains(*name))
            .cloned()
            .collect();
        ModuleList {
            loaded,
            pending,
            available,
        }
    }

    /// The data-path borrow: a snapshot of the active set, atomic with
    /// respect to enable/disable.
    pub fn active_snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.inner.lock().active.values().cloned().collect()
    }

    pub fn instance(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.lock().active.get(name).cloned()
    }

    /// Owning plugin and required privilege for a command name.
    pub fn command_entry(&self, command: &str) -> Option<(Arc<dyn Plugin>, Option<&'static str>)> {
        let inner = self.inner.lock();
        let entry = inner.commands.get(command)?;
        let plugin = inner.active.get(&entry.owner)?.clone();
        Some((plugin, entry.required_priv))
    }

    /// External save trigger: collect every active plugin's state into the
    /// store and flush it to disk.
    pub fn save_all(&self) -> Result<(), BotError> {
        let snapshot: Vec<(String, Arc<dyn Plugin>)> = {
            let inner = self.inner.lock();
            inner
                .active
                .iter()
                .map(|(name, plugin)| (name.clone(), plugin.clone()))
                .collect()
        };
        for (name, plugin) in snapshot {
            self.store.put(&name, plugin.save_state());
        }
        self.store.flush()
    }

    /// Saved blob for `name` — exposed for plugins that inspect their own
    /// persisted state in command handlers.
    pub fn saved_state(&self, name: &str) -> Value {
        self.store.get(name)
    }
}
