//! Built-in plugins.

pub mod admin;
pub mod clock;
pub mod echo;
pub mod regex_responder;
pub mod ticket;

use std::sync::Arc;

use tracing::warn;

use crate::error::BotError;
use crate::plugin::Plugin;
use crate::plugin::registry::PluginRegistry;

/// Register every built-in plugin factory with the registry.
pub async fn register_builtins(registry: &PluginRegistry) {
    let factories: [(&str, fn() -> Result<Arc<dyn Plugin>, BotError>); 5] = [
        ("admin", admin::factory),
        ("clock", clock::factory),
        ("echo", echo::factory),
        ("regex_responder", regex_responder::factory),
        ("ticket", ticket::factory),
    ];
    for (name, factory) in factories {
        if let Some(Err(e)) = registry.register_factory(name, Arc::new(factory)).await {
            warn!(plugin = name, error = %e, "auto-enable of pending plugin failed");
        }
    }
}
