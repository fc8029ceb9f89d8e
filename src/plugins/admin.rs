//! Built-in management plugin — module lifecycle and channel control.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::error::BotError;
use crate::event::ChatEvent;
use crate::plugin::registry::{DisableOutcome, EnableOutcome, ReloadOutcome};
use crate::plugin::{CommandContext, CommandSpec, Plugin, PluginFuture};

pub struct Admin;

pub fn factory() -> Result<Arc<dyn Plugin>, BotError> {
    Ok(Arc::new(Admin))
}

fn makelist(names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Relay a lifecycle failure the way the requester expects to read it.
fn problem_line(name: &str, error: &BotError) -> String {
    let detail = match error {
        BotError::LoadFailure { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    format!("Problem loading {name}: [{}] {detail}", error.category())
}

impl Plugin for Admin {
    fn name(&self) -> &'static str {
        "admin"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "modules",
                required_priv: None,
            },
            CommandSpec {
                name: "modenable",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "moddisable",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "modreload",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "join",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "part",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "channels",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "save",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "die",
                required_priv: Some("admin"),
            },
        ]
    }

    fn on_command<'a>(
        &'a self,
        ctx: &'a CommandContext,
        event: &'a ChatEvent,
        name: &'a str,
        args: &'a [String],
    ) -> PluginFuture<'a> {
        Box::pin(async move {
            match name {
                "modules" => {
                    if !args.is_empty() {
                        ctx.reply(event, "usage: modules");
                        return Ok(());
                    }
                    let list = ctx.registry.list();
                    ctx.reply(event, &format!("loaded modules: {}", makelist(&list.loaded)));
                    if !list.pending.is_empty() {
                        ctx.reply(
                            event,
                            &format!(
                                "modules enabled but not found: {}",
                                makelist(&list.pending)
                            ),
                        );
                    }
                    ctx.reply(
                        event,
                        &format!("other available modules: {}", makelist(&list.available)),
                    );
                }
                "modenable" => {
                    if args.is_empty() {
                        ctx.reply(event, "usage: modenable [modulenames]");
                        return Ok(());
                    }
                    for arg in args {
                        let line = match ctx.registry.enable(arg).await {
                            Ok(EnableOutcome::Enabled) | Ok(EnableOutcome::AlreadyEnabled) => {
                                format!("Module {arg} loaded.")
                            }
                            Ok(EnableOutcome::Pending) => {
                                format!("Module {arg} marked for loading once it is found.")
                            }
                            Err(e) => problem_line(arg, &e),
                        };
                        ctx.reply(event, &line);
                    }
                }
                "moddisable" => {
                    if args.is_empty() {
                        ctx.reply(event, "usage: moddisable [modulenames]");
                        return Ok(());
                    }
                    for arg in args {
                        let line = match ctx.registry.disable(arg).await {
                            DisableOutcome::Disabled => format!("Module {arg} disabled."),
                            DisableOutcome::NotLoaded => format!("Module {arg} is not loaded."),
                        };
                        ctx.reply(event, &line);
                    }
                }
                "modreload" => {
                    if args.is_empty() {
                        ctx.reply(event, "usage: modreload [modulenames]");
                        return Ok(());
                    }
                    for arg in args {
                        let line = match ctx.registry.reload(arg).await {
                            Ok(ReloadOutcome::Reloaded) => format!("Module {arg} loaded."),
                            Ok(ReloadOutcome::NotLoaded) => format!("Module {arg} is not loaded."),
                            Err(e) => problem_line(arg, &e),
                        };
                        ctx.reply(event, &line);
                    }
                }
                "join" => {
                    if args.len() != 1 {
                        ctx.reply(event, "usage: join [channelname]");
                        return Ok(());
                    }
                    match ctx.ops.join(&args[0], None) {
                        Ok(()) => ctx.reply(event, "kay."),
                        Err(e) => {
                            warn!(channel = %args[0], error = %e, "join on command failed");
                            ctx.reply(event, &e.to_string());
                        }
                    }
                }
                "part" => {
                    let target = if args.is_empty() && event.channel != ctx.bot_nick {
                        event.channel.clone()
                    } else if args.len() == 1 {
                        args[0].clone()
                    } else {
                        ctx.reply(event, "usage: part [channelname]");
                        return Ok(());
                    };
                    match ctx.ops.leave(&target, None) {
                        Ok(()) => ctx.reply(event, "kay."),
                        Err(e) => {
                            warn!(channel = %target, error = %e, "part on command failed");
                            ctx.reply(event, &e.to_string());
                        }
                    }
                }
                "channels" => {
                    if !args.is_empty() {
                        ctx.reply(event, "usage: channels");
                        return Ok(());
                    }
                    let configured: BTreeSet<String> =
                        ctx.join_channels.iter().cloned().collect();
                    ctx.reply(
                        event,
                        &format!("configured to join: {}", makelist(&configured)),
                    );
                }
                "save" => {
                    if !args.is_empty() {
                        ctx.reply(event, "usage: save");
                        return Ok(());
                    }
                    ctx.registry.save_all()?;
                    ctx.reply(event, "state saved.");
                }
                "die" => {
                    // shut down on the next scheduler tick, not synchronously
                    let shutdown = ctx.shutdown.clone();
                    tokio::spawn(async move {
                        tokio::task::yield_now().await;
                        shutdown.cancel();
                    });
                }
                _ => {}
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn makelist_renders_sorted_or_none() {
        assert_eq!(makelist(&BTreeSet::new()), "none");
        let names: BTreeSet<String> =
            ["echo".to_string(), "admin".to_string()].into_iter().collect();
        assert_eq!(makelist(&names), "admin, echo");
    }

    #[test]
    fn problem_line_uses_category_and_reason() {
        let e = BotError::LoadFailure {
            name: "ticket".into(),
            reason: "bad state".into(),
        };
        assert_eq!(
            problem_line("ticket", &e),
            "Problem loading ticket: [LoadFailure] bad state"
        );
    }
}
