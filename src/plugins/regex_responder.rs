//! Pattern-triggered canned responses.
//!
//! Rules live in plugin state as `(pattern, template)` pairs; every match of
//! every rule yields one response, with named capture groups substituted
//! into `$name` placeholders. Senders matching an ignore mask get nothing.

use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BotError;
use crate::event::{ChatEvent, compile_mask};
use crate::plugin::{OutputSink, Plugin, PluginFuture};

#[derive(Default, Serialize, Deserialize)]
struct SavedState {
    #[serde(default)]
    response_rules: Vec<(String, String)>,
    #[serde(default)]
    link_ignore_list: Vec<String>,
}

#[derive(Default)]
struct Compiled {
    rules: Vec<(Regex, String)>,
    ignore: Vec<Regex>,
    saved: SavedState,
}

#[derive(Default)]
pub struct RegexResponder {
    state: Mutex<Compiled>,
}

pub fn factory() -> Result<Arc<dyn Plugin>, BotError> {
    Ok(Arc::new(RegexResponder::default()))
}

impl RegexResponder {
    /// All responses for one message, in rule order then match order.
    fn responses_for(&self, event: &ChatEvent) -> Vec<String> {
        let state = self.state.lock();
        if state.ignore.iter().any(|mask| mask.is_match(&event.sender)) {
            return Vec::new();
        }
        let mut responses = Vec::new();
        for (pattern, template) in &state.rules {
            for caps in pattern.captures_iter(&event.body) {
                let mut text = String::new();
                caps.expand(template, &mut text);
                responses.push(text);
            }
        }
        responses
    }

    fn respond<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async move {
            for text in self.responses_for(event) {
                // the sink weeds duplicate responses for this event
                out.reply(event, text).await;
            }
            Ok(())
        })
    }
}

impl Plugin for RegexResponder {
    fn name(&self) -> &'static str {
        "regex_responder"
    }

    fn load_state(&self, blob: Value) -> Result<(), BotError> {
        let saved: SavedState = serde_json::from_value(blob)
            .map_err(|e| BotError::State(format!("bad responder state: {e}")))?;

        let mut rules = Vec::with_capacity(saved.response_rules.len());
        for (pattern, template) in &saved.response_rules {
            let compiled = Regex::new(pattern)
                .map_err(|e| BotError::State(format!("bad rule pattern '{pattern}': {e}")))?;
            rules.push((compiled, template.clone()));
        }
        let ignore = saved
            .link_ignore_list
            .iter()
            .map(|mask| compile_mask(mask))
            .collect::<Result<Vec<_>, _>>()?;

        *self.state.lock() = Compiled {
            rules,
            ignore,
            saved,
        };
        Ok(())
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.state.lock().saved).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    fn on_privmsg<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        self.respond(event, out)
    }

    fn on_action<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        self.respond(event, out)
    }
}
