//! Ticket-link responder.
//!
//! Watches messages for ticket references (`HUB-123`, or a configured
//! shortcode like `#123`) against any number of configured trackers and
//! replies with browse links. A tracker can additionally look the ticket's
//! summary up over HTTP; lookup failures degrade to the bare link.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::BotError;
use crate::event::{ChatEvent, compile_mask};
use crate::plugin::{CommandContext, CommandSpec, OutputSink, Plugin, PluginFuture};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Serialize, Deserialize)]
struct TrackerData {
    base_url: String,
    project: String,
    #[serde(default)]
    shortcode: Option<String>,
    #[serde(default)]
    lookup_summary: bool,
}

#[derive(Default, Serialize, Deserialize)]
struct SavedState {
    #[serde(default)]
    trackers: Vec<TrackerData>,
    #[serde(default)]
    link_ignore_list: Vec<String>,
}

#[derive(Clone)]
struct Tracker {
    data: TrackerData,
    project_re: Regex,
    shortcode_re: Option<Regex>,
}

impl Tracker {
    fn from_data(data: TrackerData) -> Result<Self, BotError> {
        let project_re = reference_re(&data.project, true)?;
        let shortcode_re = match &data.shortcode {
            Some(code) => Some(reference_re(code, false)?),
            None => None,
        };
        Ok(Self {
            data,
            project_re,
            shortcode_re,
        })
    }

    /// Ticket numbers referenced in `message`, first mention wins.
    fn references(&self, message: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut numbers = Vec::new();
        let patterns = [Some(&self.project_re), self.shortcode_re.as_ref()];
        for pattern in patterns.into_iter().flatten() {
            for caps in pattern.captures_iter(message) {
                if let Some(num) = caps.name("num") {
                    if seen.insert(num.as_str().to_string()) {
                        numbers.push(num.as_str().to_string());
                    }
                }
            }
        }
        numbers
    }

    fn link(&self, number: &str) -> String {
        format!(
            "{}/browse/{}-{}",
            self.data.base_url.trim_end_matches('/'),
            self.data.project,
            number
        )
    }
}

/// Reference pattern: the code at a word-ish boundary, optionally dashed,
/// followed by the ticket number.
fn reference_re(code: &str, dashed: bool) -> Result<Regex, BotError> {
    let mut pattern = String::from(r#"(?:^|[\[\s({<>:",@*'~])"#);
    pattern.push_str(&regex::escape(code));
    if dashed {
        pattern.push('-');
    }
    pattern.push_str(r"(?P<num>\d+)\b");
    Regex::new(&pattern).map_err(|e| BotError::State(format!("bad tracker code '{code}': {e}")))
}

#[derive(Default)]
struct Compiled {
    trackers: Vec<Tracker>,
    ignore: Vec<Regex>,
    saved: SavedState,
}

pub struct TicketLinks {
    http: reqwest::Client,
    state: Mutex<Compiled>,
}

pub fn factory() -> Result<Arc<dyn Plugin>, BotError> {
    let http = reqwest::Client::builder()
        .timeout(LOOKUP_TIMEOUT)
        .build()
        .map_err(|e| BotError::State(format!("http client: {e}")))?;
    Ok(Arc::new(TicketLinks {
        http,
        state: Mutex::new(Compiled::default()),
    }))
}

impl TicketLinks {
    fn respond<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        Box::pin(async move {
            let trackers: Vec<Tracker> = {
                let state = self.state.lock();
                if state.ignore.iter().any(|mask| mask.is_match(&event.sender)) {
                    return Ok(());
                }
                state.trackers.clone()
            };

            for tracker in trackers {
                for number in tracker.references(&event.body) {
                    let link = tracker.link(&number);
                    let text = if tracker.data.lookup_summary {
                        match self.fetch_summary(&tracker, &number).await {
                            Some(summary) => format!("{link} — {summary}"),
                            None => link,
                        }
                    } else {
                        link
                    };
                    out.reply(event, text).await;
                }
            }
            Ok(())
        })
    }

    /// Best-effort summary lookup; any failure degrades to the bare link.
    async fn fetch_summary(&self, tracker: &Tracker, number: &str) -> Option<String> {
        let url = format!(
            "{}/rest/api/2/issue/{}-{}?fields=summary",
            tracker.data.base_url.trim_end_matches('/'),
            tracker.data.project,
            number
        );
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "ticket summary lookup failed");
                return None;
            }
        };
        let body: Value = match response.error_for_status().map(|r| r.json::<Value>()) {
            Ok(json) => match json.await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%url, error = %e, "ticket summary body unreadable");
                    return None;
                }
            },
            Err(e) => {
                warn!(%url, error = %e, "ticket summary lookup rejected");
                return None;
            }
        };
        body.pointer("/fields/summary")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn recompile(&self, saved: SavedState) -> Result<(), BotError> {
        let trackers = saved
            .trackers
            .iter()
            .cloned()
            .map(Tracker::from_data)
            .collect::<Result<Vec<_>, _>>()?;
        let ignore = saved
            .link_ignore_list
            .iter()
            .map(|mask| compile_mask(mask))
            .collect::<Result<Vec<_>, _>>()?;
        *self.state.lock() = Compiled {
            trackers,
            ignore,
            saved,
        };
        Ok(())
    }
}

impl Plugin for TicketLinks {
    fn name(&self) -> &'static str {
        "ticket"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "add-tracker",
                required_priv: Some("admin"),
            },
            CommandSpec {
                name: "list-trackers",
                required_priv: Some("admin"),
            },
        ]
    }

    fn load_state(&self, blob: Value) -> Result<(), BotError> {
        let saved: SavedState = serde_json::from_value(blob)
            .map_err(|e| BotError::State(format!("bad ticket state: {e}")))?;
        self.recompile(saved)
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.state.lock().saved)
            .unwrap_or_else(|_| Value::Object(Default::default()))
    }

    fn on_privmsg<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        self.respond(event, out)
    }

    fn on_action<'a>(&'a self, event: &'a ChatEvent, out: &'a OutputSink) -> PluginFuture<'a> {
        self.respond(event, out)
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
                "add-tracker" => {
                    if args.len() < 2 || args.len() > 3 {
                        ctx.reply(event, "usage: add-tracker <base-url> <project> [shortcode]");
                        return Ok(());
                    }
                    let data = TrackerData {
                        base_url: args[0].clone(),
                        project: args[1].clone(),
                        shortcode: args.get(2).cloned(),
                        lookup_summary: false,
                    };
                    let mut saved = {
                        let state = self.state.lock();
                        SavedState {
                            trackers: state.saved.trackers.clone(),
                            link_ignore_list: state.saved.link_ignore_list.clone(),
                        }
                    };
                    saved.trackers.push(data);
                    self.recompile(saved)?;
                    ctx.reply(event, &format!("tracker added: {}", args[1]));
                }
                "list-trackers" => {
                    if !args.is_empty() {
                        ctx.reply(event, "usage: list-trackers");
                        return Ok(());
                    }
                    let lines: Vec<String> = {
                        let state = self.state.lock();
                        state
                            .saved
                            .trackers
                            .iter()
                            .map(|t| {
                                format!(
                                    "{}: {} shortcode={}",
                                    t.project,
                                    t.base_url,
                                    t.shortcode.as_deref().unwrap_or("none")
                                )
                            })
                            .collect()
                    };
                    if lines.is_empty() {
                        ctx.reply(event, "no trackers configured");
                    }
                    for line in lines {
                        ctx.reply(event, &line);
                    }
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
    use crate::event::EventKind;
    use serde_json::json;

    fn loaded() -> Arc<dyn Plugin> {
        let plugin = factory().expect("factory");
        plugin
            .load_state(json!({
                "trackers": [{
                    "base_url": "https://issues.example.org",
                    "project": "HUB",
                    "shortcode": "#",
                }],
                "link_ignore_list": ["cibot!*"],
            }))
            .expect("state loads");
        plugin
    }

    fn tracker() -> Tracker {
        Tracker::from_data(TrackerData {
            base_url: "https://issues.example.org/".into(),
            project: "HUB".into(),
            shortcode: Some("#".into()),
            lookup_summary: false,
        })
        .expect("tracker compiles")
    }

    #[test]
    fn finds_project_and_shortcode_references() {
        let t = tracker();
        assert_eq!(t.references("see HUB-12 and #34"), vec!["12", "34"]);
        assert_eq!(t.references("(HUB-12) again HUB-12"), vec!["12"]);
        assert!(t.references("nothing here").is_empty());
    }

    #[test]
    fn embedded_text_is_not_a_reference() {
        let t = tracker();
        assert!(t.references("stubHUB-12").is_empty());
        assert!(t.references("HUB-x12").is_empty());
    }

    #[test]
    fn link_building_strips_trailing_slash() {
        let t = tracker();
        assert_eq!(t.link("12"), "https://issues.example.org/browse/HUB-12");
    }

    #[tokio::test]
    async fn responds_with_links() {
        let plugin = loaded();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let out = OutputSink::new(tx, "petrel", None);
        let event = ChatEvent::new(EventKind::Privmsg, "alice!a@h", "#eng", "HUB-7 broke");
        plugin.on_privmsg(&event, &out).await.expect("respond");
        drop(out);
        let got = rx.recv().await.expect("output");
        assert_eq!(got.text, "https://issues.example.org/browse/HUB-7");
    }

    #[tokio::test]
    async fn ignore_mask_silences_sender() {
        let plugin = loaded();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let out = OutputSink::new(tx, "petrel", None);
        let event = ChatEvent::new(EventKind::Privmsg, "cibot!ci@build", "#eng", "HUB-7");
        plugin.on_privmsg(&event, &out).await.expect("respond");
        drop(out);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn state_round_trips_through_save() {
        let plugin = loaded();
        let saved = plugin.save_state();
        assert_eq!(saved.pointer("/trackers/0/project"), Some(&json!("HUB")));
        assert_eq!(
            saved.pointer("/link_ignore_list/0"),
            Some(&json!("cibot!*"))
        );
    }
}
