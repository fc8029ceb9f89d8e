//! Inbound events, reply outputs, and identity masks.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::BotError;

/// What kind of message an event carries.
///
/// Explicit admin/control commands are privmsg events reclassified by the
/// command parser in the dispatcher; they never reach the fan-out engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Privmsg,
    /// A `/me` action (CTCP ACTION on IRC).
    Action,
}

/// One inbound chat message. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub kind: EventKind,
    /// Full caller identity: `nick!user@host` on IRC, occupant nick on XMPP.
    pub sender: String,
    /// Channel the message arrived on; the bot's own nick for direct messages.
    pub channel: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(
        kind: EventKind,
        sender: impl Into<String>,
        channel: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            channel: channel.into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    /// Nick portion of the sender identity.
    pub fn sender_nick(&self) -> &str {
        match self.sender.split_once('!') {
            Some((nick, _)) => nick,
            None => &self.sender,
        }
    }
}

/// One outbound reply. Equality on `(target, text)` defines duplicate
/// suppression within a single event's processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseOutput {
    pub target: String,
    pub text: String,
}

impl ResponseOutput {
    /// Address a reply back to where `event` came from.
    ///
    /// In-channel replies go to the channel, prefixed `nick: ` when `prefix`
    /// is set; direct messages go back to the sender, never prefixed.
    pub fn addressed(event: &ChatEvent, bot_nick: &str, text: impl Into<String>, prefix: bool) -> Self {
        let text = text.into();
        if event.channel == bot_nick {
            Self {
                target: event.sender_nick().to_string(),
                text,
            }
        } else if prefix {
            Self {
                target: event.channel.clone(),
                text: format!("{}: {}", event.sender_nick(), text),
            }
        } else {
            Self {
                target: event.channel.clone(),
                text,
            }
        }
    }
}

/// Compile an ignore-list glob mask (`*`, `?`) into an anchored regex.
///
/// Masks come from plugin state, so a malformed one surfaces as a state
/// error at load time rather than a silent non-match.
pub fn compile_mask(mask: &str) -> Result<Regex, BotError> {
    let mut pattern = String::with_capacity(mask.len() + 8);
    pattern.push('^');
    for ch in mask.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| BotError::State(format!("bad mask '{mask}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(channel: &str, body: &str) -> ChatEvent {
        ChatEvent::new(EventKind::Privmsg, "alice!a@host.example", channel, body)
    }

    #[test]
    fn sender_nick_strips_irc_mask() {
        assert_eq!(event("#chan", "hi").sender_nick(), "alice");
        let bare = ChatEvent::new(EventKind::Privmsg, "alice", "#chan", "hi");
        assert_eq!(bare.sender_nick(), "alice");
    }

    #[test]
    fn channel_reply_is_prefixed_on_request() {
        let out = ResponseOutput::addressed(&event("#chan", "hi"), "petrel", "hello", true);
        assert_eq!(out.target, "#chan");
        assert_eq!(out.text, "alice: hello");

        let plain = ResponseOutput::addressed(&event("#chan", "hi"), "petrel", "hello", false);
        assert_eq!(plain.text, "hello");
    }

    #[test]
    fn direct_reply_targets_sender_unprefixed() {
        let out = ResponseOutput::addressed(&event("petrel", "hi"), "petrel", "hello", true);
        assert_eq!(out.target, "alice");
        assert_eq!(out.text, "hello");
    }

    #[test]
    fn masks_glob_match_identities() {
        let m = compile_mask("*!*@host.example").expect("mask compiles");
        assert!(m.is_match("alice!a@host.example"));
        assert!(!m.is_match("alice!a@elsewhere.example"));

        let q = compile_mask("bo?!*").expect("mask compiles");
        assert!(q.is_match("bob!x@y"));
        assert!(!q.is_match("alice!x@y"));
    }

    #[test]
    fn mask_metacharacters_are_literal() {
        let m = compile_mask("a.c!*@*").expect("mask compiles");
        assert!(m.is_match("a.c!u@h"));
        assert!(!m.is_match("abc!u@h"));
    }
}
