//! XMPP multi-user-chat backend.
//!
//! Maps the room-shaped subset of the capability surface onto MUC commands
//! and answers [`ChatError::Unsupported`] for everything the protocol has no
//! equivalent for — kick, invite, topic, mode, away, whois, register,
//! set_nick, quit, ping, and joining with a channel key.
//!
//! Room vs. direct addressing: a target is a room iff it is in the joined
//! room set; anything else (including an ambiguous bare JID) is a direct
//! message. The external connection driver reports membership through
//! [`XmppBackend::room_joined`] / [`XmppBackend::room_left`].

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ChatError, ChatOps, ChatResult, ModeArgs};

const TRANSPORT: &str = "xmpp";

/// Interval between keep-alive probes to the server.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Typed outbound MUC commands, drained by the external connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MucCommand {
    JoinRoom {
        room: String,
        server: String,
        nick: String,
    },
    /// One-time configuration submitted when the service reports a join
    /// created the room.
    ConfigureRoom { room: String },
    LeaveRoom { room: String },
    GroupChat { room: String, body: String },
    DirectChat { to: String, body: String },
    /// Keep-alive probe (`urn:xmpp:ping`).
    Ping,
}

pub struct XmppBackend {
    nick: String,
    conference_server: String,
    rooms: Mutex<HashSet<String>>,
    out: mpsc::UnboundedSender<MucCommand>,
    ping_interval: Duration,
}

impl XmppBackend {
    pub fn new(
        nick: impl Into<String>,
        conference_server: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<MucCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                nick: nick.into(),
                conference_server: conference_server.into(),
                rooms: Mutex::new(HashSet::new()),
                out: tx,
                ping_interval: DEFAULT_PING_INTERVAL,
            },
            rx,
        )
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    fn send(&self, command: MucCommand) -> ChatResult {
        self.out
            .send(command)
            .map_err(|_| ChatError::Transport("connection closed".into()))
    }

    fn unsupported(op: &'static str) -> ChatResult {
        Err(ChatError::Unsupported {
            op,
            transport: TRANSPORT,
        })
    }

    /// Whether `target` denotes a room we are currently joined to.
    pub fn is_room(&self, target: &str) -> bool {
        self.rooms.lock().contains(target)
    }

    /// Split a join target into `(room, server, nick)`, accepting `room`,
    /// `room@server` and `room@server/nick`, with the configured conference
    /// server and own nick as defaults.
    fn split_target(&self, channel: &str) -> (String, String, String) {
        let (room, rest) = match channel.split_once('@') {
            Some((room, rest)) => (room.to_string(), rest.to_string()),
            None => (channel.to_string(), self.conference_server.clone()),
        };
        let (server, nick) = match rest.split_once('/') {
            Some((server, nick)) => (server.to_string(), nick.to_string()),
            None => (rest, self.nick.clone()),
        };
        (room, server, nick)
    }

    /// Called by the connection driver once the MUC service confirms a join.
    ///
    /// A join that created the room triggers the one-time room-configuration
    /// command before the room is marked joined; joining an existing room
    /// skips it.
    pub fn room_joined(&self, room: &str, created: bool) -> ChatResult {
        if created {
            debug!(%room, "configuring newly created room");
            self.send(MucCommand::ConfigureRoom {
                room: room.to_string(),
            })?;
        }
        self.rooms.lock().insert(room.to_string());
        info!(%room, "joined room");
        Ok(())
    }

    /// Called by the connection driver when we have left (or been removed
    /// from) a room.
    pub fn room_left(&self, room: &str) {
        self.rooms.lock().remove(room);
        info!(%room, "left room");
    }

    /// Spawn the keep-alive probe task.
    ///
    /// Runs for the lifetime of the connection: one [`MucCommand::Ping`] per
    /// interval, first probe a full interval after start, stopping when
    /// `shutdown` is cancelled or the outbound channel closes.
    pub fn spawn_keepalive(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let out = self.out.clone();
        let period = self.ping_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; swallow that so the first probe
            // lands one full period after connect
            tick.tick().await;
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        debug!("keep-alive cancelled");
                        break;
                    }

                    _ = tick.tick() => {
                        if out.send(MucCommand::Ping).is_err() {
                            debug!("outbound channel closed, keep-alive exiting");
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl ChatOps for XmppBackend {
    fn join(&self, channel: &str, key: Option<&str>) -> ChatResult {
        if key.is_some() {
            return Self::unsupported("join with channel key");
        }
        let (room, server, nick) = self.split_target(channel);
        self.send(MucCommand::JoinRoom { room, server, nick })
    }

    fn leave(&self, channel: &str, _reason: Option<&str>) -> ChatResult {
        self.send(MucCommand::LeaveRoom {
            room: channel.to_string(),
        })
    }

    fn kick(&self, _channel: &str, _user: &str, _reason: Option<&str>) -> ChatResult {
        Self::unsupported("kick")
    }

    fn invite(&self, _user: &str, _channel: &str) -> ChatResult {
        Self::unsupported("invite")
    }

    fn topic(&self, _channel: &str, _topic: Option<&str>) -> ChatResult {
        Self::unsupported("topic")
    }

    fn mode(&self, _channel: &str, _set: bool, _modes: &str, _args: ModeArgs<'_>) -> ChatResult {
        Self::unsupported("mode")
    }

    fn say(&self, channel: &str, text: &str) -> ChatResult {
        self.msg(channel, text)
    }

    fn msg(&self, target: &str, text: &str) -> ChatResult {
        if self.is_room(target) {
            self.send(MucCommand::GroupChat {
                room: target.to_string(),
                body: text.to_string(),
            })
        } else {
            self.send(MucCommand::DirectChat {
                to: target.to_string(),
                body: text.to_string(),
            })
        }
    }

    fn notice(&self, user: &str, text: &str) -> ChatResult {
        self.msg(user, text)
    }

    fn away(&self, _text: Option<&str>) -> ChatResult {
        Self::unsupported("away")
    }

    fn whois(&self, _nick: &str) -> ChatResult {
        Self::unsupported("whois")
    }

    fn register(&self, _nick: &str) -> ChatResult {
        Self::unsupported("register")
    }

    fn set_nick(&self, _nick: &str) -> ChatResult {
        Self::unsupported("set_nick")
    }

    fn quit(&self, _text: Option<&str>) -> ChatResult {
        Self::unsupported("quit")
    }

    fn describe(&self, channel: &str, action: &str) -> ChatResult {
        self.msg(channel, &format!("/me {action}"))
    }

    fn ping(&self, _user: &str) -> ChatResult {
        Self::unsupported("ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (XmppBackend, mpsc::UnboundedReceiver<MucCommand>) {
        XmppBackend::new("petrel", "conference.example.org")
    }

    #[test]
    fn join_target_forms() {
        let (xmpp, mut rx) = backend();
        xmpp.join("eng", None).expect("send");
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::JoinRoom {
                room: "eng".into(),
                server: "conference.example.org".into(),
                nick: "petrel".into(),
            }
        );

        xmpp.join("ops@rooms.example.org/lurker", None).expect("send");
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::JoinRoom {
                room: "ops".into(),
                server: "rooms.example.org".into(),
                nick: "lurker".into(),
            }
        );
    }

    #[test]
    fn unsupported_ops_enqueue_nothing() {
        let (xmpp, mut rx) = backend();
        let cases: Vec<ChatResult> = vec![
            xmpp.kick("eng", "alice", None),
            xmpp.invite("alice", "eng"),
            xmpp.topic("eng", Some("new topic")),
            xmpp.mode("eng", true, "o", ModeArgs::default()),
            xmpp.away(None),
            xmpp.whois("alice"),
            xmpp.register("stormy"),
            xmpp.set_nick("stormy"),
            xmpp.quit(None),
            xmpp.ping("alice"),
            xmpp.join("eng", Some("sekrit")),
        ];
        for result in cases {
            assert!(matches!(result, Err(ChatError::Unsupported { .. })));
        }
        assert!(rx.try_recv().is_err(), "no partial side effects");
    }

    #[test]
    fn room_addressing_falls_back_to_direct() {
        let (xmpp, mut rx) = backend();
        xmpp.room_joined("eng@conference.example.org", false).expect("join");
        // no configuration for an existing room
        assert!(rx.try_recv().is_err());

        xmpp.say("eng@conference.example.org", "hello").expect("send");
        xmpp.msg("alice@example.org", "psst").expect("send");
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::GroupChat {
                room: "eng@conference.example.org".into(),
                body: "hello".into(),
            }
        );
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::DirectChat {
                to: "alice@example.org".into(),
                body: "psst".into(),
            }
        );
    }

    #[test]
    fn created_room_is_configured_once() {
        let (xmpp, mut rx) = backend();
        xmpp.room_joined("new@conference.example.org", true).expect("join");
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::ConfigureRoom {
                room: "new@conference.example.org".into(),
            }
        );
        assert!(xmpp.is_room("new@conference.example.org"));
        assert!(rx.try_recv().is_err());

        xmpp.room_left("new@conference.example.org");
        assert!(!xmpp.is_room("new@conference.example.org"));
    }

    #[test]
    fn describe_becomes_me_message() {
        let (xmpp, mut rx) = backend();
        xmpp.room_joined("eng@conference.example.org", false).expect("join");
        xmpp.describe("eng@conference.example.org", "waves").expect("send");
        assert_eq!(
            rx.try_recv().expect("command"),
            MucCommand::GroupChat {
                room: "eng@conference.example.org".into(),
                body: "/me waves".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_probes_until_cancelled() {
        let (xmpp, mut rx) = backend();
        let shutdown = CancellationToken::new();
        let handle = xmpp.spawn_keepalive(shutdown.clone());

        // paused time auto-advances to the next timer deadline
        assert_eq!(rx.recv().await.expect("probe"), MucCommand::Ping);
        assert_eq!(rx.recv().await.expect("probe"), MucCommand::Ping);

        shutdown.cancel();
        handle.await.expect("keep-alive task exits cleanly");
    }
}
