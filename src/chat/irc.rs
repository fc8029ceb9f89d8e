//! IRC backend — renders every capability into a classic IRC command line.
//!
//! Lines are pushed into an unbounded outbound channel; the connection task
//! owning the socket drains it. Tests read the receiver directly.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ChatError, ChatOps, ChatResult, ModeArgs};

pub struct IrcBackend {
    nick: Mutex<String>,
    out: mpsc::UnboundedSender<String>,
}

impl IrcBackend {
    /// Build a backend and hand back the outbound line stream.
    pub fn new(nick: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                nick: Mutex::new(nick.into()),
                out: tx,
            },
            rx,
        )
    }

    pub fn nick(&self) -> String {
        self.nick.lock().clone()
    }

    fn send(&self, line: String) -> ChatResult {
        self.out
            .send(line)
            .map_err(|_| ChatError::Transport("connection closed".into()))
    }
}

impl ChatOps for IrcBackend {
    fn join(&self, channel: &str, key: Option<&str>) -> ChatResult {
        match key {
            Some(key) => self.send(format!("JOIN {channel} {key}")),
            None => self.send(format!("JOIN {channel}")),
        }
    }

    fn leave(&self, channel: &str, reason: Option<&str>) -> ChatResult {
        match reason {
            Some(reason) => self.send(format!("PART {channel} :{reason}")),
            None => self.send(format!("PART {channel}")),
        }
    }

    fn kick(&self, channel: &str, user: &str, reason: Option<&str>) -> ChatResult {
        match reason {
            Some(reason) => self.send(format!("KICK {channel} {user} :{reason}")),
            None => self.send(format!("KICK {channel} {user}")),
        }
    }

    fn invite(&self, user: &str, channel: &str) -> ChatResult {
        self.send(format!("INVITE {user} {channel}"))
    }

    fn topic(&self, channel: &str, topic: Option<&str>) -> ChatResult {
        match topic {
            Some(topic) => self.send(format!("TOPIC {channel} :{topic}")),
            None => self.send(format!("TOPIC {channel}")),
        }
    }

    fn mode(&self, channel: &str, set: bool, modes: &str, args: ModeArgs<'_>) -> ChatResult {
        let sign = if set { '+' } else { '-' };
        let mut line = format!("MODE {channel} {sign}{modes}");
        if let Some(limit) = args.limit {
            line.push(' ');
            line.push_str(&limit.to_string());
        }
        if let Some(user) = args.user {
            line.push(' ');
            line.push_str(user);
        }
        if let Some(mask) = args.mask {
            line.push(' ');
            line.push_str(mask);
        }
        self.send(line)
    }

    fn say(&self, channel: &str, text: &str) -> ChatResult {
        self.msg(channel, text)
    }

    fn msg(&self, target: &str, text: &str) -> ChatResult {
        self.send(format!("PRIVMSG {target} :{text}"))
    }

    fn notice(&self, user: &str, text: &str) -> ChatResult {
        self.send(format!("NOTICE {user} :{text}"))
    }

    fn away(&self, text: Option<&str>) -> ChatResult {
        match text {
            Some(text) => self.send(format!("AWAY :{text}")),
            None => self.send("AWAY".to_string()),
        }
    }

    fn whois(&self, nick: &str) -> ChatResult {
        self.send(format!("WHOIS {nick}"))
    }

    fn register(&self, nick: &str) -> ChatResult {
        self.send(format!("NICK {nick}"))?;
        self.send(format!("USER {nick} 0 * :{nick}"))?;
        *self.nick.lock() = nick.to_string();
        Ok(())
    }

    fn set_nick(&self, nick: &str) -> ChatResult {
        self.send(format!("NICK {nick}"))?;
        *self.nick.lock() = nick.to_string();
        Ok(())
    }

    fn quit(&self, text: Option<&str>) -> ChatResult {
        match text {
            Some(text) => self.send(format!("QUIT :{text}")),
            None => self.send("QUIT".to_string()),
        }
    }

    fn describe(&self, channel: &str, action: &str) -> ChatResult {
        self.send(format!("PRIVMSG {channel} :\u{1}ACTION {action}\u{1}"))
    }

    fn ping(&self, user: &str) -> ChatResult {
        self.send(format!("PRIVMSG {user} :\u{1}PING\u{1}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (IrcBackend, mpsc::UnboundedReceiver<String>) {
        IrcBackend::new("petrel")
    }

    #[test]
    fn join_with_and_without_key() {
        let (irc, mut rx) = backend();
        irc.join("#eng", None).expect("send");
        irc.join("#ops", Some("sekrit")).expect("send");
        assert_eq!(rx.try_recv().expect("line"), "JOIN #eng");
        assert_eq!(rx.try_recv().expect("line"), "JOIN #ops sekrit");
    }

    #[test]
    fn message_rendering() {
        let (irc, mut rx) = backend();
        irc.say("#eng", "hello").expect("send");
        irc.notice("alice", "psst").expect("send");
        irc.describe("#eng", "waves").expect("send");
        assert_eq!(rx.try_recv().expect("line"), "PRIVMSG #eng :hello");
        assert_eq!(rx.try_recv().expect("line"), "NOTICE alice :psst");
        assert_eq!(rx.try_recv().expect("line"), "PRIVMSG #eng :\u{1}ACTION waves\u{1}");
    }

    #[test]
    fn mode_appends_value_arguments_in_order() {
        let (irc, mut rx) = backend();
        irc.mode(
            "#eng",
            true,
            "ol",
            ModeArgs {
                limit: Some(20),
                user: Some("alice"),
                mask: None,
            },
        )
        .expect("send");
        assert_eq!(rx.try_recv().expect("line"), "MODE #eng +ol 20 alice");
    }

    #[test]
    fn set_nick_updates_own_nick() {
        let (irc, mut rx) = backend();
        irc.set_nick("stormy").expect("send");
        assert_eq!(rx.try_recv().expect("line"), "NICK stormy");
        assert_eq!(irc.nick(), "stormy");
    }

    #[test]
    fn closed_connection_is_a_transport_error() {
        let (irc, rx) = backend();
        drop(rx);
        let err = irc.say("#eng", "hello").expect_err("must fail");
        assert!(matches!(err, ChatError::Transport(_)));
    }
}
