//! Privilege guard — the grant table and the synchronous check the
//! dispatcher composes around privileged command handlers.
//!
//! Checks never suspend and are total: every command invocation either
//! passes or is denied before its handler runs.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::BotError;

#[derive(Default)]
struct GrantSet {
    global: HashSet<String>,
    by_channel: HashMap<String, HashSet<String>>,
}

/// Grants of privilege names to caller identities, globally or per channel.
/// A global grant satisfies any channel-scoped check.
#[derive(Default)]
pub struct Privileges {
    grants: Mutex<HashMap<String, GrantSet>>,
}

impl Privileges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, identity: &str, privilege: &str) {
        self.grants
            .lock()
            .entry(identity.to_string())
            .or_default()
            .global
            .insert(privilege.to_string());
    }

    pub fn grant_in_channel(&self, identity: &str, channel: &str, privilege: &str) {
        self.grants
            .lock()
            .entry(identity.to_string())
            .or_default()
            .by_channel
            .entry(channel.to_string())
            .or_default()
            .insert(privilege.to_string());
    }

    /// Remove a global grant; channel-scoped grants are untouched.
    pub fn revoke(&self, identity: &str, privilege: &str) {
        if let Some(set) = self.grants.lock().get_mut(identity) {
            set.global.remove(privilege);
        }
    }

    pub fn check(&self, identity: &str, channel: &str, privilege: &str) -> bool {
        let grants = self.grants.lock();
        grants.get(identity).is_some_and(|set| {
            set.global.contains(privilege)
                || set
                    .by_channel
                    .get(channel)
                    .is_some_and(|privs| privs.contains(privilege))
        })
    }

    pub fn require(&self, identity: &str, channel: &str, privilege: &str) -> Result<(), BotError> {
        if self.check(identity, channel, privilege) {
            Ok(())
        } else {
            Err(BotError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_grant_satisfies_any_channel() {
        let privs = Privileges::new();
        privs.grant("alice", "admin");
        assert!(privs.check("alice", "#eng", "admin"));
        assert!(privs.check("alice", "#ops", "admin"));
        assert!(!privs.check("alice", "#eng", "oper"));
    }

    #[test]
    fn channel_grant_is_scoped() {
        let privs = Privileges::new();
        privs.grant_in_channel("bob", "#eng", "admin");
        assert!(privs.check("bob", "#eng", "admin"));
        assert!(!privs.check("bob", "#ops", "admin"));
    }

    #[test]
    fn unknown_identity_is_denied() {
        let privs = Privileges::new();
        assert!(!privs.check("mallory", "#eng", "admin"));
        assert!(matches!(
            privs.require("mallory", "#eng", "admin"),
            Err(BotError::PermissionDenied)
        ));
    }

    #[test]
    fn revoke_clears_global_only() {
        let privs = Privileges::new();
        privs.grant("carol", "admin");
        privs.grant_in_channel("carol", "#eng", "admin");
        privs.revoke("carol", "admin");
        assert!(!privs.check("carol", "#ops", "admin"));
        assert!(privs.check("carol", "#eng", "admin"));
    }
}
