// Connection registry: identity -> current live session (last connection wins)

use log::debug;
use std::collections::HashMap;

use crate::models::{Identity, SessionHandle};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<Identity, SessionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` for `identity`. Returns the superseded session, if any.
    /// The old handle is not torn down here.
    pub fn register(&mut self, identity: Identity, session: SessionHandle) -> Option<SessionHandle> {
        let previous = self.sessions.insert(identity.clone(), session);
        if let Some(old) = previous {
            if old != session {
                debug!("Session {} for {} superseded by {}", old, identity, session);
            }
        }
        previous
    }

    /// Remove the mapping only when `session` is still the current one.
    /// Returns false for a stale session, which is left untouched.
    pub fn unregister(&mut self, identity: &Identity, session: SessionHandle) -> bool {
        match self.sessions.get(identity) {
            Some(current) if *current == session => {
                self.sessions.remove(identity);
                true
            }
            Some(current) => {
                debug!(
                    "Ignoring disconnect of stale session {} for {} (current is {})",
                    session, identity, current
                );
                false
            }
            None => {
                debug!("Ignoring disconnect of {} for unregistered identity {}", session, identity);
                false
            }
        }
    }

    pub fn lookup(&self, identity: &Identity) -> Option<SessionHandle> {
        self.sessions.get(identity).copied()
    }

    /// All reachable identities, sorted so broadcasts are stable.
    pub fn online_identities(&self) -> Vec<Identity> {
        let mut online: Vec<Identity> = self.sessions.keys().cloned().collect();
        online.sort();
        online
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_registration_wins() {
        let mut registry = ConnectionRegistry::new();
        let alice = Identity::from("alice");
        let first = SessionHandle::new();
        let second = SessionHandle::new();

        assert_eq!(registry.register(alice.clone(), first), None);
        assert_eq!(registry.register(alice.clone(), second), Some(first));
        assert_eq!(registry.lookup(&alice), Some(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_unregister_is_ignored() {
        let mut registry = ConnectionRegistry::new();
        let alice = Identity::from("alice");
        let first = SessionHandle::new();
        let second = SessionHandle::new();

        registry.register(alice.clone(), first);
        registry.register(alice.clone(), second);

        assert!(!registry.unregister(&alice, first));
        assert_eq!(registry.lookup(&alice), Some(second));

        assert!(registry.unregister(&alice, second));
        assert_eq!(registry.lookup(&alice), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_identity() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.unregister(&Identity::from("ghost"), SessionHandle::new()));
    }

    #[test]
    fn test_online_identities_sorted() {
        let mut registry = ConnectionRegistry::new();
        registry.register(Identity::from("carol"), SessionHandle::new());
        registry.register(Identity::from("alice"), SessionHandle::new());
        registry.register(Identity::from("bob"), SessionHandle::new());

        let online = registry.online_identities();
        assert_eq!(
            online,
            vec![Identity::from("alice"), Identity::from("bob"), Identity::from("carol")]
        );
    }
}
