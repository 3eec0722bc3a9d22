// Presence tracking: Online / RecentlyOffline / Offline
// Status is derived at query time from the registry and a last-seen map; no timers.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;

use crate::models::{Identity, PresenceStatus};

/// Default length of the RecentlyOffline window.
pub const RECENTLY_OFFLINE_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug)]
pub struct PresenceTracker {
    last_seen: HashMap<Identity, DateTime<Utc>>,
    window: Duration,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(RECENTLY_OFFLINE_WINDOW_SECS))
    }
}

impl PresenceTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            window,
        }
    }

    /// The identity has a live session again; forget when it was last seen.
    pub fn mark_online(&mut self, identity: &Identity) {
        if self.last_seen.remove(identity).is_some() {
            debug!("Cleared last seen for {}", identity);
        }
    }

    /// The identity's last session went away at `at`.
    pub fn mark_offline(&mut self, identity: Identity, at: DateTime<Utc>) {
        debug!("Recording last seen for {} at {}", identity, at);
        self.last_seen.insert(identity, at);
    }

    pub fn last_seen(&self, identity: &Identity) -> Option<DateTime<Utc>> {
        self.last_seen.get(identity).copied()
    }

    pub fn is_recently_offline(&self, identity: &Identity, now: DateTime<Utc>) -> bool {
        match self.last_seen.get(identity) {
            Some(seen) => now.signed_duration_since(*seen) < self.window,
            None => false,
        }
    }

    /// Combine reachability (owned by the registry) with the last-seen record.
    pub fn status(&self, identity: &Identity, online: bool, now: DateTime<Utc>) -> PresenceStatus {
        if online {
            PresenceStatus::Online
        } else if self.is_recently_offline(identity, now) {
            PresenceStatus::RecentlyOffline
        } else {
            PresenceStatus::Offline
        }
    }
}
