// Realtime coordinator for chatterbox-relay
// Entry point for presence, typing and delivery handling. Organized by concern:
// registry (who is reachable), presence (derived status), chat_states (typing),
// delivery_receipts (status lifecycle), unread (per-peer counts).

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod chat_states;
pub mod clock;
pub mod delivery_receipts;
pub mod presence;
pub mod registry;
pub mod unread;

pub use chat_states::TypingSignal;
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery_receipts::DeliveryTracker;
pub use presence::{PresenceTracker, RECENTLY_OFFLINE_WINDOW_SECS};
pub use registry::ConnectionRegistry;
pub use unread::UnreadAggregator;

use crate::models::{Identity, PresenceStatus, ServerEvent, SessionHandle};

/// Who an event goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live connection the transport knows about
    Everyone,
    Session(SessionHandle),
}

/// Fan-out seam between the core and the transport.
///
/// Delivery is fire-and-forget: implementations must not block and may drop
/// events for sessions that have already gone away.
pub trait Notifier: Send + Sync {
    fn notify(&self, audience: Audience, event: ServerEvent);
}

/// Bookkeeping guarded by a single lock. The registry and the last-seen map
/// change together so a connect/disconnect is one logical event.
#[derive(Debug, Default)]
pub struct RealtimeState {
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
}

/// Shared handle to the realtime state. Cheap to clone; every component that
/// needs reachability or presence receives one of these.
#[derive(Clone)]
pub struct RealtimeHub {
    state: Arc<Mutex<RealtimeState>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl RealtimeHub {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_clock(
            notifier,
            Arc::new(SystemClock),
            Duration::seconds(RECENTLY_OFFLINE_WINDOW_SECS),
        )
    }

    pub fn with_clock(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        let state = RealtimeState {
            registry: ConnectionRegistry::new(),
            presence: PresenceTracker::new(window),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            notifier,
            clock,
        }
    }

    // Recover from poisoning; every update leaves the maps consistent.
    fn state(&self) -> MutexGuard<'_, RealtimeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A session came up carrying a verified identity.
    pub fn connect(&self, identity: Identity, session: SessionHandle) {
        let online = {
            let mut state = self.state();
            state.registry.register(identity.clone(), session);
            state.presence.mark_online(&identity);
            state.registry.online_identities()
        };
        info!("{} connected on session {} ({} online)", identity, session, online.len());

        self.notifier.notify(
            Audience::Everyone,
            ServerEvent::UserLastSeen {
                identity: identity.clone(),
                timestamp: None,
            },
        );
        self.notifier.notify(
            Audience::Everyone,
            ServerEvent::UserOnlineStatus {
                identity,
                is_online: true,
            },
        );
        self.notifier.notify(Audience::Everyone, ServerEvent::GetOnlineUsers(online));
    }

    /// A session went away. Returns false when the session had already been
    /// superseded, in which case nothing changes and nothing is broadcast.
    pub fn disconnect(&self, identity: &Identity, session: SessionHandle) -> bool {
        let now = self.clock.now();
        let online = {
            let mut state = self.state();
            if !state.registry.unregister(identity, session) {
                return false;
            }
            state.presence.mark_offline(identity.clone(), now);
            state.registry.online_identities()
        };
        info!("{} disconnected from session {} ({} online)", identity, session, online.len());

        self.notifier.notify(
            Audience::Everyone,
            ServerEvent::UserLastSeen {
                identity: identity.clone(),
                timestamp: Some(now.timestamp_millis()),
            },
        );
        self.notifier.notify(
            Audience::Everyone,
            ServerEvent::UserOnlineStatus {
                identity: identity.clone(),
                is_online: false,
            },
        );
        self.notifier.notify(Audience::Everyone, ServerEvent::GetOnlineUsers(online));
        true
    }

    pub fn lookup(&self, identity: &Identity) -> Option<SessionHandle> {
        self.state().registry.lookup(identity)
    }

    pub fn is_reachable(&self, identity: &Identity) -> bool {
        self.lookup(identity).is_some()
    }

    pub fn online_identities(&self) -> Vec<Identity> {
        self.state().registry.online_identities()
    }

    pub fn is_recently_offline(&self, identity: &Identity) -> bool {
        let now = self.clock.now();
        self.state().presence.is_recently_offline(identity, now)
    }

    pub fn last_seen(&self, identity: &Identity) -> Option<DateTime<Utc>> {
        self.state().presence.last_seen(identity)
    }

    pub fn presence(&self, identity: &Identity) -> PresenceStatus {
        let now = self.clock.now();
        let state = self.state();
        let online = state.registry.lookup(identity).is_some();
        state.presence.status(identity, online, now)
    }

    /// Send an event to `identity` if it is reachable. Returns whether it was handed
    /// to the notifier; the lock is released before notifying.
    pub(crate) fn send_to_identity(&self, identity: &Identity, event: ServerEvent) -> bool {
        match self.lookup(identity) {
            Some(session) => {
                self.notifier.notify(Audience::Session(session), event);
                true
            }
            None => {
                debug!("{} is not reachable, dropping event", identity);
                false
            }
        }
    }

    pub fn notify_session(&self, session: SessionHandle, event: ServerEvent) {
        self.notifier.notify(Audience::Session(session), event);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Notifier that keeps every event for later inspection.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<(Audience, ServerEvent)>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<(Audience, ServerEvent)> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, audience: Audience, event: ServerEvent) {
            self.events.lock().unwrap().push((audience, event));
        }
    }
}
