// Per-session outbound channels. Implements the core's Notifier on top of
// bounded tokio mpsc senders, one per attached connection.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::models::{ServerEvent, SessionHandle};
use crate::realtime::{Audience, Notifier};

pub struct SessionHub {
    sinks: Mutex<HashMap<SessionHandle, mpsc::Sender<ServerEvent>>>,
    capacity: usize,
}

impl SessionHub {
    /// `capacity` is the per-session queue length and must be non-zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sinks(&self) -> MutexGuard<'_, HashMap<SessionHandle, mpsc::Sender<ServerEvent>>> {
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start routing events for `session`; the transport drains the receiver.
    pub fn attach(&self, session: SessionHandle) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sinks().insert(session, tx);
        debug!("Attached session {}", session);
        rx
    }

    /// Stop routing events for `session`. Dropping the sender ends its receiver
    /// once queued events are drained.
    pub fn detach(&self, session: SessionHandle) {
        if self.sinks().remove(&session).is_some() {
            debug!("Detached session {}", session);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks().is_empty()
    }
}

impl Notifier for SessionHub {
    fn notify(&self, audience: Audience, event: ServerEvent) {
        // Snapshot the targets so no lock is held while sending
        let targets: Vec<(SessionHandle, mpsc::Sender<ServerEvent>)> = {
            let sinks = self.sinks();
            match audience {
                Audience::Everyone => sinks.iter().map(|(s, tx)| (*s, tx.clone())).collect(),
                Audience::Session(session) => sinks
                    .get(&session)
                    .map(|tx| vec![(session, tx.clone())])
                    .unwrap_or_default(),
            }
        };

        let mut closed = Vec::new();
        for (session, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Closed(_)) => closed.push(session),
                Err(TrySendError::Full(_)) => {
                    warn!("Dropping event for session {}: queue full", session);
                }
            }
        }

        if !closed.is_empty() {
            let mut sinks = self.sinks();
            for session in closed {
                debug!("Pruning closed session {}", session);
                sinks.remove(&session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn ping() -> ServerEvent {
        ServerEvent::GetOnlineUsers(vec![Identity::from("alice")])
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let hub = SessionHub::new(8);
        let mut a = hub.attach(SessionHandle::new());
        let mut b = hub.attach(SessionHandle::new());

        hub.notify(Audience::Everyone, ping());
        assert_eq!(a.recv().await, Some(ping()));
        assert_eq!(b.recv().await, Some(ping()));
    }

    #[tokio::test]
    async fn test_targeted_event_reaches_one_session() {
        let hub = SessionHub::new(8);
        let target = SessionHandle::new();
        let mut a = hub.attach(target);
        let mut b = hub.attach(SessionHandle::new());

        hub.notify(Audience::Session(target), ping());
        assert_eq!(a.recv().await, Some(ping()));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_closed_receivers_are_pruned() {
        let hub = SessionHub::new(8);
        let rx = hub.attach(SessionHandle::new());
        drop(rx);
        assert_eq!(hub.len(), 1);

        hub.notify(Audience::Everyone, ping());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_full_queue_drops_event() {
        let hub = SessionHub::new(1);
        let mut rx = hub.attach(SessionHandle::new());
        hub.notify(Audience::Everyone, ping());
        hub.notify(Audience::Everyone, ServerEvent::GetOnlineUsers(Vec::new()));

        assert_eq!(rx.try_recv().ok(), Some(ping()));
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_ends_receiver() {
        let hub = SessionHub::new(8);
        let session = SessionHandle::new();
        let mut rx = hub.attach(session);
        hub.notify(Audience::Session(session), ping());
        hub.detach(session);

        assert_eq!(rx.recv().await, Some(ping()));
        assert_eq!(rx.recv().await, None);
    }
}
