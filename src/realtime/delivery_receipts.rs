// Message delivery lifecycle: sent -> delivered -> read
// Every status change is written to the store first; peers are notified only
// once the write has succeeded.

use log::{debug, info, warn};
use std::sync::Arc;

use super::RealtimeHub;
use crate::models::{DeliveryStatus, Identity, Message, ServerEvent};
use crate::store::{MessageStore, StoreError};

#[derive(Clone)]
pub struct DeliveryTracker {
    hub: RealtimeHub,
    store: Arc<dyn MessageStore>,
}

impl DeliveryTracker {
    pub fn new(hub: RealtimeHub, store: Arc<dyn MessageStore>) -> Self {
        Self { hub, store }
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    /// Persist a new message and, if the receiver is reachable right now, move it
    /// to delivered and push it to the receiver.
    ///
    /// Returns the stored record with its final status. A store failure aborts the
    /// whole operation before anything is pushed to the receiver; if the delivered
    /// write fails the message stays stored as sent.
    pub async fn submit(&self, mut message: Message) -> Result<Message, StoreError> {
        message.status = DeliveryStatus::Sent;
        let stored = self.store.insert(message).await?;
        info!("Stored message {} from {} to {}", stored.id, stored.sender, stored.receiver);

        if !self.hub.is_reachable(&stored.receiver) {
            debug!("{} is offline, message {} stays sent", stored.receiver, stored.id);
            return Ok(stored);
        }

        let delivered = match self.mark_delivered(&stored).await {
            Ok(delivered) => delivered,
            // The receiver read it before the delivered write landed
            Err(StoreError::StatusRegression { from, .. }) => {
                debug!("Message {} is already {}, keeping the stored status", stored.id, from);
                self.store
                    .find(&stored.id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(stored.id.clone()))?
            }
            Err(e) => return Err(e),
        };
        let receiver = delivered.receiver.clone();
        if !self.hub.send_to_identity(&receiver, ServerEvent::NewMessage(delivered.clone())) {
            // Receiver left between the reachability check and the push
            debug!("{} went offline before message {} was pushed", receiver, delivered.id);
        }
        Ok(delivered)
    }

    async fn mark_delivered(&self, message: &Message) -> Result<Message, StoreError> {
        self.advance(message, DeliveryStatus::Delivered).await
    }

    /// Write `next` for `message`, refusing to move it backwards.
    async fn advance(&self, message: &Message, next: DeliveryStatus) -> Result<Message, StoreError> {
        if !message.status.can_advance_to(next) {
            warn!(
                "Refusing status regression for {}: {} -> {}",
                message.id, message.status, next
            );
            return Err(StoreError::StatusRegression {
                id: message.id.clone(),
                from: message.status,
                to: next,
            });
        }
        if message.status == next {
            return Ok(message.clone());
        }
        let updated = self.store.update_status(&message.id, next).await?;
        info!("Message {} status {} -> {}", updated.id, message.status, updated.status);
        Ok(updated)
    }

    /// Mark every unread message from `peer` to `viewer` as read. Idempotent:
    /// messages already read are untouched. Returns the messages that changed.
    pub async fn mark_read_range(&self, viewer: &Identity, peer: &Identity) -> Result<Vec<Message>, StoreError> {
        let changed = self.store.mark_read(viewer, peer).await?;
        if !changed.is_empty() {
            info!("Marked {} message(s) from {} to {} as read", changed.len(), peer, viewer);
        }
        Ok(changed)
    }

    /// Tell each sender that its message was read. Call only with
    /// messages whose read status is already stored.
    pub fn send_read_receipts(&self, messages: &[Message]) -> usize {
        let mut sent = 0;
        for message in messages {
            if self.hub.relay_status_update(&message.id, message.status, &message.sender) {
                sent += 1;
            }
        }
        if sent > 0 {
            debug!("Sent {} read receipt(s)", sent);
        }
        sent
    }
}
