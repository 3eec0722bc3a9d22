// Typing notifications and client-forwarded status updates
// Both are ephemeral: forwarded to the target's live session or dropped.

use log::debug;

use crate::models::{DeliveryStatus, Identity, MessageId, ServerEvent};

/// Ephemeral (from, to, is_typing) signal. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub from: Identity,
    pub to: Identity,
    pub is_typing: bool,
}

impl super::RealtimeHub {
    /// Forward a typing start/stop to `to`. Returns false when `to` has no live
    /// session and the signal was dropped.
    pub fn relay_typing(&self, from: &Identity, to: &Identity, is_typing: bool) -> bool {
        let forwarded = self.send_to_identity(
            to,
            ServerEvent::TypingStatus {
                from: from.clone(),
                is_typing,
            },
        );
        if forwarded {
            debug!("Relayed typing={} from {} to {}", is_typing, from, to);
        }
        forwarded
    }

    pub fn relay_typing_signal(&self, signal: &TypingSignal) -> bool {
        self.relay_typing(&signal.from, &signal.to, signal.is_typing)
    }

    /// Forward a status update a client reported for one of its peer's messages.
    /// Pure relay: nothing is written to the store.
    pub fn relay_status_update(&self, message_id: &MessageId, status: DeliveryStatus, to: &Identity) -> bool {
        self.send_to_identity(
            to,
            ServerEvent::MessageStatusUpdate {
                message_id: message_id.clone(),
                status,
            },
        )
    }
}
