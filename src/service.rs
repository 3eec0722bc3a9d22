//! Request-level chat operations: the contract the HTTP layer (or the line
//! transport) calls into. Composes the delivery tracker, the unread aggregator,
//! the message store and the asset host.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ConversationKey, Identity, Message, MessageContent, MessageId, PeerSummary};
use crate::realtime::{DeliveryTracker, RealtimeHub, UnreadAggregator};
use crate::store::{AssetError, AssetHost, MessageStore, StoreError, UserDirectory};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message has neither text nor image")]
    EmptyMessage,

    #[error("Image payload is not valid base64: {0}")]
    InvalidImage(#[from] base64::DecodeError),

    #[error("Image upload failed: {0}")]
    Asset(#[from] AssetError),

    #[error("Message {0} not found in this conversation")]
    MessageNotFound(MessageId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of a send-message request. `image` is base64, optionally as a data URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    delivery: DeliveryTracker,
    unread: UnreadAggregator,
    store: Arc<dyn MessageStore>,
    assets: Arc<dyn AssetHost>,
}

impl ChatService {
    pub fn new(
        hub: RealtimeHub,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
        assets: Arc<dyn AssetHost>,
    ) -> Self {
        Self {
            delivery: DeliveryTracker::new(hub.clone(), store.clone()),
            unread: UnreadAggregator::new(hub, store.clone(), directory),
            store,
            assets,
        }
    }

    pub fn hub(&self) -> &RealtimeHub {
        self.delivery.hub()
    }

    pub fn delivery(&self) -> &DeliveryTracker {
        &self.delivery
    }

    pub fn unread(&self) -> &UnreadAggregator {
        &self.unread
    }

    /// Store and route a new message. The returned record carries its final status.
    pub async fn send_message(
        &self,
        sender: &Identity,
        receiver: &Identity,
        outgoing: OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let image_url = match outgoing.image.as_deref() {
            Some(payload) if !payload.trim().is_empty() => Some(self.upload_image(payload).await?),
            _ => None,
        };
        let content = MessageContent {
            text: outgoing.text.filter(|t| !t.trim().is_empty()),
            image_url,
        };
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let message = Message::new(sender.clone(), receiver.clone(), content);
        self.delivery.submit(message).await.map_err(|e| {
            error!("Failed to send message from {} to {}: {}", sender, receiver, e);
            ChatError::from(e)
        })
    }

    async fn upload_image(&self, payload: &str) -> Result<String, ChatError> {
        // Accept "data:image/png;base64,...." as sent by browsers
        let encoded = match payload.split_once(";base64,") {
            Some((_, data)) => data,
            None => payload,
        };
        let bytes = BASE64.decode(encoded.trim())?;
        Ok(self.assets.upload(bytes).await?)
    }

    /// Conversation between `viewer` and `peer`, oldest first. Opening the
    /// conversation marks the peer's messages as read and tells the peer.
    ///
    /// Receipts are sent once the read write is stored, before the
    /// conversation is loaded.
    pub async fn fetch_history(&self, viewer: &Identity, peer: &Identity) -> Result<Vec<Message>, ChatError> {
        let newly_read = self.delivery.mark_read_range(viewer, peer).await?;
        self.delivery.send_read_receipts(&newly_read);
        let messages = self.store.conversation(&ConversationKey::new(viewer, peer)).await?;
        Ok(messages)
    }

    pub async fn list_peers(&self, viewer: &Identity) -> Result<Vec<PeerSummary>, ChatError> {
        Ok(self.unread.peer_summaries(viewer).await?)
    }

    pub async fn clear_chat(&self, viewer: &Identity, peer: &Identity) -> Result<usize, ChatError> {
        let removed = self
            .store
            .delete_conversation(&ConversationKey::new(viewer, peer))
            .await?;
        info!("{} cleared chat with {} ({} message(s) removed)", viewer, peer, removed);
        Ok(removed)
    }

    pub async fn delete_message(
        &self,
        viewer: &Identity,
        peer: &Identity,
        message_id: &MessageId,
    ) -> Result<(), ChatError> {
        let key = ConversationKey::new(viewer, peer);
        if self.store.delete_message(&key, message_id).await? {
            info!("{} deleted message {}", viewer, message_id);
            Ok(())
        } else {
            Err(ChatError::MessageNotFound(message_id.clone()))
        }
    }
}
