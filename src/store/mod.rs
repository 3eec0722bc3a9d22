//! Persistence seams.
//!
//! The coordinator never owns durable data. Messages and user accounts live in
//! an external document store reached through [`MessageStore`] and
//! [`UserDirectory`]; images go to an [`AssetHost`]. In-memory implementations
//! are provided for tests and the demo server.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ConversationKey, DeliveryStatus, Identity, Message, MessageId, UserProfile};

pub mod assets;
pub mod memory;

pub use assets::{AssetError, AssetHost, MemoryAssetHost};
pub use memory::MemoryStore;

/// Errors surfaced by a store. All of them abort the current request.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the write
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Message {0} not found")]
    NotFound(MessageId),

    /// A status write would move a message backwards
    #[error("Refusing to move message {id} from {from} back to {to}")]
    StatusRegression {
        id: MessageId,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message as given and return the stored record.
    async fn insert(&self, message: Message) -> Result<Message, StoreError>;

    async fn find(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Write a new status. Implementations must refuse backward transitions
    /// with [`StoreError::StatusRegression`].
    async fn update_status(&self, id: &MessageId, status: DeliveryStatus) -> Result<Message, StoreError>;

    /// Every message of the conversation, oldest first.
    async fn conversation(&self, key: &ConversationKey) -> Result<Vec<Message>, StoreError>;

    /// Set every message from `sender` to `receiver` that is not read yet to read,
    /// as one write. Returns the messages that changed.
    async fn mark_read(&self, receiver: &Identity, sender: &Identity) -> Result<Vec<Message>, StoreError>;

    async fn count_unread(&self, receiver: &Identity, sender: &Identity) -> Result<usize, StoreError>;

    /// Remove every message of the conversation, returning how many were removed.
    async fn delete_conversation(&self, key: &ConversationKey) -> Result<usize, StoreError>;

    /// Remove one message if it belongs to the conversation.
    async fn delete_message(&self, key: &ConversationKey, id: &MessageId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError>;
}
