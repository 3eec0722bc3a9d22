// In-memory document store for messages and user profiles

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as TokioMutex;

use super::{MessageStore, StoreError, UserDirectory};
use crate::models::{ConversationKey, DeliveryStatus, Identity, Message, MessageId, UserProfile};

#[derive(Default)]
pub struct MemoryStore {
    messages: TokioMutex<HashMap<MessageId, Message>>,
    users: TokioMutex<Vec<UserProfile>>,
    // When set every write fails; used to exercise failure paths
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, profile: UserProfile) {
        let mut users = self.users.lock().await;
        users.retain(|existing| existing.identity != profile.identity);
        users.push(profile);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            warn!("Rejecting write: store is in failure mode");
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        self.check_writable()?;
        let mut messages = self.messages.lock().await;
        debug!("Storing message {} from {} to {}", message.id, message.sender, message.receiver);
        messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn find(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.lock().await.get(id).cloned())
    }

    async fn update_status(&self, id: &MessageId, status: DeliveryStatus) -> Result<Message, StoreError> {
        self.check_writable()?;
        let mut messages = self.messages.lock().await;
        let message = messages
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !message.status.can_advance_to(status) {
            return Err(StoreError::StatusRegression {
                id: id.clone(),
                from: message.status,
                to: status,
            });
        }
        message.status = status;
        Ok(message.clone())
    }

    async fn conversation(&self, key: &ConversationKey) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.lock().await;
        let mut found: Vec<Message> = messages
            .values()
            .filter(|m| &m.conversation() == key)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(found)
    }

    async fn mark_read(&self, receiver: &Identity, sender: &Identity) -> Result<Vec<Message>, StoreError> {
        self.check_writable()?;
        let mut messages = self.messages.lock().await;
        let mut changed = Vec::new();
        for message in messages.values_mut() {
            if message.is_unread_between(receiver, sender) {
                message.status = DeliveryStatus::Read;
                changed.push(message.clone());
            }
        }
        changed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(changed)
    }

    async fn count_unread(&self, receiver: &Identity, sender: &Identity) -> Result<usize, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages
            .values()
            .filter(|m| m.is_unread_between(receiver, sender))
            .count())
    }

    async fn delete_conversation(&self, key: &ConversationKey) -> Result<usize, StoreError> {
        self.check_writable()?;
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|_, m| &m.conversation() != key);
        Ok(before - messages.len())
    }

    async fn delete_message(&self, key: &ConversationKey, id: &MessageId) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut messages = self.messages.lock().await;
        let belongs = messages.get(id).map_or(false, |m| &m.conversation() == key);
        if belongs {
            messages.remove(id);
        }
        Ok(belongs)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self.users.lock().await.clone())
    }
}
