use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key for a registered user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Send target for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub uuid::Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery lifecycle of a message. Ordered: a message only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent = 0,      // Stored, receiver not reached yet
    Delivered = 1, // Pushed to the receiver's live session
    Read = 2,      // Receiver opened the conversation
}

impl DeliveryStatus {
    /// Whether a write of `next` over `self` keeps the status monotonic.
    /// Writing the same status again is allowed (and is a no-op for stores).
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        next >= self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        };
        f.write_str(name)
    }
}

/// Text and/or an image reference. At least one is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        let no_text = self.text.as_deref().map_or(true, |t| t.trim().is_empty());
        no_text && self.image_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: Identity,
    pub receiver: Identity,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    /// A fresh, not yet persisted message in the `sent` state.
    pub fn new(sender: Identity, receiver: Identity, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receiver,
            content,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(&self.sender, &self.receiver)
    }

    /// True for messages addressed from `sender` to `receiver` that are not read yet.
    pub fn is_unread_between(&self, receiver: &Identity, sender: &Identity) -> bool {
        &self.receiver == receiver && &self.sender == sender && self.status != DeliveryStatus::Read
    }
}

/// The unordered pair of participants, stored sorted so {a, b} == {b, a}.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(Identity, Identity);

impl ConversationKey {
    pub fn new(a: &Identity, b: &Identity) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }

    pub fn participants(&self) -> (&Identity, &Identity) {
        (&self.0, &self.1)
    }
}

/// Derived presence of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    Online,
    RecentlyOffline,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub identity: Identity,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// A peer as shown in a user's contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub unread_count: usize,
    pub presence: PresenceStatus,
}

/// Events pushed from the core to connected sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    GetOnlineUsers(Vec<Identity>),
    UserOnlineStatus {
        identity: Identity,
        #[serde(rename = "isOnline")]
        is_online: bool,
    },
    UserLastSeen {
        identity: Identity,
        /// Milliseconds since the epoch, `None` once the user is back online.
        timestamp: Option<i64>,
    },
    TypingStatus {
        from: Identity,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    NewMessage(Message),
    MessageStatusUpdate {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        status: DeliveryStatus,
    },
    // Replies addressed to the requesting session only
    History {
        peer: Identity,
        messages: Vec<Message>,
    },
    MessageSent(Message),
    Peers(Vec<PeerSummary>),
    ChatCleared {
        peer: Identity,
        removed: usize,
    },
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    Error {
        message: String,
    },
}
