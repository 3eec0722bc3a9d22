// Common test utilities for integration tests
// Shared logger setup, a recording notifier and a wired-up service fixture.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use log::LevelFilter;

use chatterbox_relay::{
    models::{
        ConversationKey, DeliveryStatus, Identity, Message, MessageContent, MessageId, ServerEvent, SessionHandle,
        UserProfile,
    },
    realtime::{Audience, ManualClock, Notifier, RealtimeHub},
    service::ChatService,
    store::{MemoryAssetHost, MemoryStore, MessageStore, StoreError},
};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Notifier that records every event instead of writing to a socket
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Audience, ServerEvent)>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<(Audience, ServerEvent)> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Events addressed to one session, in order
    pub fn take_for(&self, session: SessionHandle) -> Vec<ServerEvent> {
        self.take()
            .into_iter()
            .filter(|(audience, _)| *audience == Audience::Session(session))
            .map(|(_, event)| event)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, audience: Audience, event: ServerEvent) {
        self.events.lock().unwrap().push((audience, event));
    }
}

pub struct Fixture {
    pub service: ChatService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn hub(&self) -> &RealtimeHub {
        self.service.hub()
    }
}

/// Service wired to in-memory collaborators and a manual clock with a 5 minute window
pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    build_fixture(store.clone(), store)
}

/// Like `fixture`, but message writes and reads go through a `FlakyStore`
pub fn flaky_fixture() -> (Fixture, Arc<FlakyStore>) {
    let flaky = Arc::new(FlakyStore::default());
    let fixture = build_fixture(flaky.inner.clone(), flaky.clone());
    (fixture, flaky)
}

fn build_fixture(store: Arc<MemoryStore>, messages: Arc<dyn MessageStore>) -> Fixture {
    setup_logging();
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::default());
    let hub = RealtimeHub::with_clock(notifier.clone(), clock.clone(), chrono::Duration::minutes(5));
    let service = ChatService::new(hub, messages, store.clone(), Arc::new(MemoryAssetHost::default()));
    Fixture {
        service,
        store,
        notifier,
        clock,
    }
}

/// Memory store whose conversation reads or status writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_conversation: AtomicBool,
    pub fail_update_status: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} failed", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        self.inner.insert(message).await
    }

    async fn find(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        self.inner.find(id).await
    }

    async fn update_status(&self, id: &MessageId, status: DeliveryStatus) -> Result<Message, StoreError> {
        Self::check(&self.fail_update_status, "status write")?;
        self.inner.update_status(id, status).await
    }

    async fn conversation(&self, key: &ConversationKey) -> Result<Vec<Message>, StoreError> {
        Self::check(&self.fail_conversation, "conversation read")?;
        self.inner.conversation(key).await
    }

    async fn mark_read(&self, receiver: &Identity, sender: &Identity) -> Result<Vec<Message>, StoreError> {
        self.inner.mark_read(receiver, sender).await
    }

    async fn count_unread(&self, receiver: &Identity, sender: &Identity) -> Result<usize, StoreError> {
        self.inner.count_unread(receiver, sender).await
    }

    async fn delete_conversation(&self, key: &ConversationKey) -> Result<usize, StoreError> {
        self.inner.delete_conversation(key).await
    }

    async fn delete_message(&self, key: &ConversationKey, id: &MessageId) -> Result<bool, StoreError> {
        self.inner.delete_message(key, id).await
    }
}

pub async fn add_users(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        store
            .add_user(UserProfile {
                identity: Identity::from(*id),
                display_name: id.to_string(),
                profile_pic: None,
            })
            .await;
    }
}

/// Insert `count` messages from `from` to `to` directly with the given status
pub async fn seed_messages(store: &MemoryStore, from: &str, to: &str, status: DeliveryStatus, count: usize) {
    for i in 0..count {
        let mut message = Message::new(
            Identity::from(from),
            Identity::from(to),
            MessageContent::text(format!("seeded {} {}", status, i)),
        );
        message.status = status;
        store.insert(message).await.unwrap();
    }
}
