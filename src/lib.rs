// Re-export modules for the binary and integration tests
pub mod config;
pub mod models;
pub mod realtime; // Presence, typing and delivery coordination
pub mod service;
pub mod store;
pub mod transport;
pub mod utils;

// Re-export main types for convenience
pub use models::*;
pub use realtime::{Audience, Notifier, RealtimeHub};
pub use service::{ChatError, ChatService, OutgoingMessage};
