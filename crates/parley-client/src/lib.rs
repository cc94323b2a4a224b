//! Parley client: room session synchronization over a realtime gateway.
//!
//! One authenticated channel per session, at most one active room, and the
//! room-scoped state derived from its events:
//! - message log seeded by a history snapshot, extended by live messages
//! - presence set driven by snapshot and join/leave increments
//! - typing indicators with per-user idle timers
//! - backend notifications surfaced as toasts

pub mod api;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod membership;
pub mod message_log;
pub mod notifications;
pub mod presence;
pub mod session;
pub mod transport;
pub mod typing;

#[cfg(test)]
mod testing;

pub use api::{ChatApi, HttpApi};
pub use channel::{LinkState, SessionChannel, Subscription};
pub use config::{ClientConfig, ConfigError};
pub use engine::{ChatSession, SessionUpdate};
pub use error::{ApiError, HttpErrorCategory, SyncError, classify_http_status};
pub use membership::{RoomMembershipController, Selection};
pub use message_log::MessageLog;
pub use notifications::{NotificationDispatcher, NotificationSink, NullSink, Severity, Toast, TracingSink};
pub use presence::PresenceTracker;
pub use session::{SessionContext, SessionError};
pub use transport::{
    Connector, ReconnectPolicy, Transport, TransportError, WebSocketConnector, WebSocketTransport,
};
pub use typing::{TypingExpiry, TypingIndicatorTracker};
