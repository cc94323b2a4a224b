//! Backend alerts and local failures rendered as transient toasts.

use std::sync::Arc;
use std::time::Duration;

use parley_types::{Notification, NotificationKind};
use tracing::{info, warn};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A presentation signal that dismisses itself after `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub duration: Duration,
}

/// Where toasts are shown. Implementations can draw them, print them, or
/// discard them.
pub trait NotificationSink: Send + Sync {
    fn show(&self, toast: &Toast);
}

/// Sink that writes toasts to the `tracing` log.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn show(&self, toast: &Toast) {
        let description = toast.description.as_deref().unwrap_or("");
        match toast.severity {
            Severity::Info => info!(title = %toast.title, "{}", description),
            Severity::Error => warn!(title = %toast.title, "{}", description),
        }
    }
}

/// Sink that drops every toast.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn show(&self, _toast: &Toast) {}
}

/// Stateless fan-out from notifications to the sink: no queue, no dedup.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    duration: Duration,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, duration: Duration) -> Self {
        Self { sink, duration }
    }

    /// Show a backend notification.
    pub fn on(&self, notification: &Notification) -> Toast {
        let title = match notification.kind {
            NotificationKind::UserJoined => "New User",
            NotificationKind::Other => "Notification",
        };
        self.show(Toast {
            title: title.to_owned(),
            description: Some(notification.message.clone()),
            severity: Severity::Info,
            duration: self.duration,
        })
    }

    /// Show a local failure.
    pub fn error(&self, error: &SyncError) -> Toast {
        let title = match error {
            SyncError::SendFailure { .. } => "Error sending message",
            SyncError::TransientFetch { .. } => "Error loading messages",
            SyncError::JoinFailure { .. } => "Error joining group",
            SyncError::LeaveFailure { .. } => "Error leaving group",
            SyncError::NoActiveRoom => "Select a group to start chatting",
        };
        self.show(Toast {
            title: title.to_owned(),
            description: Some(error.to_string()),
            severity: Severity::Error,
            duration: self.duration,
        })
    }

    fn show(&self, toast: Toast) -> Toast {
        self.sink.show(&toast);
        toast
    }
}
