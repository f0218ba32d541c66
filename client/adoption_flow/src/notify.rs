//! Notification interface between the flow and the toast/banner UI.
//!
//! The flow calls [`NotificationSink::notify`] immediately on the
//! Success/Error transition. Exact strings are presentation; kind and
//! timing are the contract. Validation failures never reach the sink —
//! they only keep the confirm control disabled.

use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that forwards notifications to the log. Default for headless runs.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Success => info!("Toast: {}", notification.message),
            NotificationKind::Error => warn!("Toast: {}", notification.message),
        }
    }
}

/// Sink that records every notification, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().expect("sink poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .expect("sink poisoned")
            .push(notification);
    }
}
