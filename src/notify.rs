use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{AppError, FailedItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    /// Items the notification is about; every failed item of a batch.
    pub items: Vec<FailedItem>,
    pub created_at: DateTime<Utc>,
}

/// Dismissible user-facing notifications. Failures are reported here instead
/// of being raised to the presentation layer.
pub struct NotificationCenter {
    active: Mutex<Vec<Notification>>,
    events: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            active: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    pub fn push(
        &self,
        level: NotificationLevel,
        message: impl Into<String>,
        items: Vec<FailedItem>,
    ) -> String {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            items,
            created_at: Utc::now(),
        };
        let id = notification.id.clone();

        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        let _ = self.events.send(notification);
        id
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.push(NotificationLevel::Success, message, Vec::new())
    }

    /// Notification for a failed operation, naming any failed items.
    pub fn error(&self, context: &str, error: &AppError) -> String {
        log::error!("{}: {}", context, error);
        self.push(
            NotificationLevel::Error,
            format!("{}: {}", context, error),
            error.failed_items().to_vec(),
        )
    }

    pub fn dismiss(&self, id: &str) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let before = active.len();
        active.retain(|n| n.id != id);
        active.len() != before
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
