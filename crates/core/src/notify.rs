//! Fire-and-forget user notifications.
//!
//! Triage, migration and the refresh feed report outcomes through a [`Notifier`]. Delivery
//! is best effort: a notifier returns nothing and must not fail the caller.

use crate::constants::NOTIFICATION_DISPLAY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);
}

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => tracing::warn!(target: "portal::notify", "{message}"),
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(target: "portal::notify", kind = ?kind, "{message}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Holds notifications in memory for their display window.
#[derive(Clone, Debug, Default)]
pub struct MemoryNotifier {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications still on screen at `now`. Expired ones are discarded.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut entries = self.lock();
        entries.retain(|n| n.expires_at > now);
        entries.clone()
    }

    /// Everything recorded so far, expired or not, leaving the list empty.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        let issued_at = Utc::now();
        let display = chrono::Duration::from_std(NOTIFICATION_DISPLAY)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));
        self.lock().push(Notification {
            message: message.to_owned(),
            kind,
            issued_at,
            expires_at: issued_at + display,
        });
    }
}

/// Sends each notification to every wrapped notifier.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        for target in &self.targets {
            target.notify(message, kind);
        }
    }
}
