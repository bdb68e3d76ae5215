//! Core → settings notifications.
//!
//! Fan-out uses a [`tokio::sync::broadcast`] channel so the host bridge and
//! tests can subscribe independently. Emitting with no subscribers is not an
//! error.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::Preferences;
use crate::engine::ReminderMode;

/// A notification for the settings collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Full preference snapshot, sent on load and after every change.
    Preferences { prefs: Box<Preferences> },
    /// One-line, user-visible camera failure.
    CameraError { message: String },
    /// The camera preview surface was closed.
    CameraPreviewClosed,
    /// Reminder tracking state changed.
    TrackingState { mode: ReminderMode, active: bool },
}

impl Notification {
    /// Host event name used when forwarding this notification.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Preferences { .. } => "prefs.snapshot",
            Self::CameraError { .. } => "camera.error",
            Self::CameraPreviewClosed => "preview.closed",
            Self::TrackingState { .. } => "tracking.state",
        }
    }
}

/// Cloneable broadcast sender for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier and its first receiver.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Notification>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn emit(&self, notification: Notification) {
        tracing::debug!(event = notification.event_name(), "notification");
        let _ = self.tx.send(notification);
    }

    pub fn preferences(&self, prefs: &Preferences) {
        self.emit(Notification::Preferences {
            prefs: Box::new(prefs.clone()),
        });
    }
}
