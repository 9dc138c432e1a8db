//! Outbound notifications: per-user messages and realtime broadcasts.
//!
//! Both sinks are fire-and-forget. A failed delivery is logged and dropped;
//! it never undoes the business operation that triggered it.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tradelane_core::{AggregateId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderApproved,
    OrderRejected,
    OrderStatusChanged,
    PayoutCreated,
    PayoutPaid,
    WithdrawalSettled,
}

/// What a notification points at, e.g. `("order", id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: String,
    pub id: AggregateId,
}

impl EntityRef {
    pub fn new(entity: impl Into<String>, id: AggregateId) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub entity_ref: Option<EntityRef>,
}

/// A system-wide event for realtime subscribers (`order.placed`, `user.registered`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub topic: String,
    pub payload: JsonValue,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes realtime events after the triggering write has committed.
pub trait RealtimePublisher: Send + Sync {
    fn publish(&self, event: RealtimeEvent) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        (**self).send(notification)
    }
}

impl<P> RealtimePublisher for Arc<P>
where
    P: RealtimePublisher + ?Sized,
{
    fn publish(&self, event: RealtimeEvent) -> Result<(), NotifyError> {
        (**self).publish(event)
    }
}

/// Deliver and log on failure.
pub fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let recipient = notification.recipient;
    let kind = notification.kind;
    if let Err(e) = notifier.send(notification) {
        tracing::warn!(%recipient, ?kind, error = %e, "notification dropped");
    }
}

pub fn publish_best_effort(publisher: &dyn RealtimePublisher, event: RealtimeEvent) {
    let topic = event.topic.clone();
    if let Err(e) = publisher.publish(event) {
        tracing::warn!(topic, error = %e, "realtime event dropped");
    }
}

/// Writes notifications to the log. Default sink when nothing else is wired.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, n: Notification) -> Result<(), NotifyError> {
        tracing::info!(recipient = %n.recipient, kind = ?n.kind, title = %n.title, "notification");
        Ok(())
    }
}

impl RealtimePublisher for TracingNotifier {
    fn publish(&self, event: RealtimeEvent) -> Result<(), NotifyError> {
        tracing::info!(topic = %event.topic, "realtime event");
        Ok(())
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    published: Mutex<Vec<RealtimeEvent>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, recipient: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }

    pub fn published(&self) -> Vec<RealtimeEvent> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Notifier for InMemoryNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

impl RealtimePublisher for InMemoryNotifier {
    fn publish(&self, event: RealtimeEvent) -> Result<(), NotifyError> {
        self.published
            .lock()
            .map_err(|_| NotifyError::Unavailable("lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
