use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use anyhow::Context;

use tradelane_auth::{InMemoryUserDirectory, LegacyUserRecord};
use tradelane_core::UserId;
use tradelane_infra::{
    command_dispatcher::DispatchError,
    config::SettlementConfig,
    event_store::InMemoryEventStore,
    notify::{Notification, Notifier, NotifyError, RealtimeEvent, RealtimePublisher},
    order_number::InMemoryOrderNumberIndex,
    settlement::{Collaborators, SettlementService, SharedStore},
};

use crate::context::PrincipalContext;

const REALTIME_CAPACITY: usize = 1024;

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone)]
pub struct RealtimeMessage {
    /// `None` is a system event, delivered to admin streams only.
    pub recipient: Option<UserId>,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl RealtimeMessage {
    fn is_for(&self, principal: &PrincipalContext) -> bool {
        match self.recipient {
            Some(user) => user == principal.user_id(),
            None => principal.role().is_admin(),
        }
    }
}

/// Notification and realtime sink backed by the SSE broadcast channel.
///
/// A send with no connected subscriber is not a failure: the message is
/// logged and dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<RealtimeMessage>) -> Self {
        Self { tx }
    }

    fn deliver(&self, message: RealtimeMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("no realtime subscribers connected");
        }
    }
}

impl Notifier for BroadcastNotifier {
    fn send(&self, n: Notification) -> Result<(), NotifyError> {
        tracing::info!(recipient = %n.recipient, kind = ?n.kind, title = %n.title, "notification");
        let payload = serde_json::to_value(&n).map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        self.deliver(RealtimeMessage {
            recipient: Some(n.recipient),
            topic: "notification".to_string(),
            payload,
        });
        Ok(())
    }
}

impl RealtimePublisher for BroadcastNotifier {
    fn publish(&self, event: RealtimeEvent) -> Result<(), NotifyError> {
        tracing::info!(topic = %event.topic, "realtime event");
        self.deliver(RealtimeMessage {
            recipient: None,
            topic: event.topic,
            payload: event.payload,
        });
        Ok(())
    }
}

/// Application services shared by every handler.
pub struct AppServices {
    settlement: SettlementService,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    /// Wire the settlement core over `store`, replaying it into the read models.
    pub fn new(store: SharedStore, config: SettlementConfig) -> Result<Self, DispatchError> {
        Self::with_directory(store, Arc::new(InMemoryUserDirectory::new()), config)
    }

    pub fn with_directory(
        store: SharedStore,
        directory: Arc<InMemoryUserDirectory>,
        config: SettlementConfig,
    ) -> Result<Self, DispatchError> {
        let (realtime_tx, _) = broadcast::channel(REALTIME_CAPACITY);
        let sink = Arc::new(BroadcastNotifier::new(realtime_tx.clone()));

        let collaborators = Collaborators {
            directory,
            notifier: sink.clone(),
            realtime: sink,
            order_numbers: Arc::new(InMemoryOrderNumberIndex::new()),
        };

        Ok(Self {
            settlement: SettlementService::new(store, collaborators, config)?,
            realtime_tx,
        })
    }

    pub fn in_memory(config: SettlementConfig) -> Result<Self, DispatchError> {
        Self::new(Arc::new(InMemoryEventStore::new()), config)
    }

    pub fn settlement(&self) -> &SettlementService {
        &self.settlement
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

/// Build services from the environment.
///
/// `USE_PERSISTENT_STORES=true` selects the Postgres event store at
/// `DATABASE_URL` (requires the `postgres` feature). `LEGACY_USERS_FILE`
/// names a JSON export of legacy user documents to seed the directory with.
pub async fn build_services(config: SettlementConfig) -> anyhow::Result<AppServices> {
    let directory = Arc::new(InMemoryUserDirectory::new());
    if let Ok(path) = std::env::var("LEGACY_USERS_FILE") {
        seed_directory(&directory, Path::new(&path))?;
    }

    let persistent = std::env::var("USE_PERSISTENT_STORES")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if persistent {
        return persistent_services(directory, config).await;
    }

    tracing::info!("using in-memory event store");
    let store = Arc::new(InMemoryEventStore::new());
    Ok(AppServices::with_directory(store, directory, config)?)
}

/// Import a legacy user export into `directory`.
pub fn seed_directory(directory: &InMemoryUserDirectory, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<LegacyUserRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a legacy user export", path.display()))?;
    Ok(directory.import_legacy(records, chrono::Utc::now())?)
}

#[cfg(feature = "postgres")]
async fn persistent_services(
    directory: Arc<InMemoryUserDirectory>,
    config: SettlementConfig,
) -> anyhow::Result<AppServices> {
    use tradelane_infra::event_store::PostgresEventStore;

    let url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set with USE_PERSISTENT_STORES")?;
    let store = PostgresEventStore::connect(&url).await?;
    store.migrate().await?;
    tracing::info!("using postgres event store");

    Ok(AppServices::with_directory(Arc::new(store), directory, config)?)
}

#[cfg(not(feature = "postgres"))]
async fn persistent_services(
    _directory: Arc<InMemoryUserDirectory>,
    _config: SettlementConfig,
) -> anyhow::Result<AppServices> {
    anyhow::bail!("USE_PERSISTENT_STORES requires building with the `postgres` feature")
}

/// SSE stream of the messages addressed to `principal`.
pub fn user_sse_stream(
    services: Arc<AppServices>,
    principal: PrincipalContext,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.is_for(&principal) => {
            let data = json!({ "topic": m.topic, "payload": m.payload }).to_string();
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "sse subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradelane_core::Role;
    use tradelane_infra::notify::NotificationKind;

    fn note(recipient: UserId) -> Notification {
        Notification {
            recipient,
            title: "Order approved".to_string(),
            message: "ORD-1 was approved".to_string(),
            kind: NotificationKind::OrderApproved,
            entity_ref: None,
        }
    }

    #[test]
    fn notifications_reach_only_their_recipient() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = BroadcastNotifier::new(tx);
        let seller = PrincipalContext::new(UserId::new(), Role::Seller);
        let other = PrincipalContext::new(UserId::new(), Role::Seller);

        sink.send(note(seller.user_id())).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "notification");
        assert!(msg.is_for(&seller));
        assert!(!msg.is_for(&other));
    }

    #[test]
    fn system_events_go_to_admins() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = BroadcastNotifier::new(tx);
        sink.publish(RealtimeEvent {
            topic: "order.placed".to_string(),
            payload: json!({}),
        })
        .unwrap();

        let msg = rx.try_recv().unwrap();
        assert!(msg.is_for(&PrincipalContext::new(UserId::new(), Role::Admin)));
        assert!(!msg.is_for(&PrincipalContext::new(UserId::new(), Role::Supplier)));
    }

    #[test]
    fn legacy_export_seeds_the_directory() {
        use tradelane_auth::UserDirectory;

        let deleted = UserId::new();
        let path = std::env::temp_dir().join(format!("tradelane-users-{}.json", UserId::new()));
        let export = json!([
            { "id": deleted, "name": "Old", "email": "old@example.com", "role": "supplier", "isDeleted": true }
        ]);
        std::fs::write(&path, export.to_string()).unwrap();

        let directory = InMemoryUserDirectory::new();
        let imported = seed_directory(&directory, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(imported, 1);
        assert!(!directory.find_by_id(deleted).unwrap().unwrap().is_active());
        assert!(seed_directory(&directory, &path).is_err());
    }

    #[test]
    fn sending_without_subscribers_is_not_an_error() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        let sink = BroadcastNotifier::new(tx);
        assert!(sink.send(note(UserId::new())).is_ok());
    }
}
