//! Projections: read models built from committed events.
//!
//! All projections are rebuildable from the event log and idempotent under
//! at-least-once delivery. Per-stream cursors drop envelopes that were already
//! applied and hold back envelopes that arrive ahead of a gap, so two writers
//! publishing out of commit order still produce the same read model.

pub mod orders;
pub mod payouts;
pub mod products;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;

use tradelane_core::AggregateId;
use tradelane_events::{EventEnvelope, Subscription};

use crate::event_store::StoredEvent;

pub use orders::{OrderReadModel, OrdersProjection};
pub use payouts::{PayoutReadModel, PayoutsProjection};
pub use products::{ProductCatalogProjection, ProductReadModel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {reason}")]
    Deserialize {
        aggregate_type: &'static str,
        reason: String,
    },

    #[error("event does not belong to stream {0}")]
    StreamMismatch(AggregateId),

    #[error("invalid sequence number (last={last}, found={found})")]
    InvalidSequence { last: u64, found: u64 },
}

/// A read model fed from one aggregate type's envelopes.
pub trait Projection: Send + Sync {
    fn aggregate_type(&self) -> &'static str;

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Forget every record and cursor.
    fn reset(&self);
}

#[derive(Debug, Default)]
struct CursorState {
    last: u64,
    early: BTreeMap<u64, EventEnvelope<JsonValue>>,
}

/// Per-stream delivery cursors.
#[derive(Debug, Default)]
pub struct StreamCursors {
    streams: RwLock<HashMap<AggregateId, CursorState>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes that are now ready to apply, in sequence order.
    ///
    /// Duplicates yield nothing; an envelope past a gap is parked until the
    /// gap is filled. The cursor advances over everything returned.
    pub fn admit(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, ProjectionError> {
        let seq = envelope.sequence_number();
        let mut streams = match self.streams.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = streams.entry(envelope.aggregate_id()).or_default();

        if seq == 0 {
            return Err(ProjectionError::InvalidSequence {
                last: state.last,
                found: seq,
            });
        }
        if seq <= state.last {
            return Ok(vec![]);
        }
        if seq != state.last + 1 {
            state.early.insert(seq, envelope.clone());
            return Ok(vec![]);
        }

        let mut ready = vec![envelope.clone()];
        state.last = seq;
        while let Some(next) = state.early.remove(&(state.last + 1)) {
            state.last = next.sequence_number();
            ready.push(next);
        }
        Ok(ready)
    }

    pub fn last_applied(&self, aggregate_id: AggregateId) -> u64 {
        self.streams
            .read()
            .ok()
            .and_then(|s| s.get(&aggregate_id).map(|c| c.last))
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut streams) = self.streams.write() {
            streams.clear();
        }
    }
}

/// Decode an envelope payload into a typed event, checking it is addressed to
/// the envelope's stream.
pub(crate) fn decode<E>(
    aggregate_type: &'static str,
    envelope: &EventEnvelope<JsonValue>,
    aggregate_of: impl FnOnce(&E) -> AggregateId,
) -> Result<E, ProjectionError>
where
    E: serde::de::DeserializeOwned,
{
    let ev: E = serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        aggregate_type,
        reason: e.to_string(),
    })?;
    if aggregate_of(&ev) != envelope.aggregate_id() {
        return Err(ProjectionError::StreamMismatch(envelope.aggregate_id()));
    }
    Ok(ev)
}

/// Every read model the settlement service queries, plus the bus subscription
/// that feeds them.
///
/// `sync` drains whatever the bus has delivered so far. The service calls it
/// after each write and before each list query, which gives callers
/// read-your-writes on the lists without a background worker.
pub struct ReadModels {
    pub products: ProductCatalogProjection,
    pub orders: OrdersProjection,
    pub payouts: PayoutsProjection,
    feed: Mutex<Subscription<EventEnvelope<JsonValue>>>,
}

impl ReadModels {
    pub fn new(feed: Subscription<EventEnvelope<JsonValue>>) -> Self {
        Self {
            products: ProductCatalogProjection::new(),
            orders: OrdersProjection::new(),
            payouts: PayoutsProjection::new(),
            feed: Mutex::new(feed),
        }
    }

    fn projections(&self) -> [&dyn Projection; 3] {
        [&self.products, &self.orders, &self.payouts]
    }

    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        for p in self.projections() {
            if p.aggregate_type() == envelope.aggregate_type() {
                p.apply_envelope(envelope)?;
            }
        }
        Ok(())
    }

    /// Apply everything pending on the feed. Failures are logged and skipped:
    /// a broken read model must not block writes.
    pub fn sync(&self) {
        let feed = match self.feed.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        while let Ok(envelope) = feed.try_recv() {
            if let Err(e) = self.apply(&envelope) {
                tracing::error!(
                    aggregate_id = %envelope.aggregate_id(),
                    event_type = envelope.event_type(),
                    error = %e,
                    "projection failed to apply event"
                );
            }
        }
    }

    /// Drain the feed, then apply events the caller just committed. Envelopes
    /// the feed already delivered are dropped by the cursors; one the bus never
    /// delivered is applied here, so the lists still read the caller's write.
    pub fn absorb(&self, committed: &[StoredEvent]) {
        self.sync();
        for stored in committed {
            let envelope = stored.to_envelope();
            if let Err(e) = self.apply(&envelope) {
                tracing::error!(
                    aggregate_id = %envelope.aggregate_id(),
                    event_type = envelope.event_type(),
                    error = %e,
                    "projection failed to apply committed event"
                );
            }
        }
    }

    /// Reset every projection and replay the full log.
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<(), ProjectionError> {
        for p in self.projections() {
            p.reset();
        }
        for stored in events {
            self.apply(&stored.to_envelope())?;
        }
        tracing::info!(events = events.len(), "read models rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn env(aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), aggregate_id, "t", "t.happened", seq, json!({}))
    }

    #[test]
    fn duplicates_are_dropped() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        assert_eq!(cursors.admit(&env(id, 1)).unwrap().len(), 1);
        assert!(cursors.admit(&env(id, 1)).unwrap().is_empty());
        assert_eq!(cursors.last_applied(id), 1);
    }

    #[test]
    fn early_envelopes_wait_for_the_gap() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        assert!(cursors.admit(&env(id, 2)).unwrap().is_empty());
        assert!(cursors.admit(&env(id, 3)).unwrap().is_empty());
        assert_eq!(cursors.last_applied(id), 0);

        let ready: Vec<u64> = cursors
            .admit(&env(id, 1))
            .unwrap()
            .iter()
            .map(|e| e.sequence_number())
            .collect();
        assert_eq!(ready, vec![1, 2, 3]);
        assert_eq!(cursors.last_applied(id), 3);
    }

    #[test]
    fn absorb_applies_events_the_feed_missed() {
        use std::sync::Arc;

        use chrono::Utc;
        use tradelane_core::{Actor, Role, UserId};
        use tradelane_events::{EventBus, InMemoryEventBus};
        use tradelane_inventory::{CreateProduct, Product, ProductCommand, ProductId};

        use crate::command_dispatcher::CommandDispatcher;
        use crate::event_store::InMemoryEventStore;

        // The read models listen on a bus the dispatcher never publishes to.
        let silent = InMemoryEventBus::<EventEnvelope<JsonValue>>::new();
        let models = ReadModels::new(silent.subscribe());
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        );

        let product_id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            actor: Actor::new(UserId::new(), Role::Supplier),
            name: "Clay pot".to_string(),
            price: 300,
            margin: 30,
            stock: 4,
            occurred_at: Utc::now(),
        });
        let (_, committed) = dispatcher
            .dispatch(product_id.0, crate::streams::PRODUCT, &cmd, |id| {
                Product::empty(ProductId::new(id))
            })
            .unwrap();

        models.absorb(&committed);
        models.absorb(&committed);

        let listed = models.products.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].stock, 4);
    }

    #[test]
    fn sequence_zero_is_rejected() {
        let cursors = StreamCursors::new();
        assert!(matches!(
            cursors.admit(&env(AggregateId::new(), 0)),
            Err(ProjectionError::InvalidSequence { .. })
        ));
    }
}
