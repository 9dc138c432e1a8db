//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply historical events in sequence order)
//!   ↓
//! 3. Handle (pure decision, produces events or a DomainError)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded revision)
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! Step 4 is the commit point. A publish failure in step 5 is logged and the
//! dispatch still succeeds: the events are durable, and callers that run
//! follow-up writes (stock release, compensation) must see the command as
//! committed. Read models recover from the returned events or a rebuild.
//!
//! Step 4 is a compare-and-swap on the stream revision. Two writers that load
//! the same revision cannot both commit; the loser gets `DispatchError::Concurrency`
//! and [`CommandDispatcher::dispatch_with_retry`] re-runs steps 1-4 against the
//! fresh state. That is how stock reservation and wallet debits stay exact
//! under concurrency without holding any lock across the decision.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tradelane_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use tradelane_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Business-rule rejection; nothing was appended.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Stream moved on between load and append (after retries, if any).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A historical payload no longer deserializes into the aggregate's event type.
    #[error("failed to rehydrate aggregate: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// A collaborator outside the event store (user directory, order number
    /// index) could not answer.
    #[error("{0} unavailable")]
    Unavailable(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Aggregate state after a successful dispatch, plus what was committed.
pub type Dispatched<A> = (A, Vec<StoredEvent>);

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests run fully in memory and the
/// service can swap in Postgres without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one load/decide/append/publish cycle.
    ///
    /// Returns the post-command aggregate. A command that decides no events
    /// (an idempotent no-op) commits nothing and returns the loaded state.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tradelane_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok((aggregate, vec![]));
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                tracing::error!(
                    %aggregate_id,
                    event_type = %stored.event_type,
                    sequence_number = stored.sequence_number,
                    error = ?e,
                    "event committed but not published"
                );
            }
        }

        Ok((aggregate, committed))
    }

    /// [`dispatch`](Self::dispatch), retried while the append loses the
    /// revision race. Each attempt re-reads the stream, so the aggregate
    /// re-decides against current state (e.g. a reservation that fit before
    /// may now be `InsufficientStock`).
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        max_attempts: u32,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tradelane_events::Event + Serialize + DeserializeOwned,
    {
        let attempts = max_attempts.max(1);
        let mut last_conflict = String::new();

        for attempt in 1..=attempts {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) => {
                    tracing::debug!(%aggregate_id, aggregate_type, attempt, "append lost revision race, retrying");
                    last_conflict = msg;
                }
                other => return other,
            }
        }

        tracing::warn!(%aggregate_id, aggregate_type, attempts, "giving up after repeated conflicts");
        Err(DispatchError::Concurrency(format!(
            "{aggregate_type} {aggregate_id}: {attempts} attempts exhausted ({last_conflict})"
        )))
    }

    /// Rehydrate an aggregate from its stream without running a command.
    ///
    /// Reads straight from the store, so the result reflects every committed
    /// write (unlike a projection, which may lag the bus).
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tradelane_core::{AggregateRoot, UserId};
    use tradelane_events::InMemoryEventBus;
    use tradelane_inventory::{Product, ProductCommand, ProductId, Restock};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(d: &Dispatcher, stock: u64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(tradelane_inventory::CreateProduct {
            product_id: id,
            actor: tradelane_core::Actor::new(UserId::new(), tradelane_core::Role::Supplier),
            name: "Walnut desk".to_string(),
            price: 1_000,
            margin: 100,
            stock,
            occurred_at: Utc::now(),
        });
        d.dispatch(id.0, "inventory.product", &cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap();
        id
    }

    #[test]
    fn dispatch_publishes_after_append() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let id = create(&d, 3);

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.aggregate_id(), id.0);
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(d.store().load_stream(id.0).unwrap().len(), 1);
    }

    #[test]
    fn dispatch_returns_post_command_state() {
        let d = dispatcher();
        let id = create(&d, 3);

        let cmd = ProductCommand::Restock(Restock {
            product_id: id,
            actor: tradelane_core::Actor::new(UserId::new(), tradelane_core::Role::Admin),
            quantity: 4,
            occurred_at: Utc::now(),
        });
        let (product, committed) = d
            .dispatch(id.0, "inventory.product", &cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap();

        assert_eq!(product.stock(), 7);
        assert_eq!(product.version(), 2);
        assert_eq!(committed[0].sequence_number, 2);
    }

    #[test]
    fn domain_rejections_commit_nothing() {
        let d = dispatcher();
        let id = create(&d, 3);

        let cmd = ProductCommand::Restock(Restock {
            product_id: id,
            actor: tradelane_core::Actor::new(UserId::new(), tradelane_core::Role::Admin),
            quantity: 0,
            occurred_at: Utc::now(),
        });
        let err = d
            .dispatch(id.0, "inventory.product", &cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap_err();

        assert!(matches!(err, DispatchError::Domain(_)));
        assert_eq!(d.store().load_stream(id.0).unwrap().len(), 1);
    }

    /// Bus that refuses every message.
    struct DownBus;

    impl EventBus<EventEnvelope<JsonValue>> for DownBus {
        type Error = &'static str;

        fn publish(&self, _: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("bus down")
        }

        fn subscribe(&self) -> tradelane_events::Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            tradelane_events::Subscription::new(rx)
        }
    }

    #[test]
    fn publish_failure_still_reports_the_commit() {
        let d = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), DownBus);
        let id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(tradelane_inventory::CreateProduct {
            product_id: id,
            actor: tradelane_core::Actor::new(UserId::new(), tradelane_core::Role::Supplier),
            name: "Oak shelf".to_string(),
            price: 500,
            margin: 50,
            stock: 2,
            occurred_at: Utc::now(),
        });

        let (product, committed) = d
            .dispatch(id.0, "inventory.product", &cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap();

        assert_eq!(product.stock(), 2);
        assert_eq!(committed.len(), 1);
        assert_eq!(d.store().load_stream(id.0).unwrap().len(), 1);
    }

    #[test]
    fn load_reflects_committed_writes() {
        let d = dispatcher();
        let id = create(&d, 5);
        let product: Product = d.load(id.0, |aid| Product::empty(ProductId::new(aid))).unwrap();
        assert!(product.exists());
        assert_eq!(product.stock(), 5);
    }
}
