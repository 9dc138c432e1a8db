//! Append-only event store boundary.
//!
//! One stream per aggregate instance, optimistic concurrency on append, and a
//! full-log read for rebuilding projections. The in-memory store is the default;
//! the Postgres store is compiled with the `postgres` feature.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
