//! Human-readable order numbers: `ORD-YYYYMMDD-HHMMSS-NNNN`.
//!
//! Uniqueness is enforced by an index that claims a number atomically. A
//! collision regenerates the random suffix; the attempt budget is bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

use tradelane_core::AggregateId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("could not allocate a unique order number after {0} attempts")]
    Exhausted(u32),

    #[error("order number index unavailable: {0}")]
    Unavailable(String),
}

/// Registry of issued order numbers.
pub trait OrderNumberIndex: Send + Sync {
    /// Claim `number` for `order_id`. `Ok(false)` if it is already taken.
    fn claim(&self, number: &str, order_id: AggregateId) -> Result<bool, OrderNumberError>;

    /// Give a number back (placement compensation).
    fn release(&self, number: &str, order_id: AggregateId) -> Result<(), OrderNumberError>;

    fn lookup(&self, number: &str) -> Result<Option<AggregateId>, OrderNumberError>;
}

impl<I> OrderNumberIndex for Arc<I>
where
    I: OrderNumberIndex + ?Sized,
{
    fn claim(&self, number: &str, order_id: AggregateId) -> Result<bool, OrderNumberError> {
        (**self).claim(number, order_id)
    }

    fn release(&self, number: &str, order_id: AggregateId) -> Result<(), OrderNumberError> {
        (**self).release(number, order_id)
    }

    fn lookup(&self, number: &str) -> Result<Option<AggregateId>, OrderNumberError> {
        (**self).lookup(number)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderNumberIndex {
    issued: Mutex<HashMap<String, AggregateId>>,
}

impl InMemoryOrderNumberIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> OrderNumberError {
        OrderNumberError::Unavailable("lock poisoned".to_string())
    }
}

impl OrderNumberIndex for InMemoryOrderNumberIndex {
    fn claim(&self, number: &str, order_id: AggregateId) -> Result<bool, OrderNumberError> {
        let mut issued = self.issued.lock().map_err(|_| Self::poisoned())?;
        if issued.contains_key(number) {
            return Ok(false);
        }
        issued.insert(number.to_string(), order_id);
        Ok(true)
    }

    fn release(&self, number: &str, order_id: AggregateId) -> Result<(), OrderNumberError> {
        let mut issued = self.issued.lock().map_err(|_| Self::poisoned())?;
        if issued.get(number) == Some(&order_id) {
            issued.remove(number);
        }
        Ok(())
    }

    fn lookup(&self, number: &str) -> Result<Option<AggregateId>, OrderNumberError> {
        let issued = self.issued.lock().map_err(|_| Self::poisoned())?;
        Ok(issued.get(number).copied())
    }
}

pub fn format_order_number(at: DateTime<Utc>, suffix: u16) -> String {
    format!("ORD-{}-{:04}", at.format("%Y%m%d-%H%M%S"), suffix % 10_000)
}

/// Generate and claim a fresh number with a random 4-digit suffix.
pub fn allocate(
    index: &dyn OrderNumberIndex,
    order_id: AggregateId,
    at: DateTime<Utc>,
    max_attempts: u32,
) -> Result<String, OrderNumberError> {
    let mut rng = rand::thread_rng();
    allocate_with(index, order_id, at, max_attempts, || rng.gen_range(0..10_000))
}

/// [`allocate`] with a caller-supplied suffix source.
pub fn allocate_with(
    index: &dyn OrderNumberIndex,
    order_id: AggregateId,
    at: DateTime<Utc>,
    max_attempts: u32,
    mut suffix: impl FnMut() -> u16,
) -> Result<String, OrderNumberError> {
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let candidate = format_order_number(at, suffix());
        if index.claim(&candidate, order_id)? {
            return Ok(candidate);
        }
        tracing::debug!(%order_id, attempt, candidate, "order number collision, regenerating");
    }
    Err(OrderNumberError::Exhausted(attempts))
}
