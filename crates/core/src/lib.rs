//! Domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the settlement
//! modules (no infrastructure concerns).

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod record;

pub use actor::{Actor, Role};
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use record::RecordState;
