//! Infrastructure layer: event store, command dispatch, projections, the
//! order placement saga and the settlement service that ties them together.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod notify;
pub mod order_number;
pub mod projections;
pub mod read_model;
pub mod saga;
pub mod settlement;
pub mod streams;
