//! Payout ledger (event-sourced).
//!
//! A payout is an admin-initiated disbursement against an order. Its status is
//! never set directly: it is derived from the paid amount on every write.

pub mod payout;

pub use payout::{
    CreatePayout, DeletePayout, PayeeRole, Payout, PayoutCommand, PayoutCreated, PayoutDeleted,
    PayoutEvent, PayoutId, PayoutMode, PayoutStatus, PayoutUpdated, UpdatePayout,
};
