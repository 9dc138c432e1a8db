//! Aggregate type names, one per stream family. Stored on every event and
//! used by projections to route envelopes.

pub const PRODUCT: &str = "inventory.product";
pub const ORDER: &str = "orders.order";
pub const PAYOUT: &str = "payouts.payout";
pub const WALLET: &str = "wallet.wallet";
