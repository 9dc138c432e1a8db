//! Order state machine (event-sourced).
//!
//! Orders are created by sellers straight into admin review, released or
//! rejected by an admin, and then progressed by their owning supplier/seller.
//! Every status write appends one entry to an append-only history.

pub mod order;
pub mod status;

pub use order::{
    AdminReview, ApproveOrder, Order, OrderApproved, OrderCommand, OrderEvent, OrderId,
    OrderPlaced, OrderRejected, OrderStatusChanged, PlaceOrder, RejectOrder, ReviewAction,
    ShippingAddress, StatusHistoryEntry, UpdateOrderStatus, validate_placement,
};
pub use status::OrderStatus;
