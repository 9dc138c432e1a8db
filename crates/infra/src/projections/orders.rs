use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tradelane_core::{Actor, Role, UserId};
use tradelane_events::EventEnvelope;
use tradelane_inventory::ProductId;
use tradelane_orders::{OrderEvent, OrderId, OrderStatus, ReviewAction};

use super::{Projection, ProjectionError, StreamCursors, decode};
use crate::read_model::{InMemoryReadStore, ReadStore};

pub const ORDER_AGGREGATE_TYPE: &str = crate::streams::ORDER;

/// Order summary row for listings. Full detail (history, address, review)
/// is read from the order's own stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub order_number: String,
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub seller_id: UserId,
    pub quantity: u64,
    pub total_price: u64,
    pub status: OrderStatus,
    pub review: Option<ReviewAction>,
    pub history_len: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderReadModel {
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Admin | Role::SuperAdmin => true,
            Role::Seller => self.seller_id == actor.user_id,
            Role::Supplier => self.supplier_id == actor.user_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct OrdersProjection {
    store: InMemoryReadStore<OrderId, OrderReadModel>,
    cursors: StreamCursors,
}

impl OrdersProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(order_id)
    }

    /// Newest first.
    pub fn list_visible_to(&self, actor: &Actor) -> Vec<OrderReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| o.is_visible_to(actor))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.order_number.cmp(&a.order_number)));
        rows
    }

    fn apply_event(&self, ev: OrderEvent) {
        let order_id = ev.order_id();
        let status = ev.resulting_status();

        if let OrderEvent::OrderPlaced(e) = ev {
            self.store.upsert(
                order_id,
                OrderReadModel {
                    order_id,
                    order_number: e.order_number,
                    product_id: e.product_id,
                    supplier_id: e.supplier_id,
                    seller_id: e.seller_id,
                    quantity: e.quantity,
                    total_price: e.total_price,
                    status,
                    review: None,
                    history_len: 1,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            );
            return;
        }

        let Some(mut rm) = self.store.get(&order_id) else {
            tracing::warn!(%order_id, "order event without a summary row");
            return;
        };

        let (review, at) = match ev {
            OrderEvent::OrderPlaced(_) => return,
            OrderEvent::OrderApproved(e) => (Some(ReviewAction::Approved), e.occurred_at),
            OrderEvent::OrderRejected(e) => (Some(ReviewAction::Rejected), e.occurred_at),
            OrderEvent::OrderStatusChanged(e) => (rm.review, e.occurred_at),
        };
        rm.status = status;
        rm.review = review;
        rm.history_len += 1;
        rm.updated_at = at;
        self.store.upsert(order_id, rm);
    }
}

impl Projection for OrdersProjection {
    fn aggregate_type(&self) -> &'static str {
        ORDER_AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        for ready in self.cursors.admit(envelope)? {
            let ev: OrderEvent = decode(ORDER_AGGREGATE_TYPE, &ready, |e: &OrderEvent| e.order_id().0)?;
            self.apply_event(ev);
        }
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
