use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tradelane_core::{Actor, UserId};
use tradelane_events::EventEnvelope;
use tradelane_orders::OrderId;
use tradelane_payouts::{PayeeRole, PayoutEvent, PayoutId, PayoutMode, PayoutStatus};

use super::{Projection, ProjectionError, StreamCursors, decode};
use crate::read_model::{InMemoryReadStore, ReadStore};

pub const PAYOUT_AGGREGATE_TYPE: &str = crate::streams::PAYOUT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReadModel {
    pub payout_id: PayoutId,
    pub order_id: OrderId,
    pub payee_id: UserId,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    pub paid_amount: u64,
    pub status: PayoutStatus,
    pub mode: PayoutMode,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Live payouts only: a soft delete removes the row.
#[derive(Debug, Default)]
pub struct PayoutsProjection {
    store: InMemoryReadStore<PayoutId, PayoutReadModel>,
    cursors: StreamCursors,
}

impl PayoutsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, payout_id: &PayoutId) -> Option<PayoutReadModel> {
        self.store.get(payout_id)
    }

    /// Admins see every payout, anyone else only payouts addressed to them.
    /// Ordered by due date.
    pub fn list_visible_to(&self, actor: &Actor) -> Vec<PayoutReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|p| actor.is_admin() || p.payee_id == actor.user_id)
            .collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.created_at.cmp(&b.created_at)));
        rows
    }

    fn apply_event(&self, ev: PayoutEvent) {
        match ev {
            PayoutEvent::PayoutCreated(e) => self.store.upsert(
                e.payout_id,
                PayoutReadModel {
                    payout_id: e.payout_id,
                    order_id: e.order_id,
                    payee_id: e.payee_id,
                    payee_role: e.payee_role,
                    payable_amount: e.payable_amount,
                    paid_amount: 0,
                    status: PayoutStatus::Pending,
                    mode: e.mode,
                    due_date: e.due_date,
                    paid_at: None,
                    created_at: e.occurred_at,
                },
            ),
            PayoutEvent::PayoutUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.payout_id) {
                    rm.paid_amount = e.paid_amount;
                    rm.status = e.status;
                    rm.mode = e.mode;
                    rm.paid_at = e.paid_at;
                    self.store.upsert(e.payout_id, rm);
                }
            }
            PayoutEvent::PayoutDeleted(e) => self.store.remove(&e.payout_id),
        }
    }
}

impl Projection for PayoutsProjection {
    fn aggregate_type(&self) -> &'static str {
        PAYOUT_AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        for ready in self.cursors.admit(envelope)? {
            let ev: PayoutEvent = decode(PAYOUT_AGGREGATE_TYPE, &ready, |e: &PayoutEvent| e.payout_id().0)?;
            self.apply_event(ev);
        }
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
