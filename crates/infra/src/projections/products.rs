use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tradelane_core::UserId;
use tradelane_events::EventEnvelope;
use tradelane_inventory::{ProductEvent, ProductId, ProductStatus};

use super::{Projection, ProjectionError, StreamCursors, decode};
use crate::read_model::{InMemoryReadStore, ReadStore};

pub const PRODUCT_AGGREGATE_TYPE: &str = crate::streams::PRODUCT;

/// Catalogue entry as sellers browse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub final_price: u64,
    pub stock: u64,
    pub listed: bool,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

impl ProductReadModel {
    fn refresh(&mut self, at: DateTime<Utc>) {
        self.final_price = self.price.saturating_add(self.margin);
        self.status = ProductStatus::derive(self.stock, self.listed);
        self.updated_at = at;
    }
}

#[derive(Debug, Default)]
pub struct ProductCatalogProjection {
    store: InMemoryReadStore<ProductId, ProductReadModel>,
    cursors: StreamCursors,
}

impl ProductCatalogProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    /// Sorted by name for stable listings.
    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.product_id.0.as_uuid().cmp(b.product_id.0.as_uuid())));
        all
    }

    fn apply_event(&self, ev: ProductEvent) {
        let product_id = ev.product_id();

        if let ProductEvent::ProductCreated(e) = &ev {
            let mut rm = ProductReadModel {
                product_id,
                supplier_id: e.supplier_id,
                name: e.name.clone(),
                price: e.price,
                margin: e.margin,
                final_price: 0,
                stock: e.stock,
                listed: true,
                status: ProductStatus::Active,
                updated_at: e.occurred_at,
            };
            rm.refresh(e.occurred_at);
            self.store.upsert(product_id, rm);
            return;
        }

        // Any later event for an unknown product means the created event was
        // never seen; there is nothing sensible to patch.
        let Some(mut rm) = self.store.get(&product_id) else {
            tracing::warn!(%product_id, "product event without a catalogue entry");
            return;
        };

        let at = match ev {
            ProductEvent::ProductCreated(_) => return,
            ProductEvent::ProductUpdated(e) => {
                rm.name = e.name;
                rm.price = e.price;
                rm.margin = e.margin;
                e.occurred_at
            }
            ProductEvent::Restocked(e) => {
                rm.stock = e.stock_after;
                e.occurred_at
            }
            ProductEvent::AvailabilityChanged(e) => {
                rm.listed = e.listed;
                e.occurred_at
            }
            ProductEvent::StockReserved(e) => {
                rm.stock = e.stock_after;
                e.occurred_at
            }
            ProductEvent::StockReleased(e) => {
                rm.stock = e.stock_after;
                e.occurred_at
            }
        };
        rm.refresh(at);
        self.store.upsert(product_id, rm);
    }
}

impl Projection for ProductCatalogProjection {
    fn aggregate_type(&self) -> &'static str {
        PRODUCT_AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        for ready in self.cursors.admit(envelope)? {
            let ev: ProductEvent = decode(PRODUCT_AGGREGATE_TYPE, &ready, |e: &ProductEvent| e.product_id().0)?;
            self.apply_event(ev);
        }
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
