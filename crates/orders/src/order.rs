use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradelane_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, Role, UserId};
use tradelane_events::Event;
use tradelane_inventory::ProductId;

use crate::status::OrderStatus;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl ShippingAddress {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.street.trim().is_empty() {
            return Err(DomainError::validation("shipping street is required"));
        }
        if self.city.trim().is_empty() {
            return Err(DomainError::validation("shipping city is required"));
        }
        Ok(())
    }
}

/// Request checks that need no order state. Placement reserves stock before
/// the order stream is written, so it runs these first.
pub fn validate_placement(
    quantity: u64,
    shipping_address: &ShippingAddress,
) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    shipping_address.validate()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approved,
    Rejected,
}

/// Outcome of the admin gate; present only once an admin acted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminReview {
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub action: ReviewAction,
    pub notes: Option<String>,
}

/// One audit-trail entry. Entries are appended, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: UserId,
    pub notes: Option<String>,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    product_id: Option<ProductId>,
    supplier_id: Option<UserId>,
    seller_id: Option<UserId>,
    quantity: u64,
    unit_price: u64,
    total_price: u64,
    status: OrderStatus,
    admin_review: Option<AdminReview>,
    status_history: Vec<StatusHistoryEntry>,
    shipping_address: Option<ShippingAddress>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            product_id: None,
            supplier_id: None,
            seller_id: None,
            quantity: 0,
            unit_price: 0,
            total_price: 0,
            status: OrderStatus::Pending,
            admin_review: None,
            status_history: Vec::new(),
            shipping_address: None,
            notes: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn supplier_id(&self) -> Option<UserId> {
        self.supplier_id
    }

    pub fn seller_id(&self) -> Option<UserId> {
        self.seller_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Final price per unit captured at placement.
    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn total_price(&self) -> u64 {
        self.total_price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn admin_review(&self) -> Option<&AdminReview> {
        self.admin_review.as_ref()
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Admins see everything; sellers and suppliers see the orders they are party to.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        actor.is_admin() || self.is_party(actor)
    }

    fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Supplier => self.supplier_id == Some(actor.user_id),
            Role::Seller => self.seller_id == Some(actor.user_id),
            Role::Admin | Role::SuperAdmin => false,
        }
    }

    /// History timestamps never go backwards, even if the caller's clock does.
    fn next_timestamp(&self, requested: DateTime<Utc>) -> DateTime<Utc> {
        match self.status_history.last() {
            Some(last) if last.timestamp > requested => last.timestamp,
            _ => requested,
        }
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
///
/// `unit_price` and `supplier_id` are the product snapshot resolved by the
/// caller at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub actor: Actor,
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub unit_price: u64,
    pub quantity: u64,
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOrderStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub actor: Actor,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ApproveOrder(ApproveOrder),
    RejectOrder(RejectOrder),
    UpdateOrderStatus(UpdateOrderStatus),
}

/// Event: OrderPlaced. The order enters admin review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub seller_id: UserId,
    pub quantity: u64,
    pub unit_price: u64,
    pub total_price: u64,
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved (admin_review -> pushed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: OrderId,
    pub reviewed_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRejected (admin_review -> admin_rejected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub reviewed_by: UserId,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub updated_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderApproved(OrderApproved),
    OrderRejected(OrderRejected),
    OrderStatusChanged(OrderStatusChanged),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order_id,
            OrderEvent::OrderApproved(e) => e.order_id,
            OrderEvent::OrderRejected(e) => e.order_id,
            OrderEvent::OrderStatusChanged(e) => e.order_id,
        }
    }

    /// Status written by this event.
    pub fn resulting_status(&self) -> OrderStatus {
        match self {
            OrderEvent::OrderPlaced(_) => OrderStatus::AdminReview,
            OrderEvent::OrderApproved(_) => OrderStatus::Pushed,
            OrderEvent::OrderRejected(_) => OrderStatus::AdminRejected,
            OrderEvent::OrderStatusChanged(e) => e.status,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderApproved(_) => "orders.order.approved",
            OrderEvent::OrderRejected(_) => "orders.order.rejected",
            OrderEvent::OrderStatusChanged(_) => "orders.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderApproved(e) => e.occurred_at,
            OrderEvent::OrderRejected(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let status = event.resulting_status();
        let entry = match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.product_id = Some(e.product_id);
                self.supplier_id = Some(e.supplier_id);
                self.seller_id = Some(e.seller_id);
                self.quantity = e.quantity;
                self.unit_price = e.unit_price;
                self.total_price = e.total_price;
                self.shipping_address = Some(e.shipping_address.clone());
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.admin_review = None;
                self.status_history.clear();
                self.created = true;
                StatusHistoryEntry {
                    status,
                    timestamp: e.occurred_at,
                    updated_by: e.seller_id,
                    notes: Some("order placed, awaiting admin review".to_string()),
                }
            }
            OrderEvent::OrderApproved(e) => {
                self.admin_review = Some(AdminReview {
                    reviewed_by: e.reviewed_by,
                    reviewed_at: e.occurred_at,
                    action: ReviewAction::Approved,
                    notes: e.notes.clone(),
                });
                StatusHistoryEntry {
                    status,
                    timestamp: e.occurred_at,
                    updated_by: e.reviewed_by,
                    notes: e.notes.clone(),
                }
            }
            OrderEvent::OrderRejected(e) => {
                self.admin_review = Some(AdminReview {
                    reviewed_by: e.reviewed_by,
                    reviewed_at: e.occurred_at,
                    action: ReviewAction::Rejected,
                    notes: Some(e.notes.clone()),
                });
                StatusHistoryEntry {
                    status,
                    timestamp: e.occurred_at,
                    updated_by: e.reviewed_by,
                    notes: Some(e.notes.clone()),
                }
            }
            OrderEvent::OrderStatusChanged(e) => StatusHistoryEntry {
                status,
                timestamp: e.occurred_at,
                updated_by: e.updated_by,
                notes: e.notes.clone(),
            },
        };

        self.status = status;
        self.status_history.push(entry);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ApproveOrder(cmd) => self.handle_approve(cmd),
            OrderCommand::RejectOrder(cmd) => self.handle_reject(cmd),
            OrderCommand::UpdateOrderStatus(cmd) => self.handle_update_status(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::not_found("order"))
        }
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_awaiting_review(&self, action: &str) -> Result<(), DomainError> {
        if self.status != OrderStatus::AdminReview {
            return Err(DomainError::invariant(format!(
                "only orders awaiting admin review can be {action} (current status: {})",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.actor.role != Role::Seller {
            return Err(DomainError::not_authorized("only sellers may place orders"));
        }
        validate_placement(cmd.quantity, &cmd.shipping_address)?;
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }

        let total_price = cmd
            .unit_price
            .checked_mul(cmd.quantity)
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            product_id: cmd.product_id,
            supplier_id: cmd.supplier_id,
            seller_id: cmd.actor.user_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            total_price,
            shipping_address: cmd.shipping_address.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;
        cmd.actor.require_admin("approve orders")?;
        self.ensure_awaiting_review("approved")?;

        Ok(vec![OrderEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            reviewed_by: cmd.actor.user_id,
            notes: cmd.notes.clone(),
            occurred_at: self.next_timestamp(cmd.occurred_at),
        })])
    }

    fn handle_reject(&self, cmd: &RejectOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;
        cmd.actor.require_admin("reject orders")?;

        let notes = cmd.notes.trim();
        if notes.is_empty() {
            return Err(DomainError::validation("rejection notes are required"));
        }
        // Also refuses re-rejection, so stock is restored at most once.
        self.ensure_awaiting_review("rejected")?;

        Ok(vec![OrderEvent::OrderRejected(OrderRejected {
            order_id: cmd.order_id,
            reviewed_by: cmd.actor.user_id,
            notes: notes.to_string(),
            occurred_at: self.next_timestamp(cmd.occurred_at),
        })])
    }

    fn handle_update_status(
        &self,
        cmd: &UpdateOrderStatus,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        let actor = &cmd.actor;
        if !actor.is_admin() && !self.is_party(actor) {
            return Err(DomainError::not_authorized(
                "only the owning supplier, the owning seller or an admin may update this order",
            ));
        }
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "order is in terminal status {}",
                self.status
            )));
        }
        if cmd.status.is_review_gated() {
            return Err(DomainError::validation(format!(
                "status {} can only be reached through admin review",
                cmd.status
            )));
        }
        if self.status == OrderStatus::AdminReview && !actor.is_admin() {
            let seller_cancelling =
                actor.role == Role::Seller && cmd.status == OrderStatus::Cancelled;
            if !seller_cancelling {
                return Err(DomainError::not_authorized("order is awaiting admin review"));
            }
        }
        if self.status == cmd.status {
            return Err(DomainError::validation(format!("order is already {}", cmd.status)));
        }

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            status: cmd.status,
            updated_by: actor.user_id,
            notes: cmd.notes.clone(),
            occurred_at: self.next_timestamp(cmd.occurred_at),
        })])
    }
}
