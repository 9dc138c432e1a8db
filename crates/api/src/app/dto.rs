//! Request/response DTOs and JSON mapping helpers.
//!
//! The wire format is camelCase; domain types keep their Rust names and are
//! mapped here.

use axum::{
    async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use tradelane_auth::UserRecord;
use tradelane_core::{AggregateId, Role, UserId};
use tradelane_infra::settlement::{OrderHistory, WalletReceipt};
use tradelane_inventory::{Product, ProductId, ProductStatus};
use tradelane_orders::{
    AdminReview, Order, OrderId, OrderStatus, ReviewAction, ShippingAddress, StatusHistoryEntry,
};
use tradelane_payouts::{PayeeRole, Payout, PayoutId, PayoutMode, PayoutStatus};
use tradelane_wallet::{TransactionKind, TransactionStatus, WalletTransaction, WithdrawalOutcome};

use crate::app::errors;

/// `Json<T>` whose rejection is the API error envelope (400) instead of
/// axum's plain-text body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// Parse a path segment into an id, answering 400 on garbage.
pub fn parse_id(raw: &str) -> Result<AggregateId, Response> {
    raw.parse::<AggregateId>().map_err(errors::bad_request)
}

pub fn parse_user_id(raw: &str) -> Result<UserId, Response> {
    raw.parse::<UserId>().map_err(errors::bad_request)
}

// ---- products ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub price: u64,
    #[serde(default)]
    pub margin: u64,
    pub stock: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub margin: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: ProductId,
    pub supplier_id: Option<UserId>,
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub final_price: u64,
    pub stock: u64,
    pub status: ProductStatus,
}

impl From<&Product> for ProductView {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id_typed(),
            supplier_id: p.supplier_id(),
            name: p.name().to_string(),
            price: p.price(),
            margin: p.margin(),
            final_price: p.final_price(),
            stock: p.stock(),
            status: p.status(),
        }
    }
}

// ---- orders -----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressDto {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(a: ShippingAddressDto) -> Self {
        Self {
            recipient_name: a.recipient_name,
            phone: a.phone,
            street: a.street,
            city: a.city,
            state: a.state,
            postal_code: a.postal_code,
            country: a.country,
        }
    }
}

impl From<&ShippingAddress> for ShippingAddressDto {
    fn from(a: &ShippingAddress) -> Self {
        Self {
            recipient_name: a.recipient_name.clone(),
            phone: a.phone.clone(),
            street: a.street.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub product_id: String,
    pub quantity: u64,
    pub shipping_address: ShippingAddressDto,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReviewView {
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub action: ReviewAction,
    pub notes: Option<String>,
}

impl From<&AdminReview> for AdminReviewView {
    fn from(r: &AdminReview) -> Self {
        Self {
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            action: r.action,
            notes: r.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryView {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: UserId,
    pub notes: Option<String>,
}

impl From<&StatusHistoryEntry> for StatusHistoryView {
    fn from(e: &StatusHistoryEntry) -> Self {
        Self {
            status: e.status,
            timestamp: e.timestamp,
            updated_by: e.updated_by,
            notes: e.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub order_number: String,
    pub product_id: Option<ProductId>,
    pub supplier_id: Option<UserId>,
    pub seller_id: Option<UserId>,
    pub quantity: u64,
    pub unit_price: u64,
    pub total_price: u64,
    pub status: OrderStatus,
    pub admin_review: Option<AdminReviewView>,
    pub status_history: Vec<StatusHistoryView>,
    pub shipping_address: Option<ShippingAddressDto>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id_typed(),
            order_number: o.order_number().to_string(),
            product_id: o.product_id(),
            supplier_id: o.supplier_id(),
            seller_id: o.seller_id(),
            quantity: o.quantity(),
            unit_price: o.unit_price(),
            total_price: o.total_price(),
            status: o.status(),
            admin_review: o.admin_review().map(AdminReviewView::from),
            status_history: o.status_history().iter().map(StatusHistoryView::from).collect(),
            shipping_address: o.shipping_address().map(ShippingAddressDto::from),
            notes: o.notes().map(str::to_string),
            created_at: o.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryView {
    pub order_number: String,
    pub status_history: Vec<StatusHistoryView>,
}

impl From<&OrderHistory> for OrderHistoryView {
    fn from(h: &OrderHistory) -> Self {
        Self {
            order_number: h.order_number.clone(),
            status_history: h.status_history.iter().map(StatusHistoryView::from).collect(),
        }
    }
}

// ---- payouts ----------------------------------------------------------------

fn default_mode() -> PayoutMode {
    PayoutMode::BankTransfer
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayoutRequest {
    pub order: String,
    pub payee: String,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    #[serde(default = "default_mode")]
    pub payout_mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    #[serde(default)]
    pub proof_images: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayoutRequest {
    pub paid_amount: Option<u64>,
    pub payout_mode: Option<PayoutMode>,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutView {
    pub id: PayoutId,
    pub order_id: Option<OrderId>,
    pub payer_id: Option<UserId>,
    pub payee_id: Option<UserId>,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    pub paid_amount: u64,
    pub status: PayoutStatus,
    pub payout_mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processed_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Payout> for PayoutView {
    fn from(p: &Payout) -> Self {
        Self {
            id: p.id_typed(),
            order_id: p.order_id(),
            payer_id: p.payer_id(),
            payee_id: p.payee_id(),
            payee_role: p.payee_role(),
            payable_amount: p.payable_amount(),
            paid_amount: p.paid_amount(),
            status: p.status(),
            payout_mode: p.mode(),
            reference_number: p.reference_number().map(str::to_string),
            remarks: p.remarks().map(str::to_string),
            proof_images: p.proof_images().to_vec(),
            due_date: p.due_date(),
            paid_at: p.paid_at(),
            processed_by: p.processed_by(),
            created_at: p.created_at(),
        }
    }
}

// ---- wallet -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SettleWithdrawalRequest {
    pub outcome: WithdrawalOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: AggregateId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub description: String,
    pub balance_after: u64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&WalletTransaction> for TransactionView {
    fn from(t: &WalletTransaction) -> Self {
        Self {
            transaction_id: t.transaction_id,
            kind: t.kind,
            amount: t.amount,
            description: t.description.clone(),
            balance_after: t.balance_after,
            status: t.status,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptView {
    pub transaction: TransactionView,
    pub balance: u64,
}

impl From<&WalletReceipt> for ReceiptView {
    fn from(r: &WalletReceipt) -> Self {
        Self {
            transaction: TransactionView::from(&r.transaction),
            balance: r.balance,
        }
    }
}

// ---- users ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

impl From<&UserRecord> for UserView {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            active: u.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_request_reads_camel_case() {
        let body: PlaceOrderRequest = serde_json::from_value(json!({
            "productId": "0191a8b2-0000-7000-8000-000000000000",
            "quantity": 2,
            "shippingAddress": { "street": "1 Main St", "city": "Pune", "postalCode": "411001" },
        }))
        .unwrap();
        let address = ShippingAddress::from(body.shipping_address);
        assert_eq!(address.postal_code.as_deref(), Some("411001"));
        assert_eq!(body.notes, None);
    }

    #[test]
    fn payout_mode_defaults_to_bank_transfer() {
        let body: CreatePayoutRequest = serde_json::from_value(json!({
            "order": "o", "payee": "p", "payeeRole": "seller", "payableAmount": 1000,
        }))
        .unwrap();
        assert_eq!(body.payout_mode, PayoutMode::BankTransfer);
        assert!(body.proof_images.is_empty());
    }

    #[test]
    fn bad_ids_are_client_errors() {
        assert_eq!(parse_id("nope").unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
