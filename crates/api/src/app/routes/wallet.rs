use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::app::dto::{self, ApiJson};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

pub fn router() -> Router {
    Router::new()
        .route("/balance", get(balance))
        .route("/transactions", get(transactions))
        .route("/add-funds", post(add_funds))
        .route("/withdraw", post(withdraw))
        .route(
            "/withdrawals/:user_id/:transaction_id/settle",
            post(settle_withdrawal),
        )
}

pub async fn balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::USE_WALLET) {
        return errors::forbidden(e);
    }
    match services.settlement().wallet_balance(principal.actor()) {
        Ok(balance) => errors::ok(json!({ "balance": balance })),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Newest first; `limit` defaults to 20 and is capped at 100.
pub async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TransactionsQuery>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::USE_WALLET) {
        return errors::forbidden(e);
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let offset = query.offset.unwrap_or(0);

    match services
        .settlement()
        .wallet_transactions(principal.actor(), limit, offset)
    {
        Ok(txs) => errors::ok(txs.iter().map(dto::TransactionView::from).collect::<Vec<_>>()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_funds(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::AmountRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::USE_WALLET) {
        return errors::forbidden(e);
    }
    match services
        .settlement()
        .add_funds(principal.actor(), body.amount, body.description)
    {
        Ok(receipt) => errors::ok(dto::ReceiptView::from(&receipt)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn withdraw(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::AmountRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::USE_WALLET) {
        return errors::forbidden(e);
    }
    match services
        .settlement()
        .withdraw(principal.actor(), body.amount, body.description)
    {
        Ok(receipt) => errors::ok(dto::ReceiptView::from(&receipt)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn settle_withdrawal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((user_id, transaction_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<dto::SettleWithdrawalRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::SETTLE_WITHDRAWALS) {
        return errors::forbidden(e);
    }
    let user_id = match dto::parse_user_id(&user_id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let transaction_id = match dto::parse_id(&transaction_id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.settlement().settle_withdrawal(
        principal.actor(),
        user_id,
        transaction_id,
        body.outcome,
    ) {
        Ok(receipt) => errors::ok(dto::ReceiptView::from(&receipt)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
