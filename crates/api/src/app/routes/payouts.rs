use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;

use tradelane_infra::settlement::{NewPayout, PayoutChanges};
use tradelane_orders::OrderId;
use tradelane_payouts::PayoutId;

use crate::app::dto::{self, ApiJson};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_payout).get(list_payouts))
        .route(
            "/:id",
            get(get_payout).put(update_payout).delete(delete_payout),
        )
}

fn payout_id(raw: &str) -> Result<PayoutId, Response> {
    dto::parse_id(raw).map(PayoutId::new)
}

pub async fn create_payout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreatePayoutRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PAYOUTS) {
        return errors::forbidden(e);
    }
    let order_id = match dto::parse_id(&body.order) {
        Ok(v) => OrderId::new(v),
        Err(res) => return res,
    };
    let payee_id = match dto::parse_user_id(&body.payee) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let new = NewPayout {
        order_id,
        payee_id,
        payee_role: body.payee_role,
        payable_amount: body.payable_amount,
        mode: body.payout_mode,
        reference_number: body.reference_number,
        remarks: body.remarks,
        proof_images: body.proof_images,
        due_date: body.due_date,
    };
    match services.settlement().create_payout(principal.actor(), new) {
        Ok(payout) => errors::created(dto::PayoutView::from(&payout)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_payouts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_PAYOUTS) {
        return errors::forbidden(e);
    }
    errors::ok(services.settlement().list_payouts(principal.actor()))
}

pub async fn get_payout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_PAYOUTS) {
        return errors::forbidden(e);
    }
    let payout_id = match payout_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.settlement().get_payout(principal.actor(), payout_id) {
        Ok(payout) => errors::ok(dto::PayoutView::from(&payout)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_payout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdatePayoutRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PAYOUTS) {
        return errors::forbidden(e);
    }
    let payout_id = match payout_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let changes = PayoutChanges {
        paid_amount: body.paid_amount,
        mode: body.payout_mode,
        reference_number: body.reference_number,
        remarks: body.remarks,
        proof_images: body.proof_images,
    };
    match services
        .settlement()
        .update_payout(principal.actor(), payout_id, changes)
    {
        Ok(payout) => errors::ok(dto::PayoutView::from(&payout)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_payout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PAYOUTS) {
        return errors::forbidden(e);
    }
    let payout_id = match payout_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.settlement().delete_payout(principal.actor(), payout_id) {
        Ok(()) => errors::ok(json!({ "id": payout_id })),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
