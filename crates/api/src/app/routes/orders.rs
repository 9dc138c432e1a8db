use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post, put},
    Router,
};

use tradelane_infra::saga::PlaceOrderRequest;
use tradelane_inventory::ProductId;
use tradelane_orders::{OrderId, OrderStatus};

use crate::app::dto::{self, ApiJson};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/history", get(order_history))
        .route("/:id/status", put(update_status))
        .route("/:id/admin/approve", post(approve_order))
        .route("/:id/admin/reject", post(reject_order))
}

fn order_id(raw: &str) -> Result<OrderId, Response> {
    dto::parse_id(raw).map(OrderId::new)
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::PlaceOrderRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::PLACE_ORDERS) {
        return errors::forbidden(e);
    }
    let product_id = match dto::parse_id(&body.product_id) {
        Ok(v) => ProductId::new(v),
        Err(res) => return res,
    };

    let request = PlaceOrderRequest {
        actor: principal.actor(),
        product_id,
        quantity: body.quantity,
        shipping_address: body.shipping_address.into(),
        notes: body.notes,
    };
    match services.settlement().place_order(request) {
        Ok(order) => errors::created(dto::OrderView::from(&order)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_ORDERS) {
        return errors::forbidden(e);
    }
    errors::ok(services.settlement().list_orders(principal.actor()))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_ORDERS) {
        return errors::forbidden(e);
    }
    let order_id = match order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.settlement().get_order(principal.actor(), order_id) {
        Ok(order) => errors::ok(dto::OrderView::from(&order)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn order_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_ORDERS) {
        return errors::forbidden(e);
    }
    let order_id = match order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.settlement().order_history(principal.actor(), order_id) {
        Ok(history) => errors::ok(dto::OrderHistoryView::from(&history)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateStatusRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::UPDATE_ORDER_STATUS) {
        return errors::forbidden(e);
    }
    let order_id = match order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let status = match body.status.parse::<OrderStatus>() {
        Ok(s) => s,
        Err(e) => return errors::bad_request(e),
    };

    match services
        .settlement()
        .update_order_status(principal.actor(), order_id, status, body.notes)
    {
        Ok(order) => errors::ok(dto::OrderView::from(&order)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn approve_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ReviewRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::REVIEW_ORDERS) {
        return errors::forbidden(e);
    }
    let order_id = match order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .settlement()
        .approve_order(principal.actor(), order_id, body.notes)
    {
        Ok(order) => errors::ok(dto::OrderView::from(&order)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn reject_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ReviewRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::REVIEW_ORDERS) {
        return errors::forbidden(e);
    }
    let order_id = match order_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    // Blank notes are refused by the aggregate.
    let notes = body.notes.unwrap_or_default();
    match services
        .settlement()
        .reject_order(principal.actor(), order_id, notes)
    {
        Ok(order) => errors::ok(dto::OrderView::from(&order)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
