use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post, put},
    Router,
};

use tradelane_infra::settlement::{NewProduct, ProductChanges};
use tradelane_inventory::ProductId;

use crate::app::dto::{self, ApiJson};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/restock", post(restock))
        .route("/:id/availability", put(set_availability))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateProductRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PRODUCTS) {
        return errors::forbidden(e);
    }

    let new = NewProduct {
        name: body.name,
        price: body.price,
        margin: body.margin,
        stock: body.stock,
    };
    match services.settlement().create_product(principal.actor(), new) {
        Ok(product) => errors::created(dto::ProductView::from(&product)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_PRODUCTS) {
        return errors::forbidden(e);
    }
    errors::ok(services.settlement().list_products())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::READ_PRODUCTS) {
        return errors::forbidden(e);
    }
    let product_id = match dto::parse_id(&id) {
        Ok(v) => ProductId::new(v),
        Err(res) => return res,
    };

    match services.settlement().get_product(product_id) {
        Ok(product) => errors::ok(dto::ProductView::from(&product)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateProductRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PRODUCTS) {
        return errors::forbidden(e);
    }
    let product_id = match dto::parse_id(&id) {
        Ok(v) => ProductId::new(v),
        Err(res) => return res,
    };

    let changes = ProductChanges {
        name: body.name,
        price: body.price,
        margin: body.margin,
    };
    match services
        .settlement()
        .update_product(principal.actor(), product_id, changes)
    {
        Ok(product) => errors::ok(dto::ProductView::from(&product)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::RestockRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PRODUCTS) {
        return errors::forbidden(e);
    }
    let product_id = match dto::parse_id(&id) {
        Ok(v) => ProductId::new(v),
        Err(res) => return res,
    };

    match services
        .settlement()
        .restock(principal.actor(), product_id, body.quantity)
    {
        Ok(product) => errors::ok(dto::ProductView::from(&product)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn set_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::AvailabilityRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_PRODUCTS) {
        return errors::forbidden(e);
    }
    let product_id = match dto::parse_id(&id) {
        Ok(v) => ProductId::new(v),
        Err(res) => return res,
    };

    match services
        .settlement()
        .set_availability(principal.actor(), product_id, body.available)
    {
        Ok(product) => errors::ok(dto::ProductView::from(&product)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
