use std::sync::Arc;

use axum::{
    extract::Extension,
    response::Response,
    routing::post,
    Router,
};

use crate::app::dto::{self, ApiJson};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", post(register_user).get(list_users))
}

pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::RegisterUserRequest>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_USERS) {
        return errors::forbidden(e);
    }
    match services
        .settlement()
        .register_user(principal.actor(), body.name, body.email, body.role)
    {
        Ok(user) => errors::created(dto::UserView::from(&user)),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(e) = authz::authorize_command(&principal, &authz::MANAGE_USERS) {
        return errors::forbidden(e);
    }
    match services.settlement().list_users(principal.actor()) {
        Ok(users) => errors::ok(users.iter().map(dto::UserView::from).collect::<Vec<_>>()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
