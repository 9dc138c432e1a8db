//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: settlement core wiring, notification sink, SSE fan-out
//! - `routes/`: HTTP routes + handlers (one file per ledger)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: the `{success, message?, data?}` envelope

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use tradelane_infra::command_dispatcher::DispatchError;
use tradelane_infra::config::SettlementConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over already-wired services.
pub fn build_app(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(tradelane_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

/// Router over a fresh in-memory store with default configuration.
pub fn build_in_memory_app(jwt_secret: String) -> Result<Router, DispatchError> {
    let services = services::AppServices::in_memory(SettlementConfig::default())?;
    Ok(build_app(jwt_secret, Arc::new(services)))
}
