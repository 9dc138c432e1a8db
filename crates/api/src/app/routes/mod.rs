use axum::{routing::get, Router};

pub mod orders;
pub mod payouts;
pub mod products;
pub mod system;
pub mod users;
pub mod wallet;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/products", products::router())
        .nest("/orders", orders::router())
        .nest("/payouts", payouts::router())
        .nest("/wallet", wallet::router())
        .nest("/users", users::router())
}
