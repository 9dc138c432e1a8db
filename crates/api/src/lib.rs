//! HTTP API: routing, authentication, and request/response mapping over the
//! settlement core.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
