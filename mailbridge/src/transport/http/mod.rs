//! HTTP transport via axum.

mod routes;
mod server;

pub use routes::{ChatRequest, HealthCheckResponse, routes};
pub use server::{ServerConfig, serve, serve_listener};
