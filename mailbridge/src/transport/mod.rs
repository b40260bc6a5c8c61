//! Transport layer for mailbridge.
//!
//! Only HTTP today; the service layer does not depend on it.

pub mod http;

pub use http::{ServerConfig, serve, serve_listener};
