//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the conversion endpoint
//! - The conversion request handler
//! - Structured JSON error responses
//! - Request tracing and body size limit

pub mod error_body;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
