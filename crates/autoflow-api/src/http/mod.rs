//! HTTP/REST API layer for Autoflow.
//!
//! Axum-based REST API at `/api/v1/` with the envelope response format,
//! signed/token-checked inbound events, and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
