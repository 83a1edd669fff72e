//! API Module
//!
//! HTTP handlers and routing for the shard node REST API.
//!
//! # Endpoints
//! - `GET|PUT|DELETE /cache/:key` - Read, store or delete a value
//! - `POST /cache/:key/create` - Store a value only if absent
//! - `POST /cache/:key/refresh` - Restart a sliding window
//! - `GET /stats` - Shard statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
