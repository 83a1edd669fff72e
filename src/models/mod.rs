//! Request and Response models for the shard node API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP query strings and JSON bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{validate_key, validate_value, EntryOptionsQuery};
pub use responses::{ErrorResponse, HealthResponse, StatsResponse, CACHE_MISS_HEADER};
