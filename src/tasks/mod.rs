//! Background Tasks Module
//!
//! Contains background tasks that run periodically during node operation.
//!
//! # Tasks
//! - Eviction: trims the shard back under its byte budget at a fixed interval

mod eviction;

pub use eviction::{spawn_eviction_task, DEFAULT_EVICTION_INTERVAL};
