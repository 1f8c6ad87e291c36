//! Database layer for pinsight
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Event insert and lookup
//! - The grouped queries behind every summary section

pub mod aggregations;
pub mod repo;
pub mod schema;

pub use aggregations::UNKNOWN_BUCKET;
pub use repo::{to_db_timestamp, Database, RequestScope};
