//! # pinsight-core
//!
//! Core library for pinsight - usage analytics for a Pinterest research tool.
//!
//! This library provides:
//! - Domain types for tracked user events
//! - Event storage with SQLite
//! - The summary aggregations and their assembly
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use pinsight_core::analytics::{SummaryService, SyncSummaryService};
//! use pinsight_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let service = SummaryService::from_config(&config).expect("invalid config");
//! let service = SyncSummaryService::new(service).expect("failed to start runtime");
//!
//! let summary = service.get_summary().expect("failed to build summary");
//! println!("{} events", summary.total_events());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::EventStore;
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
