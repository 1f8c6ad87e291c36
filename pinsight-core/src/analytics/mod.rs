//! Analytics module for pinsight
//!
//! Builds the usage summary shown on the dashboard:
//! - Eight grouped aggregations over the event collection
//! - Assembly of their results into one [`Summary`] payload
//! - A deadline-bounded service that owns the store connection

pub mod service;
pub mod summary;

pub use service::{SummaryService, SyncSummaryService};
pub use summary::{
    assemble_summary, generate_summary, round_to_tenth, CancelFlag, DailyActivity,
    EnvironmentEngagement, ErrorPayload, EventTypeCount, FeatureUsage, HourlyActivity,
    PlatformEngagement, SubscriptionStatusStats, Summary, SummaryOptions, UserRetention,
};
