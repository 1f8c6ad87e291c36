//! Summary payload and its assembly.
//!
//! A [`Summary`] is built fresh on every request from eight independent
//! aggregations and never persisted. When the store holds no events the
//! aggregations are skipped and [`Summary::empty`] is returned.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::SummaryConfig;
use crate::error::{Error, Result};
use crate::Database;

/// Round to one decimal place, ties to even.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Events and distinct users for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    /// Event type tag
    pub name: String,
    /// Number of events
    pub value: i64,
    pub unique_users: i64,
}

/// Activity for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
    pub unique_users: i64,
}

/// Activity for one UTC hour of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyActivity {
    /// 0-23
    pub hour: u8,
    pub count: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusStats {
    pub status: String,
    pub count: i64,
    pub unique_users: i64,
    /// `None` when no event in the group carries `daysInTrial`
    pub avg_days_in_trial: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEngagement {
    pub platform: String,
    pub count: i64,
    pub unique_users: i64,
    pub browser_count: i64,
    pub device_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUsage {
    pub event_type: String,
    pub subscription_type: String,
    pub count: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentEngagement {
    pub environment: String,
    pub count: i64,
    pub unique_users: i64,
    /// count / unique_users, 0 when there are no users
    pub avg_events_per_user: f64,
}

/// Per-user activity averaged across all users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRetention {
    pub avg_days_active: f64,
    pub avg_events_per_user: f64,
    pub avg_unique_event_types: f64,
    pub total_users: i64,
}

/// The merged output of all eight aggregations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub event_types_distribution: Vec<EventTypeCount>,
    pub events_over_time: Vec<DailyActivity>,
    pub user_activity_by_hour: Vec<HourlyActivity>,
    pub subscription_status: Vec<SubscriptionStatusStats>,
    pub platform_engagement: Vec<PlatformEngagement>,
    pub feature_usage_by_subscription: Vec<FeatureUsage>,
    pub environment_engagement: Vec<EnvironmentEngagement>,
    pub user_retention: UserRetention,
}

impl Summary {
    /// The payload for an empty store: empty lists and an all-zero retention record.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total events, as seen by the event-type distribution.
    pub fn total_events(&self) -> i64 {
        self.event_types_distribution.iter().map(|r| r.value).sum()
    }
}

/// Body handed to the presentation layer when "get summary" fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub details: String,
}

impl ErrorPayload {
    pub const MESSAGE: &'static str = "Failed to fetch analytics data";

    pub fn from_error(err: &Error) -> Self {
        let details = match err {
            Error::AggregationFailed(cause) => cause.clone(),
            other => other.to_string(),
        };
        Self {
            error: Self::MESSAGE.to_string(),
            details,
        }
    }
}

/// Knobs for one summary run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Trailing window for the events-over-time series
    pub window_days: u32,
    /// Bound every aggregation to events at or before the request instant
    pub consistent_snapshot: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            window_days: 7,
            consistent_snapshot: false,
        }
    }
}

impl From<&SummaryConfig> for SummaryOptions {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            window_days: config.window_days,
            consistent_snapshot: config.consistent_snapshot,
        }
    }
}

impl SummaryOptions {
    /// `[now - window_days, now]`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(i64::from(self.window_days)), now)
    }

    pub fn as_of(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.consistent_snapshot.then_some(now)
    }
}

/// Shared flag telling an in-flight assembly to stop between aggregations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, step: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::AggregationFailed(format!(
                "cancelled before {step}"
            )));
        }
        Ok(())
    }
}

/// Assemble a summary against an open database, waiting for any other
/// request on the connection to finish first.
pub fn generate_summary(
    db: &Database,
    now: DateTime<Utc>,
    options: &SummaryOptions,
) -> Result<Summary> {
    let _scope = db.begin_request(|| false);
    assemble_summary(db, now, options, &CancelFlag::default())
}

/// Assemble a summary, giving up between aggregations once `cancel` is set.
///
/// Runs on whatever scope the caller holds; pair `cancel` with the scope's
/// abort check to also stop a statement mid-flight.
pub fn assemble_summary(
    db: &Database,
    now: DateTime<Utc>,
    options: &SummaryOptions,
    cancel: &CancelFlag,
) -> Result<Summary> {
    let as_of = options.as_of(now);

    cancel.check("empty check")?;
    let total = db.count_events(as_of)?;
    if total == 0 {
        tracing::debug!("No events stored, returning empty summary");
        return Ok(Summary::empty());
    }
    tracing::debug!(total, snapshot = as_of.is_some(), "Assembling summary");

    cancel.check("event type distribution")?;
    let event_types_distribution = db.event_type_distribution(as_of)?;
    if let Some(unknown) = event_types_distribution
        .iter()
        .find(|row| !crate::EventType::from(row.name.as_str()).is_known())
    {
        tracing::debug!(event_type = %unknown.name, "Grouping out-of-set event type as-is");
    }

    cancel.check("events over time")?;
    let (start, end) = options.window(now);
    let events_over_time = db.events_over_time(start, end, as_of)?;

    cancel.check("activity by hour")?;
    let user_activity_by_hour = db.activity_by_hour(as_of)?;

    cancel.check("subscription status")?;
    let subscription_status = db.subscription_status_breakdown(as_of)?;

    cancel.check("platform engagement")?;
    let platform_engagement = db.platform_engagement(as_of)?;

    cancel.check("feature usage")?;
    let feature_usage_by_subscription = db.feature_usage_by_subscription(as_of)?;

    cancel.check("environment engagement")?;
    let environment_engagement = db.environment_engagement(as_of)?;

    cancel.check("user retention")?;
    let user_retention = db.user_retention(as_of)?.unwrap_or_default();

    Ok(Summary {
        event_types_distribution,
        events_over_time,
        user_activity_by_hour,
        subscription_status,
        platform_engagement,
        feature_usage_by_subscription,
        environment_engagement,
        user_retention,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(1.0), 1.0);
        assert_eq!(round_to_tenth(11.0 / 3.0), 3.7);
        assert_eq!(round_to_tenth(0.04), 0.0);
        // Halves go to the even neighbour
        assert_eq!(round_to_tenth(1.25), 1.2);
        assert_eq!(round_to_tenth(0.35), 0.4);
        assert_eq!(round_to_tenth(2.5), 2.5);
        assert_eq!(round_to_tenth(-1.25), -1.2);
    }

    #[test]
    fn test_empty_summary_json_shape() {
        let json = serde_json::to_value(Summary::empty()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "eventTypesDistribution": [],
                "eventsOverTime": [],
                "userActivityByHour": [],
                "subscriptionStatus": [],
                "platformEngagement": [],
                "featureUsageBySubscription": [],
                "environmentEngagement": [],
                "userRetention": {
                    "avgDaysActive": 0.0,
                    "avgEventsPerUser": 0.0,
                    "avgUniqueEventTypes": 0.0,
                    "totalUsers": 0
                }
            })
        );
    }

    #[test]
    fn test_options_window_and_snapshot() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let options = SummaryOptions::default();
        let (start, end) = options.window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap());
        assert_eq!(end, now);
        assert_eq!(options.as_of(now), None);

        let options = SummaryOptions {
            consistent_snapshot: true,
            ..options
        };
        assert_eq!(options.as_of(now), Some(now));
    }

    #[test]
    fn test_options_from_config() {
        let config = SummaryConfig {
            window_days: 30,
            consistent_snapshot: true,
            ..Default::default()
        };
        let options = SummaryOptions::from(&config);
        assert_eq!(options.window_days, 30);
        assert!(options.consistent_snapshot);
    }

    #[test]
    fn test_error_payload_hides_wrapping() {
        let payload = ErrorPayload::from_error(&Error::AggregationFailed(
            "database error: disk I/O error".to_string(),
        ));
        assert_eq!(payload.error, "Failed to fetch analytics data");
        assert_eq!(payload.details, "database error: disk I/O error");
    }

    #[test]
    fn test_cancelled_assembly_stops() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let cancel = CancelFlag::default();
        cancel.cancel();

        let err = assemble_summary(&db, Utc::now(), &SummaryOptions::default(), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::AggregationFailed(_)));
    }
}
