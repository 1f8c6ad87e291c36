//! Summary aggregation queries
//!
//! Each query is a single grouped statement over the `events` table and a
//! pure function of its contents. Every ordering ends with the grouping key
//! so identical data always yields identical rows.
//!
//! All queries accept an optional `as_of` bound; when set, only events at or
//! before that instant are considered.
//!
//! Missing categorical values are grouped under [`UNKNOWN_BUCKET`]. Events
//! whose timestamp cannot be parsed are left out of the date, hour and
//! days-active computations only.

use super::repo::{to_db_timestamp, Database, AS_OF_FILTER};
use crate::analytics::{
    round_to_tenth, DailyActivity, EnvironmentEngagement, EventTypeCount, FeatureUsage,
    HourlyActivity, PlatformEngagement, SubscriptionStatusStats, UserRetention,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Group label for events that lack the grouping field.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Milliseconds per day, for whole-day spans.
const MS_PER_DAY: i64 = 86_400_000;

fn as_of_param(as_of: Option<DateTime<Utc>>) -> Option<String> {
    as_of.as_ref().map(to_db_timestamp)
}

impl Database {
    // ============================================
    // Summary Aggregations
    // ============================================

    /// Event count and distinct users per event type.
    pub fn event_type_distribution(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventTypeCount>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT COALESCE(CAST(event_type AS TEXT), ?2) AS type_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users
            FROM events
            WHERE {AS_OF_FILTER}
            GROUP BY type_key
            ORDER BY cnt DESC, type_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(params![as_of_param(as_of), UNKNOWN_BUCKET], |row| {
                Ok(EventTypeCount {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    unique_users: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Daily (UTC) event count and distinct users for events in `[start, end]`.
    pub fn events_over_time(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<DailyActivity>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT strftime('%Y-%m-%d', timestamp) AS day_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users
            FROM events
            WHERE {AS_OF_FILTER}
              AND julianday(timestamp) BETWEEN julianday(?2) AND julianday(?3)
              AND strftime('%Y-%m-%d', timestamp) IS NOT NULL
            GROUP BY day_key
            ORDER BY day_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(
                params![
                    as_of_param(as_of),
                    to_db_timestamp(&start),
                    to_db_timestamp(&end)
                ],
                |row| {
                    Ok(DailyActivity {
                        date: row.get(0)?,
                        count: row.get(1)?,
                        unique_users: row.get(2)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Event count and distinct users per UTC hour of day.
    pub fn activity_by_hour(&self, as_of: Option<DateTime<Utc>>) -> Result<Vec<HourlyActivity>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT CAST(strftime('%H', timestamp) AS INTEGER) AS hour_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users
            FROM events
            WHERE {AS_OF_FILTER}
              AND strftime('%H', timestamp) IS NOT NULL
            GROUP BY hour_key
            ORDER BY hour_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map([as_of_param(as_of)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|(hour, _, _)| (0..24).contains(hour))
            .map(|(hour, count, unique_users)| HourlyActivity {
                hour: hour as u8,
                count,
                unique_users,
            })
            .collect())
    }

    /// Count, distinct users and mean `daysInTrial` per subscription status.
    pub fn subscription_status_breakdown(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<SubscriptionStatusStats>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT COALESCE(CAST(subscription_status AS TEXT), ?2) AS status_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users,
                   AVG(days_in_trial) AS avg_trial
            FROM events
            WHERE {AS_OF_FILTER}
            GROUP BY status_key
            ORDER BY cnt DESC, status_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(params![as_of_param(as_of), UNKNOWN_BUCKET], |row| {
                Ok(SubscriptionStatusStats {
                    status: row.get(0)?,
                    count: row.get(1)?,
                    unique_users: row.get(2)?,
                    avg_days_in_trial: row.get::<_, Option<f64>>(3)?.map(round_to_tenth),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Count, distinct users, browsers and devices per `metadata.platform`.
    pub fn platform_engagement(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformEngagement>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT COALESCE(CAST(platform AS TEXT), ?2) AS platform_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users,
                   COUNT(DISTINCT browser) AS browsers,
                   COUNT(DISTINCT device) AS devices
            FROM (
                SELECT user_id,
                       CASE WHEN json_valid(metadata)
                            THEN json_extract(metadata, '$.platform') END AS platform,
                       CASE WHEN json_valid(metadata)
                            THEN json_extract(metadata, '$.browser') END AS browser,
                       CASE WHEN json_valid(metadata)
                            THEN json_extract(metadata, '$.device') END AS device
                FROM events
                WHERE {AS_OF_FILTER}
            )
            GROUP BY platform_key
            ORDER BY cnt DESC, platform_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(params![as_of_param(as_of), UNKNOWN_BUCKET], |row| {
                Ok(PlatformEngagement {
                    platform: row.get(0)?,
                    count: row.get(1)?,
                    unique_users: row.get(2)?,
                    browser_count: row.get(3)?,
                    device_count: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Count and distinct users per (event type, subscription type) pair.
    pub fn feature_usage_by_subscription(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeatureUsage>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT COALESCE(CAST(event_type AS TEXT), ?2) AS type_key,
                   COALESCE(CAST(subscription_type AS TEXT), ?2) AS plan_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users
            FROM events
            WHERE {AS_OF_FILTER}
            GROUP BY type_key, plan_key
            ORDER BY cnt DESC, type_key ASC, plan_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(params![as_of_param(as_of), UNKNOWN_BUCKET], |row| {
                Ok(FeatureUsage {
                    event_type: row.get(0)?,
                    subscription_type: row.get(1)?,
                    count: row.get(2)?,
                    unique_users: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Count, distinct users and events per user for each `metadata.environment`.
    pub fn environment_engagement(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnvironmentEngagement>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT COALESCE(CAST(environment AS TEXT), ?2) AS env_key,
                   COUNT(*) AS cnt,
                   COUNT(DISTINCT user_id) AS users
            FROM (
                SELECT user_id,
                       CASE WHEN json_valid(metadata)
                            THEN json_extract(metadata, '$.environment') END AS environment
                FROM events
                WHERE {AS_OF_FILTER}
            )
            GROUP BY env_key
            ORDER BY cnt DESC, env_key ASC
            "#
        ))?;

        let rows = stmt
            .query_map(params![as_of_param(as_of), UNKNOWN_BUCKET], |row| {
                let count: i64 = row.get(1)?;
                let unique_users: i64 = row.get(2)?;
                let avg_events_per_user = if unique_users == 0 {
                    0.0
                } else {
                    round_to_tenth(count as f64 / unique_users as f64)
                };
                Ok(EnvironmentEngagement {
                    environment: row.get(0)?,
                    count,
                    unique_users,
                    avg_events_per_user,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Per-user activity span and volume, averaged across all users.
    ///
    /// Days active is the whole number of days between a user's first and
    /// last event. Returns `None` when there are no users.
    pub fn user_retention(&self, as_of: Option<DateTime<Utc>>) -> Result<Option<UserRetention>> {
        let conn = self.connection();
        let (avg_days, avg_events, avg_types, total_users): (
            Option<f64>,
            Option<f64>,
            Option<f64>,
            i64,
        ) = conn.query_row(
            &format!(
                r#"
            SELECT AVG(days_active), AVG(event_count), AVG(unique_event_types), COUNT(*)
            FROM (
                SELECT user_id,
                       CAST(ROUND((MAX(julianday(timestamp)) - MIN(julianday(timestamp))) * ?2)
                            AS INTEGER) / ?2 AS days_active,
                       COUNT(*) AS event_count,
                       COUNT(DISTINCT event_type) AS unique_event_types
                FROM events
                WHERE {AS_OF_FILTER}
                  AND user_id IS NOT NULL
                GROUP BY user_id
            )
            "#
            ),
            params![as_of_param(as_of), MS_PER_DAY],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?;

        if total_users == 0 {
            return Ok(None);
        }

        Ok(Some(UserRetention {
            avg_days_active: round_to_tenth(avg_days.unwrap_or(0.0)),
            avg_events_per_user: round_to_tenth(avg_events.unwrap_or(0.0)),
            avg_unique_event_types: round_to_tenth(avg_types.unwrap_or(0.0)),
            total_users,
        }))
    }
}
