//! "Get summary": the single read operation exposed to the presentation layer.
//!
//! The service owns the [`EventStore`] and bounds every request with one
//! deadline covering the empty check and all eight aggregations. Each request
//! runs inside its own [`RequestScope`](crate::db::RequestScope); when its
//! deadline passes, its running statement is aborted and the remaining
//! aggregations are skipped. Other requests sharing the connection are not
//! affected.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::summary::{assemble_summary, CancelFlag, Summary, SummaryOptions};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::EventStore;

/// Async summary service
pub struct SummaryService {
    store: EventStore,
    options: SummaryOptions,
    deadline: Duration,
}

impl SummaryService {
    pub fn new(store: EventStore, options: SummaryOptions, deadline: Duration) -> Self {
        Self {
            store,
            options,
            deadline,
        }
    }

    /// Create a service from configuration. The store is not opened until
    /// the first request.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            EventStore::new(&config.store),
            SummaryOptions::from(&config.summary),
            config.summary.deadline(),
        ))
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn options(&self) -> &SummaryOptions {
        &self.options
    }

    /// Assemble the summary as of now.
    pub async fn get_summary(&self) -> Result<Summary> {
        self.get_summary_at(Utc::now()).await
    }

    /// Assemble the summary as of `now`.
    ///
    /// Any failure (store unreachable, query error, deadline) is reported as
    /// [`Error::AggregationFailed`].
    pub async fn get_summary_at(&self, now: DateTime<Utc>) -> Result<Summary> {
        let started = Instant::now();
        let db = self
            .store
            .handle()
            .map_err(Error::into_aggregation_failure)?;

        let cancel = CancelFlag::default();
        let options = self.options;
        let task = {
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                let expired = cancel.clone();
                let _scope = db.begin_request(move || expired.is_cancelled());
                assemble_summary(&db, now, &options, &cancel)
            })
        };

        match tokio::time::timeout(self.deadline, task).await {
            Ok(Ok(Ok(summary))) => {
                tracing::info!(
                    events = summary.total_events(),
                    users = summary.user_retention.total_users,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Summary assembled"
                );
                Ok(summary)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "Summary assembly failed");
                Err(e.into_aggregation_failure())
            }
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "Summary task aborted");
                Err(Error::AggregationFailed(format!(
                    "aggregation task aborted: {join_err}"
                )))
            }
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Summary deadline exceeded, aborting request"
                );
                Err(Error::AggregationFailed(format!(
                    "deadline of {}ms exceeded",
                    self.deadline.as_millis()
                )))
            }
        }
    }

    /// Close the store connection. The next request reopens it.
    pub fn shutdown(&mut self) {
        self.store.shutdown();
    }
}

/// Synchronous wrapper for SummaryService
///
/// Provides blocking methods for use in synchronous code.
pub struct SyncSummaryService {
    inner: SummaryService,
    runtime: tokio::runtime::Runtime,
}

impl SyncSummaryService {
    pub fn new(inner: SummaryService) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::AggregationFailed(format!("failed to create runtime: {}", e)))?;

        Ok(Self { inner, runtime })
    }

    /// Assemble the summary as of now (blocking)
    pub fn get_summary(&self) -> Result<Summary> {
        self.runtime.block_on(self.inner.get_summary())
    }

    /// Assemble the summary as of `now` (blocking)
    pub fn get_summary_at(&self, now: DateTime<Utc>) -> Result<Summary> {
        self.runtime.block_on(self.inner.get_summary_at(now))
    }

    pub fn service(&self) -> &SummaryService {
        &self.inner
    }

    pub fn shutdown(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::ErrorPayload;
    use crate::types::{Event, EventType};
    use crate::Database;

    fn seeded_store() -> EventStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.insert_events(&[
            Event::new(EventType::KeywordSearch, "u1", "free", "trial"),
            Event::new(EventType::ProfileExplorer, "u2", "pro", "active"),
        ])
        .unwrap();
        EventStore::from_database(db)
    }

    #[tokio::test]
    async fn test_get_summary() {
        let service = SummaryService::new(
            seeded_store(),
            SummaryOptions::default(),
            Duration::from_secs(5),
        );

        let summary = service.get_summary().await.unwrap();
        assert_eq!(summary.total_events(), 2);
        assert_eq!(summary.user_retention.total_users, 2);
        assert_eq!(summary.events_over_time.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_aggregation_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        // The database's parent "directory" is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = EventStore::at_path(blocker.join("events.db"), Duration::from_millis(50));
        let service = SummaryService::new(store, SummaryOptions::default(), Duration::from_secs(5));

        let err = service.get_summary().await.unwrap_err();
        let Error::AggregationFailed(details) = err else {
            panic!("expected AggregationFailed");
        };
        assert!(!details.contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_store_location_not_in_error_details() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("private-store-dir");
        std::fs::create_dir(&target).unwrap();
        let store = EventStore::at_path(target, Duration::from_millis(50));
        let service = SummaryService::new(store, SummaryOptions::default(), Duration::from_secs(5));

        let err = service.get_summary().await.unwrap_err();
        let payload = ErrorPayload::from_error(&err);
        assert!(payload.details.starts_with("event store unavailable"));
        assert!(!payload.details.contains("private-store-dir"), "{}", payload.details);
    }

    #[tokio::test]
    async fn test_deadline_while_waiting_for_connection() {
        crate::logging::init_test();
        let store = seeded_store();
        // Another request owns the connection until after the deadline
        let db = store.handle().unwrap();
        let other = db.begin_request(|| false);

        let service = SummaryService::new(store, SummaryOptions::default(), Duration::from_millis(50));
        let err = service.get_summary().await.unwrap_err();
        drop(other);

        assert!(err.to_string().contains("deadline"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_aborts_running_statement() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        // An endless events source: only an abort ends a scan of it
        db.connection()
            .execute_batch(
                "
                DROP TABLE events;
                CREATE VIEW events AS
                    WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n)
                    SELECT 'e' || x AS event_id, 'keyword_search' AS event_type,
                           '2024-03-01T00:00:00.000Z' AS timestamp, 'u' || (x % 10) AS user_id,
                           'free' AS subscription_type, 'trial' AS subscription_status,
                           NULL AS days_in_trial, '{}' AS properties, NULL AS metadata,
                           NULL AS extra
                    FROM n;
                ",
            )
            .unwrap();
        let store = EventStore::from_database(db);
        let db = store.handle().unwrap();

        let service = SummaryService::new(store, SummaryOptions::default(), Duration::from_millis(100));
        let started = Instant::now();
        let err = service.get_summary().await.unwrap_err();
        assert!(matches!(err, Error::AggregationFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(2));

        // The aborted task releases the connection promptly
        let released = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::task::spawn_blocking(move || drop(db.begin_request(|| false))),
        )
        .await;
        assert!(matches!(released, Ok(Ok(()))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_expired_request_leaves_running_request_alone() {
        let store = seeded_store();
        let db = store.handle().unwrap();

        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let long_running = {
            let db = db.clone();
            std::thread::spawn(move || {
                let _scope = db.begin_request(|| false);
                started_tx.send(()).unwrap();
                let result = db.connection().query_row(
                    "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 2000000)
                     SELECT COUNT(*) FROM n",
                    [],
                    |r| r.get::<_, i64>(0),
                );
                result
            })
        };
        started_rx.recv().unwrap();

        let service = SummaryService::new(store, SummaryOptions::default(), Duration::from_millis(10));
        let err = service.get_summary().await.unwrap_err();
        assert!(err.to_string().contains("deadline"));

        let counted = tokio::task::spawn_blocking(move || long_running.join().unwrap())
            .await
            .unwrap();
        assert_eq!(counted.unwrap(), 2_000_000);

        // Once the expired request's task has had its turn, the next one runs normally
        let count = tokio::task::spawn_blocking(move || {
            let _scope = db.begin_request(|| false);
            db.count_events(None)
        })
        .await
        .unwrap();
        assert_eq!(count.unwrap(), 2);
    }

    #[test]
    fn test_sync_service() {
        let mut service = SyncSummaryService::new(SummaryService::new(
            seeded_store(),
            SummaryOptions::default(),
            Duration::from_secs(5),
        ))
        .unwrap();

        let first = service.get_summary().unwrap();
        let second = service.get_summary_at(Utc::now()).unwrap();
        assert_eq!(first.event_types_distribution, second.event_types_distribution);

        service.shutdown();
        assert!(!service.service().store().is_connected());
    }
}
