//! Database repository layer
//!
//! Provides the event collection's read and insert operations. The grouped
//! summary queries live in [`super::aggregations`].

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::panic::RefUnwindSafe;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// VM instructions between two abort checks of a running statement.
const ABORT_CHECK_OPS: i32 = 1_000;

/// Keep rows whose timestamp is at or before `?1`, or all rows when `?1` is
/// NULL. Rows with an unparseable timestamp are kept.
pub(crate) const AS_OF_FILTER: &str =
    "(?1 IS NULL OR julianday(timestamp) IS NULL OR julianday(timestamp) <= julianday(?1))";

/// Format a timestamp the way the `events` table stores it.
///
/// Fixed width with millisecond precision and a `Z` suffix, so comparing the
/// text compares the instants.
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Database handle with connection pooling (single connection for now)
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    /// Held for the lifetime of a [`RequestScope`]
    requests: Mutex<()>,
}

/// Exclusive use of the connection by one multi-statement request.
///
/// Scopes are taken one at a time. While a scope is open, every running
/// statement polls its abort check and fails with `SQLITE_INTERRUPT` once the
/// check returns `true`. Statements issued outside any scope while one is
/// open are polled too.
pub struct RequestScope<'a> {
    db: &'a Database,
    _turn: MutexGuard<'a, ()>,
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.db
            .connection()
            .progress_handler(0, None::<fn() -> bool>);
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        // WAL lets the external writer append while summaries are read
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            requests: Mutex::new(()),
        }
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Wait for any other request to finish, then claim the connection.
    ///
    /// `should_abort` only ever stops statements run under this scope.
    pub fn begin_request<F>(&self, should_abort: F) -> RequestScope<'_>
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        let turn = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.connection()
            .progress_handler(ABORT_CHECK_OPS, Some(should_abort));
        RequestScope {
            db: self,
            _turn: turn,
        }
    }

    // ============================================
    // Event operations
    // ============================================

    /// Insert an event
    ///
    /// A missing timestamp is filled in by the store at write time. Inserting
    /// an `eventId` that already exists fails.
    pub fn insert_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_event_with(&conn, event)
    }

    /// Insert multiple events in a transaction
    pub fn insert_events(&self, events: &[Event]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for event in events {
            Self::insert_event_with(&tx, event)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn insert_event_with(conn: &Connection, event: &Event) -> Result<()> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let extra = if event.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&event.extra)?)
        };

        conn.execute(
            r#"
            INSERT INTO events (event_id, event_type, timestamp, user_id, subscription_type,
                                subscription_status, days_in_trial, properties, metadata, extra)
            VALUES (?1, ?2, COALESCE(?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.event_id,
                event.event_type.as_ref().map(EventType::as_str),
                event.timestamp.as_ref().map(to_db_timestamp),
                event.user_id,
                event.subscription_type,
                event.subscription_status,
                event.days_in_trial,
                event.properties.to_string(),
                metadata,
                extra,
            ],
        )?;
        Ok(())
    }

    /// Get an event by ID
    pub fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM events WHERE event_id = ?",
            [event_id],
            Self::row_to_event,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get an event by ID, failing if it does not exist
    pub fn require_event(&self, event_id: &str) -> Result<Event> {
        self.get_event(event_id)?
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))
    }

    /// Count events, optionally only those at or before `as_of`
    pub fn count_events(&self, as_of: Option<DateTime<Utc>>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM events WHERE {AS_OF_FILTER}"),
            [as_of.as_ref().map(to_db_timestamp)],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        let event_type: Option<String> = row.get("event_type")?;
        let timestamp: Option<String> = row.get("timestamp")?;
        let properties: Option<String> = row.get("properties")?;
        let metadata: Option<String> = row.get("metadata")?;
        let extra: Option<String> = row.get("extra")?;

        Ok(Event {
            event_id: row.get("event_id")?,
            event_type: event_type.map(EventType::from),
            timestamp: timestamp
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            user_id: row.get("user_id")?,
            subscription_type: row.get("subscription_type")?,
            subscription_status: row.get("subscription_status")?,
            days_in_trial: row.get("days_in_trial")?,
            properties: properties
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::json!({})),
            metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
            extra: extra
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        })
    }
}
