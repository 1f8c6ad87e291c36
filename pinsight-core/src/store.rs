//! Lazily-opened, process-wide handle to the event store.
//!
//! The first call to [`EventStore::handle`] opens the database, applies
//! pragmas and runs migrations. Every later call shares the same handle
//! until [`EventStore::shutdown`] drops it.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::Database;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct EventStore {
    path: Option<PathBuf>,
    busy_timeout: Duration,
    db: OnceCell<Arc<Database>>,
}

impl EventStore {
    /// Store described by configuration (see [`StoreConfig::resolved_path`]).
    pub fn new(config: &StoreConfig) -> Self {
        Self::at_path(config.resolved_path(), config.busy_timeout())
    }

    pub fn at_path(path: PathBuf, busy_timeout: Duration) -> Self {
        Self {
            path: Some(path),
            busy_timeout,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already opened (and migrated) database, e.g. an in-memory one.
    pub fn from_database(db: Database) -> Self {
        Self {
            path: None,
            busy_timeout: Duration::ZERO,
            db: OnceCell::with_value(Arc::new(db)),
        }
    }

    /// Shared database handle, opening it on first use.
    pub fn handle(&self) -> Result<Arc<Database>> {
        self.db
            .get_or_try_init(|| {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| Error::Config("event store has been shut down".to_string()))?;

                let db = Database::open(path, self.busy_timeout)
                    .and_then(|db| {
                        db.migrate()?;
                        Ok(db)
                    })
                    .map_err(|e| {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to open event store");
                        unavailable(e)
                    })?;
                tracing::info!(path = %path.display(), "Opened event store");
                Ok(Arc::new(db))
            })
            .map(Arc::clone)
    }

    pub fn is_connected(&self) -> bool {
        self.db.get().is_some()
    }

    /// Drop the shared handle. Returns whether one was open.
    ///
    /// Outstanding clones keep the connection alive until they are dropped.
    pub fn shutdown(&mut self) -> bool {
        let was_open = self.db.take().is_some();
        if was_open {
            tracing::info!("Closed event store");
        }
        was_open
    }
}

/// Reduce an open failure to a cause that does not name the store location.
///
/// SQLite's open errors append the file path, so only the result code is kept.
fn unavailable(err: Error) -> Error {
    let cause = match err {
        Error::Database(rusqlite::Error::SqliteFailure(code, _)) => code.to_string(),
        Error::Database(_) => "cannot open database".to_string(),
        Error::Io(e) => e.kind().to_string(),
        other => other.to_string(),
    };
    Error::StoreUnavailable(cause)
}
