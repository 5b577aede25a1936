//! [`LocationStore`] contract and the pooled [`SqliteLocationStore`].
//!
//! Calls are synchronous. Async callers run them on a blocking thread.

use std::path::Path;

use geocast_core::{PositionReport, StoredPosition};
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::LocationRepo;

/// Durable, append-only position storage.
///
/// Implementations must be safe to call from many threads at once.
pub trait LocationStore: Send + Sync {
    /// Persist a new record. Never updates an existing one.
    fn save(&self, report: &PositionReport) -> Result<StoredPosition>;

    /// The most recently saved record for `client_id`.
    ///
    /// A client with no records yields `Ok(None)`.
    fn find_latest_by_client(&self, client_id: &str) -> Result<Option<StoredPosition>>;

    /// Total number of stored records.
    fn count(&self) -> Result<u64>;

    /// Remove every record, returning how many were removed.
    fn clear(&self) -> Result<usize>;
}

/// [`LocationStore`] backed by an `r2d2` pool of `SQLite` connections.
#[derive(Clone)]
pub struct SqliteLocationStore {
    pool: ConnectionPool,
}

impl SqliteLocationStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| StoreError::Unavailable(format!("non-UTF-8 path: {}", path.display())))?;
        let pool = connection::new_file(path, config)?;
        Self::migrated(pool)
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::migrated(pool)
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            debug!(applied, "location store ready");
        }
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl LocationStore for SqliteLocationStore {
    #[instrument(skip_all, fields(client_id = %report.client_id))]
    fn save(&self, report: &PositionReport) -> Result<StoredPosition> {
        let conn = self.conn()?;
        let stored = LocationRepo::insert(&conn, report)?;
        debug!(id = %stored.id, seq = stored.sequence, "position saved");
        Ok(stored)
    }

    fn find_latest_by_client(&self, client_id: &str) -> Result<Option<StoredPosition>> {
        let conn = self.conn()?;
        LocationRepo::latest_for_client(&conn, client_id)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        LocationRepo::count(&conn)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        LocationRepo::clear(&conn)
    }
}
