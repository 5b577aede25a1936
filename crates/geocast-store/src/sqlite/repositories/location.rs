//! Location repository over the append-only `locations` table.
//!
//! Rows are only ever inserted or bulk-deleted. The most recent record for a
//! client is the one with the highest `seq`.

use chrono::{SecondsFormat, Utc};
use geocast_core::{PositionReport, RecordId, StoredPosition};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::LocationRow;

/// Location repository, stateless.
pub struct LocationRepo;

impl LocationRepo {
    /// Append a record for `report`, assigning its ID and receive time.
    pub fn insert(conn: &Connection, report: &PositionReport) -> Result<StoredPosition> {
        let id = RecordId::new();
        let received_at = Utc::now();
        let _ = conn.execute(
            "INSERT INTO locations (id, client_id, latitude, longitude, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                report.client_id,
                report.latitude,
                report.longitude,
                received_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ],
        )?;
        let sequence = conn.last_insert_rowid();

        Ok(StoredPosition {
            id,
            sequence,
            client_id: report.client_id.clone(),
            latitude: report.latitude.clone(),
            longitude: report.longitude.clone(),
            received_at,
        })
    }

    /// Most recently inserted record for `client_id`, if any.
    pub fn latest_for_client(conn: &Connection, client_id: &str) -> Result<Option<StoredPosition>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM locations WHERE client_id = ?1 ORDER BY seq DESC LIMIT 1",
                    LocationRow::COLUMNS
                ),
                params![client_id],
                LocationRow::from_row,
            )
            .optional()?;
        row.map(StoredPosition::try_from).transpose()
    }

    /// Total number of stored records.
    pub fn count(conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Number of records for one client.
    pub fn count_for_client(conn: &Connection, client_id: &str) -> Result<u64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Delete every record. Returns the number removed.
    pub fn clear(conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM locations", [])?)
    }
}
