//! Raw row shapes for the `locations` table.
//!
//! Timestamps are stored as RFC 3339 text. Conversion to
//! [`StoredPosition`] parses them and surfaces bad rows as
//! [`StoreError::Corrupt`].

use chrono::{DateTime, Utc};
use geocast_core::{RecordId, StoredPosition};
use rusqlite::Row;

use crate::errors::StoreError;

/// Raw row from the `locations` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationRow {
    /// Insertion sequence (`seq`).
    pub seq: i64,
    /// Record ID.
    pub id: String,
    /// Client identifier.
    pub client_id: String,
    /// Latitude text.
    pub latitude: String,
    /// Longitude text.
    pub longitude: String,
    /// RFC 3339 receive timestamp.
    pub received_at: String,
}

impl LocationRow {
    /// Column list matching [`LocationRow::from_row`].
    pub const COLUMNS: &'static str = "seq, id, client_id, latitude, longitude, received_at";

    /// Map a row selected with [`LocationRow::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            client_id: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            received_at: row.get(5)?,
        })
    }
}

impl TryFrom<LocationRow> for StoredPosition {
    type Error = StoreError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        let received_at = DateTime::parse_from_rfc3339(&row.received_at)
            .map_err(|e| {
                StoreError::Corrupt(format!(
                    "record {} has invalid received_at {:?}: {e}",
                    row.id, row.received_at
                ))
            })?
            .with_timezone(&Utc);
        Ok(Self {
            id: RecordId::from_string(row.id),
            sequence: row.seq,
            client_id: row.client_id,
            latitude: row.latitude,
            longitude: row.longitude,
            received_at,
        })
    }
}
