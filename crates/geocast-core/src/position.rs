//! Position report types.
//!
//! Coordinates are carried as text and never parsed: precision and format
//! are the reporting client's responsibility. Clients that send JSON numbers
//! instead of strings are accepted and the number token is kept verbatim,
//! so `37.770` stays `"37.770"` rather than being normalised.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::ids::RecordId;

/// One reported location, exactly as a client submitted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    /// Opaque client identifier.
    pub client_id: String,
    /// Latitude as text.
    #[serde(deserialize_with = "coordinate_text")]
    pub latitude: String,
    /// Longitude as text.
    #[serde(deserialize_with = "coordinate_text")]
    pub longitude: String,
}

impl PositionReport {
    /// Build a report from its parts.
    pub fn new(
        client_id: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

/// A persisted position record.
///
/// `sequence` is the store's recency key and is not part of the wire shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPosition {
    /// Identifier assigned on insert.
    pub id: RecordId,
    /// Monotonic insertion sequence.
    #[serde(skip)]
    pub sequence: i64,
    /// Opaque client identifier.
    pub client_id: String,
    /// Latitude as text.
    pub latitude: String,
    /// Longitude as text.
    pub longitude: String,
    /// When the store accepted the record.
    pub received_at: DateTime<Utc>,
}

impl StoredPosition {
    /// The report this record was created from.
    pub fn report(&self) -> PositionReport {
        PositionReport::new(&self.client_id, &self.latitude, &self.longitude)
    }
}

fn coordinate_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    let token = raw.get();
    match token.as_bytes().first() {
        Some(b'"') => serde_json::from_str(token).map_err(D::Error::custom),
        Some(b'-' | b'0'..=b'9') => Ok(token.to_owned()),
        _ => Err(D::Error::custom(format!(
            "expected coordinate as string or number, got {token}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_string_coordinates() {
        let report: PositionReport = serde_json::from_value(json!({
            "clientId": "dev-1",
            "latitude": "37.77",
            "longitude": "-122.41",
        }))
        .unwrap();
        assert_eq!(report, PositionReport::new("dev-1", "37.77", "-122.41"));
    }

    #[test]
    fn deserialize_numeric_coordinates_keeps_text() {
        let report: PositionReport = serde_json::from_str(
            r#"{"clientId":"dev-2","latitude":37.7749,"longitude":-122}"#,
        )
        .unwrap();
        assert_eq!(report.latitude, "37.7749");
        assert_eq!(report.longitude, "-122");
    }

    #[test]
    fn numeric_coordinates_keep_their_token_text() {
        let report: PositionReport = serde_json::from_str(
            r#"{"clientId":"d","latitude":37.770,"longitude":1e2}"#,
        )
        .unwrap();
        assert_eq!((report.latitude.as_str(), report.longitude.as_str()), ("37.770", "1e2"));

        let report: PositionReport =
            serde_json::from_str(r#"{"clientId":"d","latitude":-0.0,"longitude":0}"#).unwrap();
        assert_eq!(report.latitude, "-0.0");
        assert_eq!(report.longitude, "0");
    }

    #[test]
    fn escaped_string_coordinates_are_unescaped() {
        let report: PositionReport =
            serde_json::from_str(r#"{"clientId":"d","latitude":"N\u00b0 1","longitude":"2"}"#)
                .unwrap();
        assert_eq!(report.latitude, "N\u{b0} 1");
    }

    #[test]
    fn coordinates_are_not_validated() {
        let report: PositionReport = serde_json::from_value(json!({
            "clientId": "dev-3",
            "latitude": "north-ish",
            "longitude": "",
        }))
        .unwrap();
        assert_eq!(report.latitude, "north-ish");
        assert!(report.longitude.is_empty());
    }

    #[test]
    fn reject_non_scalar_coordinate() {
        let err = serde_json::from_value::<PositionReport>(json!({
            "clientId": "dev-4",
            "latitude": {"deg": 1},
            "longitude": "0",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("expected coordinate"));
    }

    #[test]
    fn reject_missing_client_id() {
        let result = serde_json::from_value::<PositionReport>(json!({
            "latitude": "1",
            "longitude": "2",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn report_serializes_camel_case() {
        let value = serde_json::to_value(PositionReport::new("a", "1", "2")).unwrap();
        assert_eq!(value, json!({"clientId": "a", "latitude": "1", "longitude": "2"}));
    }

    #[test]
    fn stored_position_wire_shape() {
        let stored = StoredPosition {
            id: RecordId::from("rec_1"),
            sequence: 7,
            client_id: "dev-1".into(),
            latitude: "37.77".into(),
            longitude: "-122.41".into(),
            received_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["id"], "rec_1");
        assert_eq!(value["clientId"], "dev-1");
        assert_eq!(value["latitude"], "37.77");
        assert!(value.get("sequence").is_none());
        assert!(value["receivedAt"].is_string());
        assert_eq!(stored.report(), PositionReport::new("dev-1", "37.77", "-122.41"));
    }
}
