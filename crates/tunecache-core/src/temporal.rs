//! # Temporal Helpers
//!
//! Cache timestamps are held as `DateTime<Utc>` and written as RFC 3339.
//! Index files produced by earlier deployments stored naive local
//! timestamps (`2024-05-01T12:00:00.123456`, no offset); those are read
//! as local time and converted to UTC so retention keeps working across
//! an upgrade.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 timestamp interpreted
/// in the local time zone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| Some(Utc.from_utc_datetime(&naive)))
}

/// Serde `serialize_with` for RFC 3339 output.
pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&dt.to_rfc3339())
}

/// Serde `deserialize_with` accepting both RFC 3339 and naive timestamps.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp {raw:?}")))
}
