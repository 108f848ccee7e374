//! Repository functions over the shared SQLite pool
//!
//! Ids are stored as UUID text and timestamps as RFC3339 text (UTC,
//! microsecond precision) so that lexical order matches time order.
//! Every query that reads or mutates user data is scoped by `user_id`.

pub mod chat;
pub mod drafts;
pub mod meal_plan;
pub mod recipes;
pub mod tokens;
pub mod users;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use mealwise_common::{Error, Result};
use uuid::Uuid;

/// Format a timestamp for storage
pub(crate) fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}

pub(crate) fn date_str(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("Invalid stored date '{}': {}", value, e)))
}

/// Decode a JSON array column, tolerating legacy empty strings
pub(crate) fn parse_string_list(value: &str) -> Result<Vec<String>> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Invalid stored list '{}': {}", value, e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("JSON encode: {}", e)))
}
