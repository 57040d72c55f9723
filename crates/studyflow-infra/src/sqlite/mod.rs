//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod schedule;
pub mod workflow;

use chrono::{DateTime, SecondsFormat, Utc};
use studyflow_types::error::RepositoryError;
use studyflow_types::usage::UsageEvent;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form, so stored timestamps compare correctly as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what} JSON: {e}")))
}

/// Append a usage event inside an open transaction.
async fn insert_usage_event(
    conn: &mut sqlx::SqliteConnection,
    event: &UsageEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO usage_events (id, user_id, action_type, metadata, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(event.id.to_string())
    .bind(&event.user_id)
    .bind(&event.action_type)
    .bind(to_json(&event.metadata)?)
    .bind(format_datetime(&event.created_at))
    .execute(conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetimes_sort_as_text() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1500);
        let (a, b) = (format_datetime(&earlier), format_datetime(&later));
        assert_eq!(a, "2026-03-02T09:00:00.000000Z");
        assert!(a < b);
        assert_eq!(parse_datetime(&b).unwrap(), later);
    }
}
