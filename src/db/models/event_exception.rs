use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Event Exception Models (per-occurrence overlay for recurring series)
// ============================================================================

/// Overlay row keyed by (original_event_id, exception_date). A null title
/// marks the occurrence as deleted for display; a non-null title means every
/// field here replaces the base occurrence's field for that date.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventException {
    pub id: i64,
    pub original_event_id: i64,
    /// Date component of the occurrence's original start_time.
    pub exception_date: NaiveDate,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EventException {
    /// A deletion sentinel: all override fields null.
    pub fn is_deletion(&self) -> bool {
        self.title.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertEventException {
    pub original_event_id: i64,
    pub exception_date: NaiveDate,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

impl UpsertEventException {
    /// The all-null sentinel used by "delete this occurrence".
    pub fn deletion(original_event_id: i64, exception_date: NaiveDate) -> Self {
        UpsertEventException {
            original_event_id,
            exception_date,
            title: None,
            description: None,
            priority: None,
            tags: None,
            start_time: None,
            end_time: None,
        }
    }
}
