use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Notification Models (sent-reminder log; the dedup key for the selector)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    /// Days before the event's start that this reminder covers.
    pub lead_days: i64,
    pub channel: String,
    pub message: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: i64,
    pub event_id: i64,
    pub lead_days: i64,
    pub channel: String,
    pub message: String,
}
