use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Repository (sent-reminder log)
// ============================================================================

pub struct NotificationRepository;

impl NotificationRepository {
    /// Whether a reminder was already recorded for this exact
    /// (user, event, lead time, channel) combination.
    pub async fn exists(
        pool: &SqlitePool,
        user_id: i64,
        event_id: i64,
        lead_days: i64,
        channel: &str,
    ) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = ? AND event_id = ? AND lead_days = ? AND channel = ?
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .bind(lead_days)
        .bind(channel)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    /// Record a sent reminder. Returns false when the unique dedup key
    /// already exists (a concurrent run got there first).
    pub async fn insert_if_absent(
        pool: &SqlitePool,
        notification: &CreateNotification,
    ) -> AppResult<bool> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, event_id, lead_days, channel, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, event_id, lead_days, channel) DO NOTHING
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.event_id)
        .bind(notification.lead_days)
        .bind(&notification.channel)
        .bind(&notification.message)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
