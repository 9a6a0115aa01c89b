use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Exception Repository
// ============================================================================

pub struct EventExceptionRepository;

impl EventExceptionRepository {
    /// Create or replace the overlay for (original_event_id, exception_date).
    /// Last write wins; repeated identical calls leave a single row.
    pub async fn upsert(
        pool: &SqlitePool,
        exception: &UpsertEventException,
    ) -> AppResult<EventException> {
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, EventException>(
            r#"
            INSERT INTO event_exceptions (
                original_event_id, exception_date, title, description, priority,
                tags, start_time, end_time, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(original_event_id, exception_date) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                priority = excluded.priority,
                tags = excluded.tags,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                updated_at = excluded.updated_at
            RETURNING id, original_event_id, exception_date, title, description,
                      priority, tags, start_time, end_time, created_at, updated_at
            "#,
        )
        .bind(exception.original_event_id)
        .bind(exception.exception_date)
        .bind(&exception.title)
        .bind(&exception.description)
        .bind(exception.priority)
        .bind(&exception.tags)
        .bind(exception.start_time)
        .bind(exception.end_time)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_for_date(
        pool: &SqlitePool,
        original_event_id: i64,
        exception_date: NaiveDate,
    ) -> AppResult<Option<EventException>> {
        let row = sqlx::query_as::<_, EventException>(
            r#"
            SELECT id, original_event_id, exception_date, title, description,
                   priority, tags, start_time, end_time, created_at, updated_at
            FROM event_exceptions
            WHERE original_event_id = ? AND exception_date = ?
            "#,
        )
        .bind(original_event_id)
        .bind(exception_date)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Bulk-fetch exceptions for a set of occurrence ids, keyed by
    /// (original_event_id, exception_date) for merge-time lookup.
    pub async fn map_for_events(
        pool: &SqlitePool,
        event_ids: &[i64],
    ) -> AppResult<HashMap<(i64, NaiveDate), EventException>> {
        if event_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; event_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, original_event_id, exception_date, title, description, \
             priority, tags, start_time, end_time, created_at, updated_at \
             FROM event_exceptions \
             WHERE original_event_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, EventException>(&sql);
        for id in event_ids {
            query = query.bind(*id);
        }

        let rows = query.fetch_all(pool).await.map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|exc| ((exc.original_event_id, exc.exception_date), exc))
            .collect())
    }
}
