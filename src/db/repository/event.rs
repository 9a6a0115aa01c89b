use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

pub struct EventRepository;

impl EventRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, priority, tags, start_time, end_time,
                   is_recurring, recurrence_group_id, notifications_silenced,
                   creator_id, created_at, updated_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    pub async fn insert_occurrence<'e, E>(executor: E, new_event: &CreateEvent) -> AppResult<Event>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (title, description, priority, tags, start_time, end_time,
                                is_recurring, recurrence_group_id, notifications_silenced,
                                creator_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            RETURNING id, title, description, priority, tags, start_time, end_time,
                      is_recurring, recurrence_group_id, notifications_silenced,
                      creator_id, created_at, updated_at
            "#,
        )
        .bind(&new_event.title)
        .bind(&new_event.description)
        .bind(new_event.priority)
        .bind(&new_event.tags)
        .bind(new_event.start_time)
        .bind(new_event.end_time)
        .bind(new_event.is_recurring)
        .bind(&new_event.recurrence_group_id)
        .bind(new_event.creator_id)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// Persist a generated series atomically. A failure on any row rolls the
    /// whole batch back so no partial series is ever visible.
    pub async fn insert_series(
        pool: &SqlitePool,
        occurrences: &[CreateEvent],
    ) -> AppResult<usize> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        for occurrence in occurrences {
            Self::insert_occurrence(&mut *tx, occurrence).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(occurrences.len())
    }

    /// Events the viewer may see, joined with the creator's role.
    ///
    /// Admins see everything; teachers everything not created by a student;
    /// everyone else their own untagged (private) events plus any event whose
    /// tags contain one of the viewer's tags as a substring. The optional
    /// window keeps events overlapping [start, end): start_time < end AND
    /// end_time > start.
    pub async fn find_visible_between(
        pool: &SqlitePool,
        viewer: &User,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> AppResult<Vec<VisibleEvent>> {
        let mut sql = String::from(
            "SELECT e.id, e.title, e.description, e.priority, e.tags, \
             e.start_time, e.end_time, e.is_recurring, e.recurrence_group_id, \
             e.notifications_silenced, e.creator_id, u.role AS creator_role \
             FROM events e \
             JOIN users u ON u.id = e.creator_id",
        );

        let mut clauses: Vec<String> = Vec::new();
        let mut like_patterns: Vec<String> = Vec::new();
        let is_tag_scoped = match viewer.role() {
            Role::Admin => false,
            Role::Teacher => {
                clauses.push("u.role != 'student'".to_string());
                false
            }
            Role::Student => {
                let mut branch =
                    String::from("(e.creator_id = ? AND (e.tags IS NULL OR e.tags = ''))");
                for tag in viewer.tag_set() {
                    branch.push_str(" OR e.tags LIKE ?");
                    like_patterns.push(format!("%{}%", tag));
                }
                clauses.push(format!("({})", branch));
                true
            }
        };

        if window.is_some() {
            clauses.push("e.start_time < ? AND e.end_time > ?".to_string());
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY e.start_time ASC");

        let mut query = sqlx::query_as::<_, VisibleEvent>(&sql);
        if is_tag_scoped {
            query = query.bind(viewer.id);
            for pattern in like_patterns {
                query = query.bind(pattern);
            }
        }
        if let Some((start, end)) = window {
            query = query.bind(end).bind(start);
        }

        let events = query.fetch_all(pool).await.map_err(AppError::Database)?;
        Ok(events)
    }

    /// All members of a recurring series, optionally only those starting at or
    /// after `from` (used by future-scoped edits).
    pub async fn find_group_members(
        pool: &SqlitePool,
        recurrence_group_id: &str,
        from: Option<NaiveDateTime>,
    ) -> AppResult<Vec<Event>> {
        let events = match from {
            Some(from) => {
                sqlx::query_as::<_, Event>(
                    r#"
                    SELECT id, title, description, priority, tags, start_time, end_time,
                           is_recurring, recurrence_group_id, notifications_silenced,
                           creator_id, created_at, updated_at
                    FROM events
                    WHERE recurrence_group_id = ? AND start_time >= ?
                    ORDER BY start_time ASC
                    "#,
                )
                .bind(recurrence_group_id)
                .bind(from)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Event>(
                    r#"
                    SELECT id, title, description, priority, tags, start_time, end_time,
                           is_recurring, recurrence_group_id, notifications_silenced,
                           creator_id, created_at, updated_at
                    FROM events
                    WHERE recurrence_group_id = ?
                    ORDER BY start_time ASC
                    "#,
                )
                .bind(recurrence_group_id)
                .fetch_all(pool)
                .await
            }
        }
        .map_err(AppError::Database)?;

        Ok(events)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_occurrence_row<'e, E>(
        executor: E,
        id: i64,
        title: &str,
        description: Option<&str>,
        priority: i64,
        tags: Option<&str>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE events
            SET title = ?, description = ?, priority = ?, tags = ?,
                start_time = ?, end_time = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(priority)
        .bind(tags)
        .bind(start_time)
        .bind(end_time)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn delete_by_id(pool: &SqlitePool, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Hard-delete every occurrence sharing a recurrence group id.
    pub async fn delete_by_group(pool: &SqlitePool, recurrence_group_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM events WHERE recurrence_group_id = ?")
            .bind(recurrence_group_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Flip the reminder mute flag, returning the new value.
    pub async fn toggle_notifications(pool: &SqlitePool, id: i64) -> AppResult<Option<bool>> {
        let now = Utc::now().naive_utc();

        let row = sqlx::query(
            r#"
            UPDATE events
            SET notifications_silenced = NOT notifications_silenced, updated_at = ?
            WHERE id = ?
            RETURNING notifications_silenced
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(|r| r.get("notifications_silenced")))
    }

    /// Events of one priority starting on `date`, reminders not silenced.
    pub async fn find_due_on(
        pool: &SqlitePool,
        priority: i64,
        date: NaiveDate,
    ) -> AppResult<Vec<Event>> {
        let day_start = date.and_time(chrono::NaiveTime::MIN);
        let day_end = day_start + chrono::Duration::days(1);

        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, priority, tags, start_time, end_time,
                   is_recurring, recurrence_group_id, notifications_silenced,
                   creator_id, created_at, updated_at
            FROM events
            WHERE priority = ? AND notifications_silenced = 0
              AND start_time >= ? AND start_time < ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(priority)
        .bind(day_start)
        .bind(day_end)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(events)
    }

    /// Non-silenced events starting inside [from, to], ordered by start time.
    /// Backs the upcoming-reminders feed.
    pub async fn find_upcoming_between(
        pool: &SqlitePool,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, priority, tags, start_time, end_time,
                   is_recurring, recurrence_group_id, notifications_silenced,
                   creator_id, created_at, updated_at
            FROM events
            WHERE start_time >= ? AND start_time <= ? AND notifications_silenced = 0
            ORDER BY start_time ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(events)
    }
}
