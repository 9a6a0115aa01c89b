use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{
    CreateEvent, Event, EventExceptionRepository, EventRepository, Role, UpsertEventException,
    User,
};
use crate::error::{AppError, AppResult};
use crate::services::recurrence::{self, RecurrenceRule, RecurrenceUnit};
use crate::validation::{
    clamp_priority, parse_date, parse_datetime, sanitize_tags, sanitize_text,
    MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
};

// ============================================================================
// Request payloads
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct NewEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<String>,
    /// "recurring" materializes a series; anything else creates one event.
    pub event_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub rec_start_date: Option<String>,
    pub rec_ends: Option<String>,
    pub rec_interval: Option<u32>,
    pub rec_unit: Option<String>,
    #[serde(default)]
    pub rec_weekdays: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// "this" | "future" | "all"; only meaningful for recurring events.
    pub edit_scope: Option<String>,
    /// Date of the occurrence being edited, YYYY-MM-DD.
    pub original_date: Option<String>,
}

#[derive(Debug)]
pub enum CreateOutcome {
    Single(Event),
    Series {
        recurrence_group_id: String,
        occurrences: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum EditOutcome {
    /// One occurrence was overridden via an exception row.
    Occurrence,
    /// Every targeted series row was rewritten.
    Series,
    /// A plain single-event update.
    Single,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Occurrence,
    Series { removed: u64 },
    Single,
}

// ============================================================================
// Event Service
// ============================================================================

pub struct EventService;

impl EventService {
    /// Whether `user` may read or change `event`. Admins may touch anything,
    /// teachers anything not created by a student, students only their own.
    pub fn can_modify(user: &User, event: &Event, creator_role: Option<Role>) -> bool {
        match user.role() {
            Role::Admin => true,
            Role::Teacher => creator_role.is_some_and(|role| role != Role::Student),
            Role::Student => event.creator_id == user.id,
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        user: &User,
        request: NewEventRequest,
    ) -> AppResult<CreateOutcome> {
        let title = sanitize_text(request.title.as_deref().unwrap_or(""), MAX_TITLE_LEN);
        if title.is_empty() {
            return Err(AppError::Validation("Event title is required".to_string()));
        }
        let description = non_empty(sanitize_text(
            request.description.as_deref().unwrap_or(""),
            MAX_DESCRIPTION_LEN,
        ));
        // Students cannot attach tags; their events stay private.
        let tags = if user.role() == Role::Student {
            None
        } else {
            non_empty(sanitize_tags(request.tags.as_deref().unwrap_or("")))
        };
        let priority = clamp_priority(request.priority);

        if request.event_type.as_deref() == Some("recurring") {
            Self::create_series(pool, user, request, title, description, tags, priority).await
        } else {
            Self::create_single(pool, user, request, title, description, tags, priority).await
        }
    }

    async fn create_single(
        pool: &SqlitePool,
        user: &User,
        request: NewEventRequest,
        title: String,
        description: Option<String>,
        tags: Option<String>,
        priority: i64,
    ) -> AppResult<CreateOutcome> {
        let (start_time, end_time) = parse_time_pair(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            "Invalid date format. Use YYYY-MM-DDTHH:MM",
        )?;
        if end_time <= start_time {
            return Err(AppError::Validation(
                "End time must be after the start time.".to_string(),
            ));
        }

        let event = EventRepository::insert_occurrence(
            pool,
            &CreateEvent {
                title,
                description,
                priority,
                tags,
                start_time,
                end_time,
                is_recurring: false,
                recurrence_group_id: None,
                creator_id: user.id,
            },
        )
        .await?;

        tracing::info!("Created event {} for user {}", event.id, user.id);
        Ok(CreateOutcome::Single(event))
    }

    async fn create_series(
        pool: &SqlitePool,
        user: &User,
        request: NewEventRequest,
        title: String,
        description: Option<String>,
        tags: Option<String>,
        priority: i64,
    ) -> AppResult<CreateOutcome> {
        let missing = || AppError::Validation("Missing recurring event fields".to_string());
        let rec_start_date = request.rec_start_date.as_deref().ok_or_else(missing)?;
        let rec_ends = request.rec_ends.as_deref().ok_or_else(missing)?;
        let rec_unit = request.rec_unit.as_deref().ok_or_else(missing)?;
        let interval = request.rec_interval.ok_or_else(missing)?;

        let (start_anchor, end_anchor) = parse_time_pair(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            "Invalid recurring event format",
        )?;
        let start_clock = start_anchor.time();
        let end_clock = end_anchor.time();
        if end_clock <= start_clock {
            return Err(AppError::Validation(
                "End time must be after the start time.".to_string(),
            ));
        }

        let start_date = parse_date(rec_start_date)
            .ok_or_else(|| AppError::Validation("Invalid recurring event format".to_string()))?;
        let end_date = parse_date(rec_ends)
            .ok_or_else(|| AppError::Validation("Invalid recurring event format".to_string()))?;
        let unit = RecurrenceUnit::from_str(rec_unit)
            .ok_or_else(|| AppError::Validation("Invalid recurrence unit".to_string()))?;

        let weekdays = if request.rec_weekdays.is_empty() {
            None
        } else {
            Some(
                recurrence::parse_weekday_codes(&request.rec_weekdays)
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            )
        };

        let rule = RecurrenceRule {
            unit,
            interval,
            weekdays,
            start_date,
            end_date,
        };
        let times = recurrence::expand(&rule, start_clock, end_clock)
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let recurrence_group_id = Uuid::new_v4().to_string();
        let occurrences: Vec<CreateEvent> = times
            .iter()
            .map(|t| CreateEvent {
                title: title.clone(),
                description: description.clone(),
                priority,
                tags: tags.clone(),
                start_time: t.start_time,
                end_time: t.end_time,
                is_recurring: true,
                recurrence_group_id: Some(recurrence_group_id.clone()),
                creator_id: user.id,
            })
            .collect();

        let count = EventRepository::insert_series(pool, &occurrences).await?;
        tracing::info!(
            "Created recurring series {} ({} occurrences) for user {}",
            recurrence_group_id,
            count,
            user.id
        );
        Ok(CreateOutcome::Series {
            recurrence_group_id,
            occurrences: count,
        })
    }

    /// Apply an edit to `event`. Recurring events honour `edit_scope`:
    /// "this" records an exception for one date, "future" and "all" rewrite
    /// series rows in lockstep, shifting each row's times by the same amount
    /// the edited occurrence moved. Fields omitted from the payload keep
    /// their current values.
    pub async fn edit(
        pool: &SqlitePool,
        user: &User,
        event: &Event,
        request: UpdateEventRequest,
    ) -> AppResult<EditOutcome> {
        let patch_title = request
            .title
            .as_deref()
            .map(|t| sanitize_text(t, MAX_TITLE_LEN));
        let patch_description = request
            .description
            .as_deref()
            .map(|d| sanitize_text(d, MAX_DESCRIPTION_LEN));
        // Students cannot change tags; treat the field as absent.
        let patch_tags = if user.role() == Role::Student {
            None
        } else {
            request.tags.as_deref().map(sanitize_tags)
        };
        let patch_priority = request.priority.map(|p| clamp_priority(Some(p)));

        let (new_start, new_end) = parse_time_pair(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            "Invalid or missing date format",
        )?;
        if new_end <= new_start {
            return Err(AppError::Validation(
                "End time must be after the start time.".to_string(),
            ));
        }

        let scope = request.edit_scope.as_deref().filter(|_| event.is_recurring);
        match scope {
            Some("this") => {
                let original_date = request
                    .original_date
                    .as_deref()
                    .and_then(parse_date)
                    .ok_or_else(|| {
                        AppError::Validation("Invalid or missing date format".to_string())
                    })?;

                // Resolve every override field so the exception stands alone;
                // a null title would otherwise read as a deletion.
                let existing =
                    EventExceptionRepository::find_for_date(pool, event.id, original_date).await?;
                let existing = existing.filter(|e| !e.is_deletion());
                let current_title = existing
                    .as_ref()
                    .and_then(|e| e.title.clone())
                    .unwrap_or_else(|| event.title.clone());
                let current_description = existing
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .or_else(|| event.description.clone());
                let current_priority = existing
                    .as_ref()
                    .and_then(|e| e.priority)
                    .unwrap_or(event.priority);
                let current_tags = existing
                    .as_ref()
                    .and_then(|e| e.tags.clone())
                    .or_else(|| event.tags.clone());

                EventExceptionRepository::upsert(
                    pool,
                    &UpsertEventException {
                        original_event_id: event.id,
                        exception_date: original_date,
                        title: Some(patch_title.unwrap_or(current_title)),
                        description: patch_description.or(current_description),
                        priority: Some(patch_priority.unwrap_or(current_priority)),
                        tags: patch_tags.or(current_tags),
                        start_time: Some(new_start),
                        end_time: Some(new_end),
                    },
                )
                .await?;

                tracing::info!(
                    "Recorded exception for event {} on {}",
                    event.id,
                    original_date
                );
                Ok(EditOutcome::Occurrence)
            }
            Some(series_scope @ ("future" | "all")) => {
                if new_start.date() != event.start_time.date()
                    || new_end.date() != event.end_time.date()
                {
                    return Err(AppError::Validation(
                        "For recurring events, you can only change the time, not the date."
                            .to_string(),
                    ));
                }

                let Some(group_id) = event.recurrence_group_id.as_deref() else {
                    // Recurring flag without a group id: nothing else to move.
                    return Self::update_single(pool, event, patch_title,
                        patch_description, patch_priority, patch_tags, new_start, new_end)
                        .await
                        .map(|_| EditOutcome::Single);
                };

                let from = if series_scope == "future" {
                    let original_date = request
                        .original_date
                        .as_deref()
                        .and_then(parse_date)
                        .ok_or_else(|| {
                            AppError::Validation("Invalid or missing date format".to_string())
                        })?;
                    Some(original_date.and_time(NaiveTime::MIN))
                } else {
                    None
                };

                // Dates are unchanged, so these deltas are pure time-of-day
                // shifts applied to every targeted row.
                let start_delta = new_start - event.start_time;
                let end_delta = new_end - event.end_time;

                let members = EventRepository::find_group_members(pool, group_id, from).await?;
                let mut tx = pool.begin().await.map_err(AppError::Database)?;
                for member in &members {
                    let title = patch_title.clone().unwrap_or_else(|| member.title.clone());
                    let description = patch_description
                        .clone()
                        .or_else(|| member.description.clone());
                    let priority = patch_priority.unwrap_or(member.priority);
                    let tags = patch_tags.clone().or_else(|| member.tags.clone());
                    EventRepository::update_occurrence_row(
                        &mut *tx,
                        member.id,
                        &title,
                        description.as_deref(),
                        priority,
                        tags.as_deref(),
                        member.start_time + start_delta,
                        member.end_time + end_delta,
                    )
                    .await?;
                }
                tx.commit().await.map_err(AppError::Database)?;

                tracing::info!(
                    "Updated {} occurrence(s) of series {} (scope: {})",
                    members.len(),
                    group_id,
                    series_scope
                );
                Ok(EditOutcome::Series)
            }
            Some(_) => Err(AppError::Validation("Invalid edit scope".to_string())),
            None => {
                Self::update_single(pool, event, patch_title, patch_description,
                    patch_priority, patch_tags, new_start, new_end)
                    .await?;
                Ok(EditOutcome::Single)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_single(
        pool: &SqlitePool,
        event: &Event,
        patch_title: Option<String>,
        patch_description: Option<String>,
        patch_priority: Option<i64>,
        patch_tags: Option<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> AppResult<()> {
        let title = patch_title.unwrap_or_else(|| event.title.clone());
        let description = patch_description.or_else(|| event.description.clone());
        let priority = patch_priority.unwrap_or(event.priority);
        let tags = patch_tags.or_else(|| event.tags.clone());
        EventRepository::update_occurrence_row(
            pool,
            event.id,
            &title,
            description.as_deref(),
            priority,
            tags.as_deref(),
            start_time,
            end_time,
        )
        .await
    }

    /// Delete `event` under the given scope. For recurring events "all"
    /// removes the whole series and "this" records a deletion exception for
    /// one date; everything else removes the single row.
    pub async fn delete(
        pool: &SqlitePool,
        event: &Event,
        scope: Option<&str>,
        original_date: Option<&str>,
    ) -> AppResult<DeleteOutcome> {
        let scope = scope.unwrap_or("single");

        if event.is_recurring && scope == "all" {
            if let Some(group_id) = event.recurrence_group_id.as_deref() {
                let removed = EventRepository::delete_by_group(pool, group_id).await?;
                tracing::info!("Deleted {} occurrence(s) of series {}", removed, group_id);
                return Ok(DeleteOutcome::Series { removed });
            }
            EventRepository::delete_by_id(pool, event.id).await?;
            return Ok(DeleteOutcome::Single);
        }

        if event.is_recurring && scope == "this" {
            // A malformed original_date falls back to the row's own date.
            let exception_date = original_date
                .and_then(parse_date)
                .unwrap_or_else(|| event.start_time.date());
            EventExceptionRepository::upsert(
                pool,
                &UpsertEventException::deletion(event.id, exception_date),
            )
            .await?;
            tracing::info!(
                "Marked occurrence of event {} on {} as deleted",
                event.id,
                exception_date
            );
            return Ok(DeleteOutcome::Occurrence);
        }

        EventRepository::delete_by_id(pool, event.id).await?;
        Ok(DeleteOutcome::Single)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_time_pair(
    start: Option<&str>,
    end: Option<&str>,
    error: &str,
) -> AppResult<(NaiveDateTime, NaiveDateTime)> {
    let start = start
        .and_then(parse_datetime)
        .ok_or_else(|| AppError::Validation(error.to_string()))?;
    let end = end
        .and_then(parse_datetime)
        .ok_or_else(|| AppError::Validation(error.to_string()))?;
    Ok((start, end))
}
