use chrono::{Duration, Months, NaiveDateTime, NaiveTime};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{EventException, EventExceptionRepository, EventRepository, User, VisibleEvent};
use crate::error::{AppError, AppResult};
use crate::validation::{parse_date, parse_datetime};

// ============================================================================
// Calendar read side: visibility filter + exception overlay
// ============================================================================

/// One calendar entry as served to clients. For an overridden occurrence the
/// display fields come from the exception while identity fields (id, creator,
/// series linkage) stay those of the stored occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct OccurrenceView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub tags: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub creator_id: i64,
    pub creator_role: String,
    pub is_recurring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_group_id: Option<String>,
    pub is_exception: bool,
    pub notifications_silenced: bool,
}

impl OccurrenceView {
    fn from_base(event: VisibleEvent) -> Self {
        OccurrenceView {
            id: event.id,
            title: event.title,
            description: event.description,
            priority: event.priority,
            tags: event.tags,
            start_time: event.start_time,
            end_time: event.end_time,
            creator_id: event.creator_id,
            creator_role: event.creator_role,
            is_recurring: event.is_recurring,
            recurrence_group_id: event.recurrence_group_id,
            is_exception: false,
            notifications_silenced: event.notifications_silenced,
        }
    }

    fn overridden(event: &VisibleEvent, exception: &EventException) -> Self {
        OccurrenceView {
            id: event.id,
            title: exception.title.clone().unwrap_or_else(|| event.title.clone()),
            description: exception.description.clone(),
            priority: exception.priority.unwrap_or(event.priority),
            tags: exception.tags.clone(),
            start_time: exception.start_time.unwrap_or(event.start_time),
            end_time: exception.end_time.unwrap_or(event.end_time),
            creator_id: event.creator_id,
            creator_role: event.creator_role.clone(),
            is_recurring: event.is_recurring,
            recurrence_group_id: event.recurrence_group_id.clone(),
            is_exception: true,
            notifications_silenced: event.notifications_silenced,
        }
    }
}

pub struct CalendarService;

impl CalendarService {
    /// Turn `?start=...&range=day|week|month` into a concrete window. No
    /// start means no window (all visible events). The start accepts a date
    /// or a datetime; `range` defaults to one calendar month.
    pub fn derive_window(
        start: Option<&str>,
        range: Option<&str>,
    ) -> AppResult<Option<(NaiveDateTime, NaiveDateTime)>> {
        let Some(start_str) = start else {
            return Ok(None);
        };
        let invalid = || AppError::BadRequest("Invalid date format".to_string());

        let start = parse_datetime(start_str)
            .or_else(|| parse_date(start_str).map(|d| d.and_time(NaiveTime::MIN)))
            .ok_or_else(invalid)?;
        let end = match range.unwrap_or("month") {
            "day" => start + Duration::days(1),
            "week" => start + Duration::days(7),
            _ => start.checked_add_months(Months::new(1)).ok_or_else(invalid)?,
        };
        Ok(Some((start, end)))
    }

    /// Events the viewer may see within the window, with per-date exceptions
    /// applied: deleted occurrences are dropped, overridden ones take the
    /// exception's display fields. The exception for a stored occurrence is
    /// looked up by the occurrence's original start date, so an override that
    /// moves an occurrence still follows its original slot through the
    /// window filter.
    pub async fn list_events(
        pool: &SqlitePool,
        viewer: &User,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> AppResult<Vec<OccurrenceView>> {
        let events = EventRepository::find_visible_between(pool, viewer, window).await?;

        let recurring_ids: Vec<i64> = events
            .iter()
            .filter(|e| e.is_recurring)
            .map(|e| e.id)
            .collect();
        let exceptions = EventExceptionRepository::map_for_events(pool, &recurring_ids).await?;

        let mut views = Vec::with_capacity(events.len());
        for event in events {
            if !event.is_recurring {
                views.push(OccurrenceView::from_base(event));
                continue;
            }
            match exceptions.get(&(event.id, event.start_time.date())) {
                Some(exception) if exception.is_deletion() => continue,
                Some(exception) => views.push(OccurrenceView::overridden(&event, exception)),
                None => views.push(OccurrenceView::from_base(event)),
            }
        }
        Ok(views)
    }
}
