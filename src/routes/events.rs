use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{Event, EventRepository, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::calendar::{CalendarService, OccurrenceView};
use crate::services::events::{
    CreateOutcome, DeleteOutcome, EditOutcome, EventService, NewEventRequest, UpdateEventRequest,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_event).get(list_events))
        .route(
            "/:id",
            get(event_detail).put(update_event).delete(delete_event),
        )
        .route("/:id/toggle-notifications", post(toggle_notifications))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    start: Option<String>,
    /// Older clients send `date` instead of `start`.
    date: Option<String>,
    range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteEventQuery {
    scope: Option<String>,
    original_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventDetail {
    id: i64,
    title: String,
    description: Option<String>,
    priority: i64,
    tags: Option<String>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    is_recurring: bool,
    recurrence_group_id: Option<String>,
}

impl From<Event> for EventDetail {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            priority: event.priority,
            tags: event.tags,
            start_time: event.start_time,
            end_time: event.end_time,
            is_recurring: event.is_recurring,
            recurrence_group_id: event.recurrence_group_id,
        }
    }
}

/// Loads an event and enforces the modification rules shared by the detail,
/// edit, delete and toggle handlers.
async fn load_for_modification(
    state: &AppState,
    user: &User,
    event_id: i64,
) -> AppResult<Event> {
    let event = EventRepository::find_by_id(&state.db, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let creator_role = UserRepository::find_by_id(&state.db, event.creator_id)
        .await?
        .map(|creator| creator.role());

    if !EventService::can_modify(user, &event, creator_role) {
        return Err(AppError::Forbidden);
    }
    Ok(event)
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<NewEventRequest>,
) -> AppResult<Json<Value>> {
    match EventService::create(&state.db, &user, request).await? {
        CreateOutcome::Single(event) => Ok(Json(json!({
            "message": "Event created successfully",
            "event_id": event.id,
        }))),
        CreateOutcome::Series {
            recurrence_group_id,
            occurrences,
        } => Ok(Json(json!({
            "message": "Recurring events created successfully",
            "recurrence_group_id": recurrence_group_id,
            "occurrence_count": occurrences,
        }))),
    }
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<Vec<OccurrenceView>>> {
    let start = query.start.as_deref().or(query.date.as_deref());
    let window = CalendarService::derive_window(start, query.range.as_deref())?;
    let occurrences = CalendarService::list_events(&state.db, &user, window).await?;
    Ok(Json(occurrences))
}

async fn event_detail(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<i64>,
) -> AppResult<Json<EventDetail>> {
    let event = load_for_modification(&state, &user, event_id).await?;
    Ok(Json(EventDetail::from(event)))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<i64>,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<Value>> {
    let event = load_for_modification(&state, &user, event_id).await?;

    let message = match EventService::edit(&state.db, &user, &event, request).await? {
        EditOutcome::Occurrence => "This occurrence was updated successfully!",
        EditOutcome::Series => "The event series was updated successfully!",
        EditOutcome::Single => "Event updated successfully.",
    };
    Ok(Json(json!({ "message": message })))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<i64>,
    Query(query): Query<DeleteEventQuery>,
) -> AppResult<Json<Value>> {
    let event = load_for_modification(&state, &user, event_id).await?;

    let message = match EventService::delete(
        &state.db,
        &event,
        query.scope.as_deref(),
        query.original_date.as_deref(),
    )
    .await?
    {
        DeleteOutcome::Series { removed } => format!(
            "All {} occurrences of the recurring event were deleted successfully.",
            removed
        ),
        DeleteOutcome::Occurrence => "This occurrence of the event was deleted.".to_string(),
        DeleteOutcome::Single => "Event deleted successfully.".to_string(),
    };
    Ok(Json(json!({ "message": message })))
}

async fn toggle_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<i64>,
) -> AppResult<Json<Value>> {
    load_for_modification(&state, &user, event_id).await?;

    let silenced = EventRepository::toggle_notifications(&state.db, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    let status = if silenced { "silenced" } else { "enabled" };
    Ok(Json(json!({
        "message": format!("Notifications {} for this event", status),
        "notifications_silenced": silenced,
    })))
}

// ============================================================================
// Tests
// ============================================================================
