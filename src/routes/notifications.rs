use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::{Event, EventRepository, User};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upcoming", get(upcoming))
}

/// Human-readable start time, e.g. "Monday, March 02 at 03:00 PM". The
/// reminder mails use the same wording.
const FEED_TIME_FORMAT: &str = "%A, %B %d at %I:%M %p";

#[derive(Debug, Serialize)]
struct UpcomingNotification {
    id: i64,
    title: String,
    time: String,
    description: String,
    priority: i64,
}

impl From<&Event> for UpcomingNotification {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            time: event.start_time.format(FEED_TIME_FORMAT).to_string(),
            description: event.description.clone().unwrap_or_default(),
            priority: event.priority,
        }
    }
}

/// Non-silenced events starting within the next seven days that the caller
/// either created or matches by tag.
async fn upcoming(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<UpcomingNotification>>> {
    let now = Utc::now().naive_utc();
    let week_from_now = now + Duration::days(7);

    let events = EventRepository::find_upcoming_between(&state.db, now, week_from_now).await?;
    let feed: Vec<UpcomingNotification> = events
        .iter()
        .filter(|event| visible_in_feed(event, &user))
        .map(UpcomingNotification::from)
        .collect();

    Ok(Json(feed))
}

fn visible_in_feed(event: &Event, user: &User) -> bool {
    if event.creator_id == user.id {
        return true;
    }
    let event_tags: Vec<String> = event
        .tag_list()
        .iter()
        .map(|tag| tag.to_lowercase())
        .collect();
    user.tag_set()
        .iter()
        .any(|tag| event_tags.contains(&tag.to_lowercase()))
}
