use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Event Models (one row per occurrence; series share a recurrence_group_id)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    /// Comma-separated visibility tags; empty/null means private to the creator.
    pub tags: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_recurring: bool,
    /// Shared by every occurrence generated from one recurring definition.
    pub recurrence_group_id: Option<String>,
    pub notifications_silenced: bool,
    pub creator_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Event {
    /// Event tags as trimmed tokens, empty segments dropped.
    pub fn tag_list(&self) -> Vec<String> {
        match &self.tags {
            Some(tags) => tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn has_tags(&self) -> bool {
        self.tags.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub tags: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_recurring: bool,
    pub recurrence_group_id: Option<String>,
    pub creator_id: i64,
}

/// Event row joined with its creator's role, as returned by the visibility
/// query. The role is needed both for permission checks and calendar output.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VisibleEvent {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub tags: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_recurring: bool,
    pub recurrence_group_id: Option<String>,
    pub notifications_silenced: bool,
    pub creator_id: i64,
    pub creator_role: String,
}
