use std::sync::Arc;

use axum::{extract::State, routing::put, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::UserRepository;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::validation::sanitize_tags;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tags", put(update_tags))
}

#[derive(Debug, Deserialize)]
struct UpdateTagsRequest {
    tags: Option<String>,
}

/// Replaces the caller's profile tags. Tags drive which tagged events the
/// user sees and which reminder mails they receive.
async fn update_tags(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateTagsRequest>,
) -> AppResult<Json<Value>> {
    let tags = sanitize_tags(request.tags.as_deref().unwrap_or(""));
    UserRepository::update_profile_tags(&state.db, user.id, &tags).await?;

    tracing::debug!("User {} replaced profile tags", user.id);
    Ok(Json(json!({
        "message": "Your tags have been updated successfully!"
    })))
}
