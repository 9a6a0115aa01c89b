use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use http;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::auth::AuthService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    message: String,
    role: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: i64,
    email: String,
    role: String,
    profile_tags: Option<String>,
    tag_set: Vec<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let tag_set = user.tag_set();
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            profile_tags: user.profile_tags,
            tag_set,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = request.email.filter(|v| !v.is_empty());
    let password = request.password.filter(|v| !v.is_empty());
    let role = request.role.filter(|v| !v.is_empty());
    let (Some(email), Some(password), Some(role)) = (email, password, role) else {
        return Err(AppError::BadRequest("Missing fields".to_string()));
    };

    let user = AuthService::register(&state.db, &email, &password, &role).await?;
    let token = create_jwt(&state, user.id)?;

    tracing::info!("Registered new {} account {}", user.role, user.id);
    Ok(Json(AuthResponse {
        message: "User created successfully".to_string(),
        role: user.role,
        token,
    }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = request.email.filter(|v| !v.is_empty());
    let password = request.password.filter(|v| !v.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::BadRequest("Missing email or password".to_string()));
    };

    let user = AuthService::login(&state.db, &email, &password).await?;
    let token = create_jwt(&state, user.id)?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        role: user.role,
        token,
    }))
}

async fn me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

// ============================================================================
// JWT
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, stringified.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn create_jwt(state: &Arc<AppState>, user_id: i64) -> AppResult<String> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(state.config.jwt.expiration_hours);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> AppResult<User> {
    let claims = decode_jwt(state, token)?;
    let user_id: i64 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;
    UserRepository::find_by_id(&state.db, user_id)
        .await?
        .ok_or(AppError::Unauthorized)
}

// ============================================================================
// Extractor
// ============================================================================

/// Extracts the authenticated user from a `Bearer` token.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(auth_value) = auth_header else {
            tracing::debug!("Missing Authorization header");
            return Err(AppError::Unauthorized);
        };

        if !auth_value.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header is not a Bearer token");
            return Err(AppError::Unauthorized);
        }

        let token = auth_value[7..].trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let user = get_user_from_token(state, token).await?;
        Ok(AuthUser(user))
    }
}

// ============================================================================
// Tests
// ============================================================================
