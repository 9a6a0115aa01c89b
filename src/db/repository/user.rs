use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, role, profile_tags,
                   created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, role, profile_tags,
                   created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, role, profile_tags,
                   created_at, updated_at
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(users)
    }

    pub async fn create(pool: &SqlitePool, new_user: CreateUser) -> AppResult<User> {
        let now = Utc::now().naive_utc();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, role, profile_tags,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, password_hash, role, profile_tags,
                      created_at, updated_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(&new_user.profile_tags)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    pub async fn update_profile_tags(
        pool: &SqlitePool,
        user_id: i64,
        profile_tags: &str,
    ) -> AppResult<User> {
        let now = Utc::now().naive_utc();

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET profile_tags = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, email, password_hash, role, profile_tags,
                      created_at, updated_at
            "#,
        )
        .bind(profile_tags)
        .bind(now)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }
}
