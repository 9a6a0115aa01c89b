use sqlx::SqlitePool;

use crate::db::{CreateUser, Role, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::validation::{validate_email, validate_password};

// ============================================================================
// Account registration and credential checks
// ============================================================================

pub struct AuthService;

impl AuthService {
    /// Create an account. Self-registration is limited to the student and
    /// teacher roles; admin accounts are provisioned out of band.
    pub async fn register(
        pool: &SqlitePool,
        email: &str,
        password: &str,
        role: &str,
    ) -> AppResult<User> {
        let email = validate_email(email)
            .ok_or_else(|| AppError::BadRequest("Invalid email format".to_string()))?;

        if !validate_password(password) {
            return Err(AppError::BadRequest(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let role = match Role::from_str(role) {
            Some(role @ (Role::Student | Role::Teacher)) => role,
            _ => return Err(AppError::BadRequest("Invalid role".to_string())),
        };

        if UserRepository::find_by_email(pool, &email).await?.is_some() {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let user = UserRepository::create(
            pool,
            CreateUser {
                email,
                password_hash,
                role,
                profile_tags: None,
            },
        )
        .await?;

        tracing::info!("Registered user {} with role {}", user.id, user.role);
        Ok(user)
    }

    /// Verify credentials. Malformed input fails the same way as a wrong
    /// password so the response does not reveal which part was off.
    pub async fn login(pool: &SqlitePool, email: &str, password: &str) -> AppResult<User> {
        let email = validate_email(email).ok_or(AppError::InvalidCredentials)?;
        if !validate_password(password) {
            return Err(AppError::InvalidCredentials);
        }

        let user = UserRepository::find_by_email(pool, &email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !bcrypt::verify(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        tracing::debug!("User {} logged in", user.id);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let pool = test_pool().await;

        let user = AuthService::register(&pool, " Alice@School.TEST ", "correct horse", "teacher")
            .await
            .unwrap();
        assert_eq!(user.email, "alice@school.test");
        assert_eq!(user.role, "teacher");
        assert_ne!(user.password_hash, "correct horse");

        // Login accepts any casing of the address.
        let logged_in = AuthService::login(&pool, "ALICE@school.test", "correct horse")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let err = AuthService::login(&pool, "alice@school.test", "wrong password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn register_validates_inputs() {
        let pool = test_pool().await;

        let err = AuthService::register(&pool, "not-an-email", "long enough", "student")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid email format"));

        let err = AuthService::register(&pool, "a@school.test", "short", "student")
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::BadRequest(msg) if msg == "Password must be at least 8 characters")
        );

        // Admins cannot self-register; unknown roles are rejected the same way.
        for role in ["admin", "superuser"] {
            let err = AuthService::register(&pool, "a@school.test", "long enough", role)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid role"));
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let pool = test_pool().await;

        AuthService::register(&pool, "a@school.test", "long enough", "student")
            .await
            .unwrap();
        let err = AuthService::register(&pool, "A@SCHOOL.TEST", "long enough", "teacher")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "Email already exists"));
    }

    #[tokio::test]
    async fn login_treats_unknown_user_and_bad_shapes_alike() {
        let pool = test_pool().await;

        for (email, password) in [
            ("nobody@school.test", "long enough"),
            ("not-an-email", "long enough"),
            ("nobody@school.test", "short"),
        ] {
            let err = AuthService::login(&pool, email, password).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
    }
}
