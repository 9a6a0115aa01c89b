use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub reminders: ReminderConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (e.g. /api/auth/login)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Whether the reminder worker is enabled.
    pub enabled: bool,
    /// How often (seconds) the worker scans for events due a reminder.
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP relay endpoint that accepts {to, subject, body} POSTs.
    /// When unset, reminder emails are logged instead of sent.
    pub relay_url: Option<String>,
    pub from_address: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/school_calendar.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: match env::var("JWT_SECRET") {
                    Ok(secret) => secret,
                    Err(_) => {
                        // Ephemeral secret: tokens do not survive a restart.
                        tracing::warn!(
                            "JWT_SECRET not set, using a random per-process secret"
                        );
                        generate_random_string(48)
                    }
                },
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            reminders: ReminderConfig {
                enabled: match env::var("REMINDER_WORKER_ENABLED") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => true,
                        "0" | "false" | "no" => false,
                        _ => true,
                    },
                    Err(_) => true,
                },
                poll_interval_seconds: env::var("REMINDER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600u64),
            },
            mail: MailConfig {
                relay_url: env::var("MAIL_RELAY_URL").ok(),
                from_address: env::var("MAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "calendar@school.local".to_string()),
            },
        })
    }
}

/// Random alphanumeric string, used for the ephemeral dev JWT secret.
fn generate_random_string(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/school_calendar.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            reminders: ReminderConfig {
                enabled: true,
                poll_interval_seconds: 3600,
            },
            mail: MailConfig {
                relay_url: None,
                from_address: "calendar@school.local".to_string(),
            },
        }
    }
}
