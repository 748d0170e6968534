use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::{Rng, RngCore};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};
use whisperwall_config::AuthConfig;

pub mod validation;

pub use validation::{validate_anonymous_id, validate_device_token, validate_display_name};

/// Attempts made to find an unused anonymous id before giving up.
pub const MAX_ANONYMOUS_ID_ATTEMPTS: usize = 5;

/// Sessions never outlive a century; keeps expiry timestamps in four-digit years.
const MAX_SESSION_TTL_SECONDS: u64 = 100 * 365 * 86_400;

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Could not generate a unique anonymous ID after several attempts.")]
    AnonymousIdExhausted,
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user not found")]
    UserNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub anonymous_id: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub device_token: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let ttl_seconds = config.session_ttl_seconds.min(MAX_SESSION_TTL_SECONDS) as i64;
        let session_ttl = Duration::seconds(ttl_seconds);

        Self { pool, session_ttl }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Create a fresh anonymous identity and open a session for it.
    pub async fn register_anonymous(&self) -> Result<(User, AuthSession), AuthError> {
        self.register_with_generator(generate_anonymous_id).await
    }

    async fn register_with_generator<F>(
        &self,
        mut next_id: F,
    ) -> Result<(User, AuthSession), AuthError>
    where
        F: FnMut() -> String,
    {
        for attempt in 1..=MAX_ANONYMOUS_ID_ATTEMPTS {
            let anonymous_id = next_id();
            validate_anonymous_id(&anonymous_id)?;

            let display_name = generate_display_name();
            validate_display_name(&display_name)?;

            match self.insert_user(&anonymous_id, &display_name).await {
                Ok(user) => {
                    let session = self.issue_session(user.id).await?;
                    info!(anonymous_id = %user.anonymous_id, "registered anonymous user");
                    return Ok((user, session));
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    warn!(attempt, "anonymous id collision, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(AuthError::AnonymousIdExhausted)
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.fetch_user(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn find_by_anonymous_id(&self, anonymous_id: &str) -> Result<User, AuthError> {
        validate_anonymous_id(anonymous_id)?;

        let row = sqlx::query(
            "SELECT id, anonymous_id, display_name, device_token, created_at FROM users WHERE anonymous_id = ?",
        )
        .bind(anonymous_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        user_from_row(&row)
    }

    /// Store or clear the push token for a user. Delivery is handled elsewhere.
    pub async fn update_device_token(
        &self,
        user_id: i64,
        device_token: Option<&str>,
    ) -> Result<User, AuthError> {
        if let Some(token) = device_token {
            validate_device_token(token)?;
        }

        let result = sqlx::query("UPDATE users SET device_token = ?, updated_at = ? WHERE id = ?")
            .bind(device_token.map(str::trim))
            .bind(timestamp(Utc::now()))
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }

        debug!(user_id, cleared = device_token.is_none(), "updated device token");
        self.fetch_user(user_id).await
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionNotFound);
        }

        Ok(())
    }

    /// Delete every session whose expiry has passed. Returns the number removed.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = self.generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(timestamp(now))
        .bind(timestamp(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    async fn insert_user(&self, anonymous_id: &str, display_name: &str) -> Result<User, sqlx::Error> {
        let now = timestamp(Utc::now());

        let row = sqlx::query(
            "INSERT INTO users (anonymous_id, display_name, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(anonymous_id)
        .bind(display_name)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            id: row.try_get("id")?,
            anonymous_id: anonymous_id.to_owned(),
            display_name: display_name.to_owned(),
            device_token: None,
            created_at: now,
        })
    }

    async fn fetch_user(&self, id: i64) -> Result<User, AuthError> {
        let row = sqlx::query(
            "SELECT id, anonymous_id, display_name, device_token, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        user_from_row(&row)
    }

    fn generate_session_token(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, AuthError> {
    Ok(User {
        id: row.try_get("id")?,
        anonymous_id: row.try_get("anonymous_id")?,
        display_name: row.try_get("display_name")?,
        device_token: row.try_get("device_token")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Canonical stored form of a timestamp. Fixed precision keeps string comparison in SQL ordered.
pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sixteen lowercase hex characters from eight random bytes.
pub fn generate_anonymous_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn generate_display_name() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("User{suffix}")
}
