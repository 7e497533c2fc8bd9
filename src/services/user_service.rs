use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::{ProfilePatch, User, UserProfile};
use crate::security::password;
use crate::services::message_service::MessageService;

const DEFAULT_STATUS: &str = "Available";

/// Preview of the latest exchange with a contact, shown in the user
/// directory next to each entry.
#[derive(Debug, Clone, Serialize)]
pub struct ContactPreview {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserWithPreview {
    #[serde(flatten)]
    pub user: UserProfile,
    pub last_message: Option<ContactPreview>,
}

pub struct UserService;

impl UserService {
    pub async fn register(
        db: &Pool<Postgres>,
        username: &str,
        email: &str,
        plain_password: &str,
    ) -> AppResult<User> {
        let username = username.trim();
        let email = email.trim().to_lowercase();

        if username.len() < 3 || username.len() > 30 {
            return Err(AppError::BadRequest(
                "Username must be between 3 and 30 characters".into(),
            ));
        }
        if !is_valid_email(&email) {
            return Err(AppError::BadRequest("Invalid email address".into()));
        }

        let taken: Option<(bool, bool)> = sqlx::query_as(
            "SELECT email = $1, username = $2 FROM users WHERE email = $1 OR username = $2 LIMIT 1",
        )
        .bind(&email)
        .bind(username)
        .fetch_optional(db)
        .await?;
        match taken {
            Some((true, _)) => {
                return Err(AppError::Conflict(
                    "A user with this email already exists".into(),
                ))
            }
            Some((_, true)) => {
                return Err(AppError::Conflict("This username is already taken".into()))
            }
            _ => {}
        }

        let password_hash = password::hash_password(plain_password)?;
        let avatar = username
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_else(|| "?".into());

        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, username, email, password_hash, avatar, status, is_online) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(&email)
        .bind(&password_hash)
        .bind(&avatar)
        .bind(DEFAULT_STATUS)
        .fetch_one(db)
        .await;

        // The pre-check races with concurrent registrations; the unique
        // index is the authority.
        result.map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("A user with this email or username already exists".into())
            }
            _ => AppError::Database(e),
        })
    }

    /// Credential check for login. Returns the user marked online.
    pub async fn authenticate(
        db: &Pool<Postgres>,
        email: &str,
        plain_password: &str,
    ) -> AppResult<User> {
        let email = email.trim().to_lowercase();
        let mut user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        password::verify_password(plain_password, &user.password_hash)?;

        Self::set_online(db, user.id).await?;
        user.is_online = true;
        Ok(user)
    }

    pub async fn get_by_id(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn set_online(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_online = TRUE, last_seen = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_offline(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_online = FALSE, last_seen = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// User directory: everyone except the caller, optionally filtered,
    /// each entry annotated with the latest visible message between the
    /// caller and that user.
    pub async fn list(
        db: &Pool<Postgres>,
        caller_id: Uuid,
        search: Option<&str>,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<UserWithPreview>, i64)> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));

        let (total, rows) = match &pattern {
            Some(pattern) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM users \
                     WHERE id <> $1 AND (username ILIKE $2 OR email ILIKE $2)",
                )
                .bind(caller_id)
                .bind(pattern)
                .fetch_one(db)
                .await?;
                let rows = sqlx::query_as::<_, User>(
                    "SELECT * FROM users \
                     WHERE id <> $1 AND (username ILIKE $2 OR email ILIKE $2) \
                     ORDER BY username ASC LIMIT $3 OFFSET $4",
                )
                .bind(caller_id)
                .bind(pattern)
                .bind(limit)
                .bind((page - 1) * limit)
                .fetch_all(db)
                .await?;
                (total, rows)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id <> $1")
                    .bind(caller_id)
                    .fetch_one(db)
                    .await?;
                let rows = sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE id <> $1 \
                     ORDER BY username ASC LIMIT $2 OFFSET $3",
                )
                .bind(caller_id)
                .bind(limit)
                .bind((page - 1) * limit)
                .fetch_all(db)
                .await?;
                (total, rows)
            }
        };

        let mut users = Vec::with_capacity(rows.len());
        for user in rows {
            let room_id = MessageService::room_id(caller_id, user.id);
            let last_message = sqlx::query(
                r#"
                SELECT m.content, m.created_at, u.username AS sender_name
                FROM messages m
                JOIN users u ON u.id = m.sender_id
                WHERE m.room_id = $1 AND m.is_deleted = FALSE
                ORDER BY m.created_at DESC
                LIMIT 1
                "#,
            )
            .bind(&room_id)
            .fetch_optional(db)
            .await?
            .map(|row| ContactPreview {
                content: row.get("content"),
                timestamp: row.get("created_at"),
                sender_name: row.get("sender_name"),
            });

            users.push(UserWithPreview {
                user: user.into(),
                last_message,
            });
        }

        Ok((users, total))
    }

    /// Partial profile update. Changing username or email re-checks
    /// uniqueness against everyone else.
    pub async fn update_profile(
        db: &Pool<Postgres>,
        user_id: Uuid,
        patch: ProfilePatch,
    ) -> AppResult<User> {
        if patch.is_empty() {
            return Err(AppError::BadRequest("No fields to update".into()));
        }

        let username = patch.username.as_deref().map(str::trim);
        let email = patch
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase());

        if let Some(username) = username {
            if username.len() < 3 || username.len() > 30 {
                return Err(AppError::BadRequest(
                    "Username must be between 3 and 30 characters".into(),
                ));
            }
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM users WHERE username = $1 AND id <> $2")
                    .bind(username)
                    .bind(user_id)
                    .fetch_optional(db)
                    .await?;
            if exists.is_some() {
                return Err(AppError::Conflict("This username is already taken".into()));
            }
        }
        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(AppError::BadRequest("Invalid email address".into()));
            }
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND id <> $2")
                    .bind(email)
                    .bind(user_id)
                    .fetch_optional(db)
                    .await?;
            if exists.is_some() {
                return Err(AppError::Conflict(
                    "A user with this email already exists".into(),
                ));
            }
        }

        sqlx::query_as::<_, User>(
            "UPDATE users SET \
               username = COALESCE($2, username), \
               email = COALESCE($3, email), \
               avatar = COALESCE($4, avatar), \
               status = COALESCE($5, status) \
             WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(username)
        .bind(email)
        .bind(&patch.avatar)
        .bind(&patch.status)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
    }
}

/// Structural email check: one `@`, a non-empty local part, a dotted
/// domain and no whitespace. Deliverability is the mail server's job.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@sub.domain.org"));
        assert!(is_valid_email("x@y.co"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@nodot"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("alice@domain."));
        assert!(!is_valid_email("alice @example.com"));
        assert!(!is_valid_email("alice@exa mple.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }
}
