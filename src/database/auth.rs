// src/database/auth.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    backend::{AuthEvent, AuthProvider, AUTH_EVENT_CAPACITY, INVALID_RESET_TOKEN},
    config::SessionConfig,
    errors::TrackerError,
    models::{AuthSession, AuthUser, Credentials, Registration, UserChanges},
};

use super::{
    is_unique_violation,
    models::{SessionRow, UserRow, USER_COLUMNS},
};

const EMAIL_TAKEN: &str = "A user with this email address has already been registered";

/// Password and session authority backed by the `users` and
/// `auth_sessions` tables.
///
/// Passwords are hashed with pgcrypto's bcrypt. Access tokens are random
/// and only their SHA-256 digest is stored.
pub struct PgAuthProvider {
    pool: PgPool,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: chrono::Duration,
    reset_token_ttl: chrono::Duration,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::hours(1))
}

impl PgAuthProvider {
    pub fn new(pool: PgPool, config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            pool,
            events,
            session_ttl: to_chrono(config.ttl),
            reset_token_ttl: to_chrono(config.reset_token_ttl),
        }
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn new_token() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }
}

#[async_trait]
impl AuthProvider for PgAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, TrackerError> {
        let query = format!(
            "UPDATE users SET last_sign_in_at = now()
            WHERE lower(email) = lower($1) AND password_hash = crypt($2, password_hash)
            RETURNING {USER_COLUMNS}"
        );
        let user: Option<UserRow> = sqlx::query_as(&query)
            .bind(credentials.email.trim())
            .bind(&credentials.password)
            .fetch_optional(&self.pool)
            .await?;
        let user = AuthUser::from(user.ok_or(TrackerError::InvalidCredentials)?);

        let access_token = Self::new_token();
        let expires_at = Utc::now() + self.session_ttl;
        sqlx::query(
            "INSERT INTO auth_sessions (token_hash, user_id, expires_at)
            VALUES (encode(digest($1, 'sha256'), 'hex'), $2, $3)",
        )
        .bind(&access_token)
        .bind(user.id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        debug!("Session opened for user {}", user.id);
        self.publish(AuthEvent::SignedIn { user_id: user.id });
        Ok(AuthSession {
            access_token,
            user,
            expires_at,
        })
    }

    async fn sign_up(&self, registration: &Registration) -> Result<AuthUser, TrackerError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO users (email, password_hash)
            VALUES ($1, crypt($2, gen_salt('bf')))
            RETURNING {USER_COLUMNS}"
        );
        let user: UserRow = match sqlx::query_as(&query)
            .bind(registration.email.trim())
            .bind(&registration.password)
            .fetch_one(&mut *tx)
            .await
        {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(TrackerError::Conflict("User already registered".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let user = AuthUser::from(user);

        let result = sqlx::query("INSERT INTO profiles (id, username, name) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(&registration.username)
            .bind(&registration.name)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(TrackerError::Conflict("Username already taken".to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), TrackerError> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "DELETE FROM auth_sessions WHERE token_hash = encode(digest($1, 'sha256'), 'hex')
            RETURNING user_id",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user_id) = user_id {
            self.publish(AuthEvent::SignedOut { user_id });
        }
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<AuthSession>, TrackerError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT u.id, u.email, u.created_at, u.last_sign_in_at, s.expires_at
            FROM auth_sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = encode(digest($1, 'sha256'), 'hex') AND s.expires_at > now()",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_auth_session(access_token)))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &UserChanges,
    ) -> Result<AuthUser, TrackerError> {
        let mut tx = self.pool.begin().await?;

        if let Some(email) = &changes.email {
            let result = sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
                .bind(user_id)
                .bind(email.trim())
                .execute(&mut *tx)
                .await;
            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(TrackerError::Conflict(EMAIL_TAKEN.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(password) = &changes.password {
            sqlx::query("UPDATE users SET password_hash = crypt($2, gen_salt('bf')) WHERE id = $1")
                .bind(user_id)
                .bind(password)
                .execute(&mut *tx)
                .await?;
        }

        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user: Option<UserRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let user = AuthUser::from(user.ok_or(TrackerError::not_found("user", user_id))?);

        tx.commit().await?;
        self.publish(AuthEvent::UserUpdated { user_id });
        Ok(user)
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), TrackerError> {
        let user_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = lower($1)")
                .bind(email.trim())
                .fetch_optional(&self.pool)
                .await?;
        let Some(user_id) = user_id else {
            debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = Self::new_token();
        sqlx::query(
            "INSERT INTO password_resets (token_hash, user_id, expires_at)
            VALUES (encode(digest($1, 'sha256'), 'hex'), $2, $3)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(Utc::now() + self.reset_token_ttl)
        .execute(&self.pool)
        .await?;

        info!("Password reset requested for user {}", user_id);
        self.publish(AuthEvent::PasswordRecovery {
            email: email.to_string(),
            token,
        });
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<AuthUser, TrackerError> {
        // Consumed even when expired
        let row: Option<(Uuid, bool)> = sqlx::query_as(
            "DELETE FROM password_resets
            WHERE token_hash = encode(digest($1, 'sha256'), 'hex')
            RETURNING user_id, expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let user_id = match row {
            Some((user_id, true)) => user_id,
            _ => return Err(TrackerError::validation(INVALID_RESET_TOKEN)),
        };

        let changes = UserChanges {
            password: Some(new_password.to_string()),
            ..UserChanges::default()
        };
        let user = self.update_user(user_id, &changes).await?;
        info!("Password reset completed for user {}", user_id);
        Ok(user)
    }

    async fn purge_expired(&self) -> Result<u64, TrackerError> {
        let sessions = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        let resets = sqlx::query("DELETE FROM password_resets WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(sessions + resets)
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, TrackerError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        let rows: Vec<UserRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AuthUser::from).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), TrackerError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrackerError::not_found("user", user_id));
        }

        info!("Deleted user {}", user_id);
        self.publish(AuthEvent::UserDeleted { user_id });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
