//! Session and identity
//!
//! A [`Session`] is established once per access token: the profile is fetched
//! and the admin flag resolved at that point and then kept for the lifetime of
//! the session. [`SessionManager`] keeps the registry of live sessions and
//! listens to auth events to drop sessions of deleted or changed users.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast::error::RecvError, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AuthEvent, AuthProvider, DataStore},
    errors::TrackerError,
    models::{
        AuthSession, AuthUser, ContactUpdate, Credentials, PasswordChange, PasswordReset,
        Principal, Registration, UserChanges,
    },
};

/// An authenticated principal bound to an access token
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    principal: Principal,
    is_admin: bool,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> Uuid {
        self.principal.user.id
    }

    pub fn display_name(&self) -> String {
        self.principal.display_name()
    }

    /// Admin membership, resolved once when the session was established
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DataStore>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn DataStore>) -> Self {
        Self {
            auth,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Sign in and establish a session
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, TrackerError> {
        credentials.validate()?;

        let auth_session = self.auth.sign_in(credentials).await.map_err(|e| {
            warn!("Login failed for {}: {}", credentials.email, e);
            e
        })?;
        let session = self.establish(auth_session).await;
        info!(
            "User {} signed in (admin: {})",
            session.user_id(),
            session.is_admin()
        );
        Ok(session)
    }

    /// Create a new account; the caller still has to log in
    pub async fn register(&self, registration: &Registration) -> Result<AuthUser, TrackerError> {
        registration.validate()?;

        let taken = self
            .store
            .username_exists(&registration.username)
            .await
            .map_err(|e| {
                error!("Username check error: {}", e);
                TrackerError::Backend("Error checking username availability".to_string())
            })?;
        if taken {
            return Err(TrackerError::Conflict(
                "Username already taken".to_string(),
            ));
        }

        let user = self.auth.sign_up(registration).await?;
        info!("Registered user {} ({})", user.id, registration.username);
        Ok(user)
    }

    pub async fn logout(&self, token: &str) -> Result<(), TrackerError> {
        self.sessions.write().await.remove(token);
        self.auth.sign_out(token).await
    }

    /// Find the session for an access token, restoring it from the auth
    /// provider if this process has not seen it yet
    pub async fn resolve(&self, token: &str) -> Result<Arc<Session>, TrackerError> {
        let cached = self.sessions.read().await.get(token).cloned();
        if let Some(session) = cached {
            if !session.is_expired() {
                return Ok(session);
            }
            debug!("Session for user {} expired", session.user_id());
            self.sessions.write().await.remove(token);
            return Err(TrackerError::Unauthenticated);
        }

        match self.auth.get_session(token).await? {
            Some(auth_session) => Ok(self.establish(auth_session).await),
            None => Err(TrackerError::Unauthenticated),
        }
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), TrackerError> {
        if email.trim().is_empty() {
            return Err(TrackerError::validation("Email is required"));
        }
        self.auth.reset_password_for_email(email.trim()).await
    }

    /// Set a new password from a reset link; existing sessions of the user
    /// are dropped
    pub async fn complete_password_reset(
        &self,
        reset: &PasswordReset,
    ) -> Result<AuthUser, TrackerError> {
        reset.validate()?;
        let user = self
            .auth
            .complete_password_reset(reset.token.trim(), &reset.new_password)
            .await?;
        self.evict_user(user.id).await;
        info!("Password reset for user {}", user.id);
        Ok(user)
    }

    pub async fn change_password(
        &self,
        session: &Session,
        change: &PasswordChange,
    ) -> Result<(), TrackerError> {
        change.validate()?;
        let changes = UserChanges {
            password: Some(change.new_password.clone()),
            ..UserChanges::default()
        };
        self.auth.update_user(session.user_id(), &changes).await?;
        info!("Password updated for user {}", session.user_id());
        Ok(())
    }

    /// Update email and display name; returns the refreshed session
    pub async fn update_contact(
        &self,
        session: &Session,
        update: &ContactUpdate,
    ) -> Result<Arc<Session>, TrackerError> {
        update.validate()?;

        let email = update.email.trim();
        if email != session.principal().user.email {
            let changes = UserChanges {
                email: Some(email.to_string()),
                ..UserChanges::default()
            };
            self.auth.update_user(session.user_id(), &changes).await?;
        }

        if session.principal().profile.is_some() {
            self.store
                .update_profile_name(session.user_id(), update.name.trim())
                .await?;
        }

        self.evict_user(session.user_id()).await;
        self.resolve(session.token()).await
    }

    /// Consume auth events until the provider goes away
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.subscribe();
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Auth event listener lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auth event listener stopped");
        })
    }

    pub(crate) async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::UserDeleted { user_id } | AuthEvent::UserUpdated { user_id } => {
                self.evict_user(user_id).await;
            }
            AuthEvent::SignedIn { user_id } => debug!("Auth state changed: signed in {}", user_id),
            AuthEvent::SignedOut { user_id } => {
                debug!("Auth state changed: signed out {}", user_id)
            }
            AuthEvent::PasswordRecovery { email, .. } => {
                info!("Password recovery started for {}", email)
            }
        }
    }

    /// Periodically drop expired sessions here and in the auth provider
    pub fn sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.prune_expired().await;
                match manager.auth.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!("Purged {} expired tokens", purged),
                    Err(e) => warn!("Failed to purge expired tokens: {}", e),
                }
            }
        })
    }

    /// Forget expired sessions; returns how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        before - sessions.len()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub(crate) async fn evict_user(&self, user_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id() != user_id);
        if sessions.len() != before {
            debug!("Dropped {} cached sessions of user {}", before - sessions.len(), user_id);
        }
    }

    async fn establish(&self, auth_session: AuthSession) -> Arc<Session> {
        let user_id = auth_session.user.id;

        let profile = match self.store.fetch_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                error!("Error fetching profile: {}", e);
                None
            }
        };

        // Absence of an answer means no privilege
        let is_admin = match self.store.is_admin(user_id).await {
            Ok(is_admin) => is_admin,
            Err(e) => {
                warn!("Error checking admin status: {}", e);
                false
            }
        };

        let session = Arc::new(Session {
            token: auth_session.access_token,
            principal: Principal {
                user: auth_session.user,
                profile,
            },
            is_admin,
            expires_at: auth_session.expires_at,
        });
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, cached| !cached.is_expired());
        sessions.insert(session.token.clone(), Arc::clone(&session));
        session
    }
}
