//! In-memory backend.
//!
//! Implements both [`AuthProvider`] and [`DataStore`] over process memory.
//! Used by the test suites and for local runs without PostgreSQL. Passwords
//! are kept as given, so this backend must never hold real accounts.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::{
    backend::{AuthEvent, AuthProvider, DataStore, AUTH_EVENT_CAPACITY, INVALID_RESET_TOKEN},
    errors::TrackerError,
    models::{
        AuthSession, AuthUser, Credentials, NewSuccessfulTrip, NewVoyage, Profile, Registration,
        SuccessfulTrip, UserChanges, Voyage, VoyageStatus,
    },
};

struct UserRecord {
    user: AuthUser,
    password: String,
}

struct TokenRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserRecord>,
    sessions: HashMap<String, TokenRecord>,
    reset_tokens: HashMap<String, TokenRecord>,
    profiles: HashMap<Uuid, Profile>,
    trips: Vec<Voyage>,
    successful_trips: Vec<SuccessfulTrip>,
    admins: HashSet<Uuid>,
}

impl MemoryState {
    fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users
            .values()
            .find(|record| record.user.email.eq_ignore_ascii_case(email.trim()))
    }
}

/// Backend holding all tables in memory
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    failures: Mutex<HashSet<&'static str>>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: chrono::Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_session_ttl(Duration::from_secs(3600))
    }

    pub fn with_session_ttl(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            failures: Mutex::new(HashSet::new()),
            events,
            session_ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    /// Make every later call of `operation` fail with a backend error
    pub async fn fail_on(&self, operation: &'static str) {
        self.failures.lock().await.insert(operation);
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    async fn check(&self, operation: &'static str) -> Result<(), TrackerError> {
        if self.failures.lock().await.contains(operation) {
            return Err(TrackerError::Backend(format!(
                "{operation} failed: backend unavailable"
            )));
        }
        Ok(())
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
impl AuthProvider for MemoryBackend {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, TrackerError> {
        self.check("sign_in").await?;
        let mut state = self.state.write().await;

        let user_id = match state.user_by_email(&credentials.email) {
            Some(record) if record.password == credentials.password => record.user.id,
            _ => return Err(TrackerError::InvalidCredentials),
        };

        let now = Utc::now();
        let user = {
            let record = state
                .users
                .get_mut(&user_id)
                .ok_or(TrackerError::InvalidCredentials)?;
            record.user.last_sign_in_at = Some(now);
            record.user.clone()
        };

        let access_token = Self::new_token();
        let expires_at = now + self.session_ttl;
        state.sessions.insert(
            access_token.clone(),
            TokenRecord {
                user_id,
                expires_at,
            },
        );
        drop(state);

        self.publish(AuthEvent::SignedIn { user_id });
        Ok(AuthSession {
            access_token,
            user,
            expires_at,
        })
    }

    async fn sign_up(&self, registration: &Registration) -> Result<AuthUser, TrackerError> {
        self.check("sign_up").await?;
        let mut state = self.state.write().await;

        if state.user_by_email(&registration.email).is_some() {
            return Err(TrackerError::Conflict("User already registered".to_string()));
        }
        if state
            .profiles
            .values()
            .any(|p| p.username == registration.username)
        {
            return Err(TrackerError::Conflict("Username already taken".to_string()));
        }

        let user = AuthUser {
            id: Uuid::new_v4(),
            email: registration.email.trim().to_string(),
            created_at: Utc::now(),
            last_sign_in_at: None,
        };
        state.profiles.insert(
            user.id,
            Profile {
                id: user.id,
                username: registration.username.clone(),
                name: Some(registration.name.clone()),
            },
        );
        state.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password: registration.password.clone(),
            },
        );

        Ok(user)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), TrackerError> {
        self.check("sign_out").await?;
        let removed = self.state.write().await.sessions.remove(access_token);
        if let Some(record) = removed {
            self.publish(AuthEvent::SignedOut {
                user_id: record.user_id,
            });
        }
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<AuthSession>, TrackerError> {
        self.check("get_session").await?;
        let mut state = self.state.write().await;

        let (user_id, expires_at) = match state.sessions.get(access_token) {
            Some(record) => (record.user_id, record.expires_at),
            None => return Ok(None),
        };
        if expires_at <= Utc::now() {
            state.sessions.remove(access_token);
            return Ok(None);
        }

        Ok(state.users.get(&user_id).map(|record| AuthSession {
            access_token: access_token.to_string(),
            user: record.user.clone(),
            expires_at,
        }))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &UserChanges,
    ) -> Result<AuthUser, TrackerError> {
        self.check("update_user").await?;
        let mut state = self.state.write().await;

        if let Some(email) = &changes.email {
            if let Some(other) = state.user_by_email(email) {
                if other.user.id != user_id {
                    return Err(TrackerError::Conflict(
                        "A user with this email address has already been registered".to_string(),
                    ));
                }
            }
        }

        let record = state
            .users
            .get_mut(&user_id)
            .ok_or(TrackerError::not_found("user", user_id))?;
        if let Some(email) = &changes.email {
            record.user.email = email.trim().to_string();
        }
        if let Some(password) = &changes.password {
            record.password = password.clone();
        }
        let user = record.user.clone();
        drop(state);

        self.publish(AuthEvent::UserUpdated { user_id });
        Ok(user)
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), TrackerError> {
        self.check("reset_password_for_email").await?;
        let mut state = self.state.write().await;

        let Some(user_id) = state.user_by_email(email).map(|r| r.user.id) else {
            return Ok(());
        };
        let token = Self::new_token();
        state.reset_tokens.insert(
            token.clone(),
            TokenRecord {
                user_id,
                expires_at: Utc::now() + self.session_ttl,
            },
        );
        drop(state);

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
        self.check("complete_password_reset").await?;
        let record = self.state.write().await.reset_tokens.remove(token);
        let user_id = match record {
            Some(record) if record.expires_at > Utc::now() => record.user_id,
            _ => return Err(TrackerError::validation(INVALID_RESET_TOKEN)),
        };

        let changes = UserChanges {
            password: Some(new_password.to_string()),
            ..UserChanges::default()
        };
        self.update_user(user_id, &changes).await
    }

    async fn purge_expired(&self) -> Result<u64, TrackerError> {
        self.check("purge_expired").await?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        let before = state.sessions.len() + state.reset_tokens.len();
        state.sessions.retain(|_, record| record.expires_at > now);
        state.reset_tokens.retain(|_, record| record.expires_at > now);
        Ok((before - state.sessions.len() - state.reset_tokens.len()) as u64)
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, TrackerError> {
        self.check("list_users").await?;
        let state = self.state.read().await;
        let mut users: Vec<AuthUser> = state.users.values().map(|r| r.user.clone()).collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), TrackerError> {
        self.check("delete_user").await?;
        let mut state = self.state.write().await;

        if state.users.remove(&user_id).is_none() {
            return Err(TrackerError::not_found("user", user_id));
        }
        state.sessions.retain(|_, record| record.user_id != user_id);
        state.reset_tokens.retain(|_, record| record.user_id != user_id);
        state.profiles.remove(&user_id);
        state.admins.remove(&user_id);
        drop(state);

        self.publish(AuthEvent::UserDeleted { user_id });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, TrackerError> {
        self.check("fetch_profile").await?;
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn profiles(&self) -> Result<Vec<Profile>, TrackerError> {
        self.check("profiles").await?;
        Ok(self.state.read().await.profiles.values().cloned().collect())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, TrackerError> {
        self.check("username_exists").await?;
        Ok(self
            .state
            .read()
            .await
            .profiles
            .values()
            .any(|p| p.username == username))
    }

    async fn update_profile_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Profile, TrackerError> {
        self.check("update_profile_name").await?;
        let mut state = self.state.write().await;
        let profile = state
            .profiles
            .get_mut(&user_id)
            .ok_or(TrackerError::not_found("profile", user_id))?;
        profile.name = Some(name.to_string());
        Ok(profile.clone())
    }

    async fn list_trips(&self) -> Result<Vec<Voyage>, TrackerError> {
        self.check("list_trips").await?;
        let state = self.state.read().await;
        // Reverse first so that equal timestamps keep the latest insert on top
        let mut trips: Vec<Voyage> = state.trips.iter().rev().cloned().collect();
        trips.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(trips)
    }

    async fn get_trip(&self, id: Uuid) -> Result<Option<Voyage>, TrackerError> {
        self.check("get_trip").await?;
        Ok(self
            .state
            .read()
            .await
            .trips
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn insert_trip(
        &self,
        voyage: &NewVoyage,
        _user_id: Uuid,
    ) -> Result<Voyage, TrackerError> {
        self.check("insert_trip").await?;
        let trip = Voyage {
            id: Uuid::new_v4(),
            name: voyage.name.clone(),
            vessel_id: voyage.vessel_id.clone(),
            destination: voyage.destination.clone(),
            eta: voyage.eta,
            status: voyage.status.clone(),
            added_by: voyage.added_by.clone(),
            added_at: Utc::now(),
        };
        self.state.write().await.trips.push(trip.clone());
        Ok(trip)
    }

    async fn update_trip_status(
        &self,
        id: Uuid,
        status: &VoyageStatus,
    ) -> Result<Voyage, TrackerError> {
        self.check("update_trip_status").await?;
        let mut state = self.state.write().await;
        let trip = state
            .trips
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TrackerError::not_found("voyage", id))?;
        trip.status = status.clone();
        Ok(trip.clone())
    }

    async fn archived_trip_ids(&self) -> Result<Vec<Uuid>, TrackerError> {
        self.check("archived_trip_ids").await?;
        Ok(self
            .state
            .read()
            .await
            .successful_trips
            .iter()
            .map(|t| t.trip_id)
            .collect())
    }

    async fn insert_successful_trip(
        &self,
        trip: &NewSuccessfulTrip,
    ) -> Result<SuccessfulTrip, TrackerError> {
        self.check("insert_successful_trip").await?;
        let mut state = self.state.write().await;

        if !state.trips.iter().any(|t| t.id == trip.trip_id) {
            return Err(TrackerError::not_found("voyage", trip.trip_id));
        }
        if state
            .successful_trips
            .iter()
            .any(|t| t.trip_id == trip.trip_id)
        {
            return Err(TrackerError::Conflict(
                "Voyage has already been archived".to_string(),
            ));
        }

        let entry = SuccessfulTrip {
            id: Uuid::new_v4(),
            trip_id: trip.trip_id,
            vessel_id: trip.vessel_id.clone(),
            vessel_name: trip.vessel_name.clone(),
            destination: trip.destination.clone(),
            arrival_time: trip.arrival_time,
            completed_at: Utc::now(),
            completion_notes: None,
        };
        state.successful_trips.push(entry.clone());
        Ok(entry)
    }

    async fn list_successful_trips(&self) -> Result<Vec<SuccessfulTrip>, TrackerError> {
        self.check("list_successful_trips").await?;
        let state = self.state.read().await;
        let mut trips: Vec<SuccessfulTrip> =
            state.successful_trips.iter().rev().cloned().collect();
        trips.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(trips)
    }

    async fn admin_user_ids(&self) -> Result<Vec<Uuid>, TrackerError> {
        self.check("admin_user_ids").await?;
        Ok(self.state.read().await.admins.iter().copied().collect())
    }

    async fn add_admin(&self, user_id: Uuid) -> Result<(), TrackerError> {
        self.check("add_admin").await?;
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(TrackerError::not_found("user", user_id));
        }
        if !state.admins.insert(user_id) {
            return Err(TrackerError::Conflict("User is already an admin".to_string()));
        }
        Ok(())
    }

    async fn remove_admin(&self, user_id: Uuid) -> Result<(), TrackerError> {
        self.check("remove_admin").await?;
        self.state.write().await.admins.remove(&user_id);
        Ok(())
    }

    async fn is_admin(&self, user_id: Uuid) -> Result<bool, TrackerError> {
        self.check("is_admin").await?;
        Ok(self.state.read().await.admins.contains(&user_id))
    }
}
