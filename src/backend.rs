//! Collaborators the tracker talks to: an auth provider and a tabular data store.
//!
//! Both are object safe so services can hold them as `Arc<dyn ..>` and tests
//! can swap in the in-memory implementation.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    errors::TrackerError,
    models::{
        AuthSession, AuthUser, Credentials, NewSuccessfulTrip, NewVoyage, Profile, Registration,
        SuccessfulTrip, UserChanges, Voyage, VoyageStatus,
    },
};

#[cfg(any(test, feature = "memory"))]
pub mod memory;

/// Change notification published by an auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Uuid },
    UserUpdated { user_id: Uuid },
    UserDeleted { user_id: Uuid },
    /// Carries the clear reset token for whoever delivers it to the user
    PasswordRecovery { email: String, token: String },
}

/// Capacity of the auth event channel
pub const AUTH_EVENT_CAPACITY: usize = 64;

pub(crate) const INVALID_RESET_TOKEN: &str = "Reset link is invalid or has expired";

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, TrackerError>;

    /// Create the auth user and its profile
    async fn sign_up(&self, registration: &Registration) -> Result<AuthUser, TrackerError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), TrackerError>;

    /// Look up a live session; `None` if the token is unknown or expired
    async fn get_session(&self, access_token: &str) -> Result<Option<AuthSession>, TrackerError>;

    async fn update_user(
        &self,
        user_id: Uuid,
        changes: &UserChanges,
    ) -> Result<AuthUser, TrackerError>;

    /// Start the password reset flow. Unknown addresses succeed silently.
    async fn reset_password_for_email(&self, email: &str) -> Result<(), TrackerError>;

    /// Consume an unexpired reset token and set the user's new password
    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<AuthUser, TrackerError>;

    /// Drop expired sessions and reset tokens; returns how many were removed
    async fn purge_expired(&self) -> Result<u64, TrackerError>;

    async fn list_users(&self) -> Result<Vec<AuthUser>, TrackerError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), TrackerError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, TrackerError>;

    async fn profiles(&self) -> Result<Vec<Profile>, TrackerError>;

    async fn username_exists(&self, username: &str) -> Result<bool, TrackerError>;

    async fn update_profile_name(&self, user_id: Uuid, name: &str)
        -> Result<Profile, TrackerError>;

    /// All voyage records, newest `added_at` first
    async fn list_trips(&self) -> Result<Vec<Voyage>, TrackerError>;

    async fn get_trip(&self, id: Uuid) -> Result<Option<Voyage>, TrackerError>;

    async fn insert_trip(&self, voyage: &NewVoyage, user_id: Uuid)
        -> Result<Voyage, TrackerError>;

    async fn update_trip_status(
        &self,
        id: Uuid,
        status: &VoyageStatus,
    ) -> Result<Voyage, TrackerError>;

    async fn archived_trip_ids(&self) -> Result<Vec<Uuid>, TrackerError>;

    async fn insert_successful_trip(
        &self,
        trip: &NewSuccessfulTrip,
    ) -> Result<SuccessfulTrip, TrackerError>;

    /// All archive entries, newest `completed_at` first
    async fn list_successful_trips(&self) -> Result<Vec<SuccessfulTrip>, TrackerError>;

    async fn admin_user_ids(&self) -> Result<Vec<Uuid>, TrackerError>;

    async fn add_admin(&self, user_id: Uuid) -> Result<(), TrackerError>;

    async fn remove_admin(&self, user_id: Uuid) -> Result<(), TrackerError>;

    /// Remote `is_admin` predicate
    async fn is_admin(&self, user_id: Uuid) -> Result<bool, TrackerError>;
}
