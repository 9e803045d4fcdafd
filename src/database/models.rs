// src/database/models.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AuthSession, AuthUser, Profile, SuccessfulTrip, Voyage, VoyageStatus};

pub(crate) const TRIP_COLUMNS: &str =
    "id, vessel_name, vessel_id, destination, eta, status, added_by, added_at";

pub(crate) const SUCCESSFUL_TRIP_COLUMNS: &str = "id, trip_id, vessel_id, vessel_name, \
     destination, arrival_time, completed_at, completion_notes";

pub(crate) const USER_COLUMNS: &str = "id, email, created_at, last_sign_in_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TripRow {
    id: Uuid,
    vessel_name: String,
    vessel_id: String,
    destination: String,
    eta: DateTime<Utc>,
    status: String, // Free-form text
    added_by: String,
    added_at: DateTime<Utc>,
}

impl From<TripRow> for Voyage {
    fn from(row: TripRow) -> Self {
        Voyage {
            id: row.id,
            name: row.vessel_name,
            vessel_id: row.vessel_id,
            destination: row.destination,
            eta: row.eta,
            status: VoyageStatus::from(row.status),
            added_by: row.added_by,
            added_at: row.added_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SuccessfulTripRow {
    id: Uuid,
    trip_id: Uuid,
    vessel_id: String,
    vessel_name: String,
    destination: String,
    arrival_time: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    completion_notes: Option<String>,
}

impl From<SuccessfulTripRow> for SuccessfulTrip {
    fn from(row: SuccessfulTripRow) -> Self {
        SuccessfulTrip {
            id: row.id,
            trip_id: row.trip_id,
            vessel_id: row.vessel_id,
            vessel_name: row.vessel_name,
            destination: row.destination,
            arrival_time: row.arrival_time,
            completed_at: row.completed_at,
            completion_notes: row.completion_notes,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProfileRow {
    id: Uuid,
    username: String,
    name: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            username: row.username,
            name: row.name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    created_at: DateTime<Utc>,
    last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for AuthUser {
    fn from(row: UserRow) -> Self {
        AuthUser {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
            last_sign_in_at: row.last_sign_in_at,
        }
    }
}

/// Session joined with its user
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    #[sqlx(flatten)]
    user: UserRow,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    pub(crate) fn into_auth_session(self, access_token: &str) -> AuthSession {
        AuthSession {
            access_token: access_token.to_string(),
            user: self.user.into(),
            expires_at: self.expires_at,
        }
    }
}
