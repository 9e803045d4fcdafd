//! Data models.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TrackerError;
use serde_helpers::*;

/// Status of a voyage
///
/// Stored as free-form text. The three known values get their own variants,
/// anything else is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VoyageStatus {
    InTransit,
    Docked,
    Delayed,
    Other(String),
}

impl VoyageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VoyageStatus::InTransit => "in-transit",
            VoyageStatus::Docked => "docked",
            VoyageStatus::Delayed => "delayed",
            VoyageStatus::Other(s) => s,
        }
    }
}

impl From<String> for VoyageStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "in-transit" => VoyageStatus::InTransit,
            "docked" => VoyageStatus::Docked,
            "delayed" => VoyageStatus::Delayed,
            _ => VoyageStatus::Other(value),
        }
    }
}

impl From<&str> for VoyageStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<VoyageStatus> for String {
    fn from(value: VoyageStatus) -> Self {
        match value {
            VoyageStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for VoyageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status filter for the voyage list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Status(VoyageStatus),
}

impl StatusFilter {
    /// Parse a filter value; absent, empty and `all` select everything
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("all") => StatusFilter::All,
            Some(status) => StatusFilter::Status(VoyageStatus::from(status)),
        }
    }

    pub fn matches(&self, voyage: &Voyage) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Status(status) => voyage.status == *status,
        }
    }

    pub fn apply(&self, voyages: &[Voyage]) -> Vec<Voyage> {
        voyages.iter().filter(|v| self.matches(v)).cloned().collect()
    }
}

/// A tracked vessel trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voyage {
    pub id: Uuid,
    /// Vessel name
    pub name: String,
    /// Vessel identifier code, e.g. `AV-2023-01`
    pub vessel_id: String,
    /// Destination port
    pub destination: String,
    pub eta: DateTime<Utc>,
    pub status: VoyageStatus,
    /// Display name of the submitting user
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

/// Voyage fields as submitted from the add-vessel form
///
/// Blank strings deserialize to `None` so that a missing field and an empty
/// one are rejected the same way.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoyageForm {
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub vessel_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub destination: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub eta_date: Option<String>,
    /// `HH:MM`, defaults to noon
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub eta_time: Option<String>,
}

impl VoyageForm {
    /// Validate the form and turn it into an insertable voyage
    pub fn into_new_voyage(self, added_by: String) -> Result<NewVoyage, TrackerError> {
        let (Some(name), Some(vessel_id), Some(destination), Some(eta_date)) =
            (self.name, self.vessel_id, self.destination, self.eta_date)
        else {
            return Err(TrackerError::validation(
                "Please fill in all required fields",
            ));
        };

        let eta_date = NaiveDate::parse_from_str(&eta_date, "%Y-%m-%d")
            .map_err(|_| TrackerError::validation(format!("Invalid ETA date: {eta_date}")))?;

        let eta_time = match self.eta_time.as_deref() {
            None => NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            Some(time) => NaiveTime::parse_from_str(time, "%H:%M")
                .map_err(|_| TrackerError::validation(format!("Invalid ETA time: {time}")))?,
        };

        Ok(NewVoyage {
            name,
            vessel_id,
            destination,
            eta: eta_date.and_time(eta_time).and_utc(),
            status: VoyageStatus::InTransit,
            added_by,
        })
    }
}

/// A validated voyage ready to be stored; id and `added_at` come from the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewVoyage {
    pub name: String,
    pub vessel_id: String,
    pub destination: String,
    pub eta: DateTime<Utc>,
    pub status: VoyageStatus,
    pub added_by: String,
}

/// Archive entry for a completed voyage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulTrip {
    pub id: Uuid,
    /// Id of the archived voyage
    pub trip_id: Uuid,
    pub vessel_id: String,
    pub vessel_name: String,
    pub destination: String,
    pub arrival_time: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub completion_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSuccessfulTrip {
    pub trip_id: Uuid,
    pub vessel_id: String,
    pub vessel_name: String,
    pub destination: String,
    pub arrival_time: DateTime<Utc>,
    pub user_id: Uuid,
}

impl NewSuccessfulTrip {
    pub fn for_voyage(voyage: &Voyage, user_id: Uuid, arrival_time: DateTime<Utc>) -> Self {
        Self {
            trip_id: voyage.id,
            vessel_id: voyage.vessel_id.clone(),
            vessel_name: voyage.name.clone(),
            destination: voyage.destination.clone(),
            arrival_time,
            user_id,
        }
    }
}

/// Identity issued by the auth provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// A signed-in session as returned by the auth provider
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub name: Option<String>,
}

/// The authenticated user together with its profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub user: AuthUser,
    pub profile: Option<Profile>,
}

impl Principal {
    /// Username if a profile exists, otherwise the local part of the email
    pub fn display_name(&self) -> String {
        if let Some(profile) = &self.profile {
            if !profile.username.is_empty() {
                return profile.username.clone();
            }
        }
        match self.user.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

/// Row of the admin user listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
}

/// Missing fields deserialize empty and are reported by `validate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(TrackerError::validation("Email and password are required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub username: String,
    pub name: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.email.trim().is_empty()
            || self.username.trim().is_empty()
            || self.name.trim().is_empty()
        {
            return Err(TrackerError::validation(
                "Please fill in all required fields",
            ));
        }
        if self.password != self.confirm_password {
            return Err(TrackerError::validation("Passwords don't match"));
        }
        if self.password.chars().count() < 6 {
            return Err(TrackerError::validation(
                "Password must be at least 6 characters long",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.current_password.chars().count() < 6 {
            return Err(TrackerError::validation(
                "Current password must be at least 6 characters.",
            ));
        }
        if self.new_password.chars().count() < 8 {
            return Err(TrackerError::validation(
                "New password must be at least 8 characters.",
            ));
        }
        if self.new_password != self.confirm_password {
            return Err(TrackerError::validation("Passwords don't match"));
        }
        Ok(())
    }
}

/// New password chosen through a reset link
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordReset {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordReset {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.token.trim().is_empty() {
            return Err(TrackerError::validation("Reset token is required"));
        }
        if self.new_password.chars().count() < 8 {
            return Err(TrackerError::validation(
                "New password must be at least 8 characters.",
            ));
        }
        if self.new_password != self.confirm_password {
            return Err(TrackerError::validation("Passwords don't match"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactUpdate {
    pub email: String,
    pub name: String,
    /// Accepted for form compatibility, never stored
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactUpdate {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !looks_like_email(&self.email) {
            return Err(TrackerError::validation(
                "Please enter a valid email address.",
            ));
        }
        if self.name.trim().chars().count() < 2 {
            return Err(TrackerError::validation(
                "Name must be at least 2 characters.",
            ));
        }
        Ok(())
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    }
}

/// Changes applied to an auth user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Custom deserializers
mod serde_helpers {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }))
    }
}
