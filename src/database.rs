// src/database.rs
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    backend::DataStore,
    config::DatabaseConfig,
    errors::TrackerError,
    models::{NewSuccessfulTrip, NewVoyage, Profile, SuccessfulTrip, Voyage, VoyageStatus},
};

pub mod auth;
mod models;

use models::{ProfileRow, SuccessfulTripRow, TripRow, SUCCESSFUL_TRIP_COLUMNS, TRIP_COLUMNS};

pub use auth::PgAuthProvider;

/// PostgreSQL backed data store
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database and apply pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        info!(
            "Connecting to database, max_connections={}",
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                e
            })?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations
    pub async fn new(pool: PgPool) -> Result<Self, TrackerError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Violated unique constraint, if that is what the error is
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl DataStore for Database {
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, TrackerError> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT id, username, name FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Profile::from))
    }

    async fn profiles(&self) -> Result<Vec<Profile>, TrackerError> {
        let rows: Vec<ProfileRow> = sqlx::query_as("SELECT id, username, name FROM profiles")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, TrackerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn update_profile_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Profile, TrackerError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "UPDATE profiles SET name = $2 WHERE id = $1 RETURNING id, username, name",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::from)
            .ok_or_else(|| TrackerError::not_found("profile", user_id))
    }

    async fn list_trips(&self) -> Result<Vec<Voyage>, TrackerError> {
        let query = format!("SELECT {TRIP_COLUMNS} FROM all_trips ORDER BY added_at DESC");
        let rows: Vec<TripRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        debug!("Fetched {} trips", rows.len());
        Ok(rows.into_iter().map(Voyage::from).collect())
    }

    async fn get_trip(&self, id: Uuid) -> Result<Option<Voyage>, TrackerError> {
        let query = format!("SELECT {TRIP_COLUMNS} FROM all_trips WHERE id = $1");
        let row: Option<TripRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Voyage::from))
    }

    async fn insert_trip(
        &self,
        voyage: &NewVoyage,
        user_id: Uuid,
    ) -> Result<Voyage, TrackerError> {
        let query = format!(
            "INSERT INTO all_trips (
                vessel_name, vessel_id, destination, eta, status, added_by, user_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TRIP_COLUMNS}"
        );
        let row: TripRow = sqlx::query_as(&query)
            .bind(&voyage.name)
            .bind(&voyage.vessel_id)
            .bind(&voyage.destination)
            .bind(voyage.eta)
            .bind(voyage.status.as_str())
            .bind(&voyage.added_by)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_trip_status(
        &self,
        id: Uuid,
        status: &VoyageStatus,
    ) -> Result<Voyage, TrackerError> {
        let query =
            format!("UPDATE all_trips SET status = $2 WHERE id = $1 RETURNING {TRIP_COLUMNS}");
        let row: Option<TripRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Voyage::from)
            .ok_or_else(|| TrackerError::not_found("voyage", id))
    }

    async fn archived_trip_ids(&self) -> Result<Vec<Uuid>, TrackerError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT trip_id FROM successful_trips")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn insert_successful_trip(
        &self,
        trip: &NewSuccessfulTrip,
    ) -> Result<SuccessfulTrip, TrackerError> {
        let query = format!(
            "INSERT INTO successful_trips (
                trip_id, vessel_id, vessel_name, destination, arrival_time, user_id
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SUCCESSFUL_TRIP_COLUMNS}"
        );
        let result: Result<SuccessfulTripRow, sqlx::Error> = sqlx::query_as(&query)
            .bind(trip.trip_id)
            .bind(&trip.vessel_id)
            .bind(&trip.vessel_name)
            .bind(&trip.destination)
            .bind(trip.arrival_time)
            .bind(trip.user_id)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(e) if is_unique_violation(&e) => Err(TrackerError::Conflict(
                "This trip has already been marked as successful".to_string(),
            )),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(TrackerError::not_found("voyage", trip.trip_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_successful_trips(&self) -> Result<Vec<SuccessfulTrip>, TrackerError> {
        let query = format!(
            "SELECT {SUCCESSFUL_TRIP_COLUMNS} FROM successful_trips ORDER BY completed_at DESC"
        );
        let rows: Vec<SuccessfulTripRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(SuccessfulTrip::from).collect())
    }

    async fn admin_user_ids(&self) -> Result<Vec<Uuid>, TrackerError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM admin_users")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn add_admin(&self, user_id: Uuid) -> Result<(), TrackerError> {
        let result = sqlx::query("INSERT INTO admin_users (user_id) VALUES ($1)")
            .bind(user_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!("Granted admin to {}", user_id);
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                Err(TrackerError::Conflict("User is already an admin".to_string()))
            }
            Err(e) if is_foreign_key_violation(&e) => {
                Err(TrackerError::not_found("user", user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_admin(&self, user_id: Uuid) -> Result<(), TrackerError> {
        sqlx::query("DELETE FROM admin_users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        info!("Revoked admin from {}", user_id);
        Ok(())
    }

    async fn is_admin(&self, user_id: Uuid) -> Result<bool, TrackerError> {
        let admin: bool = sqlx::query_scalar("SELECT is_admin($1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(admin)
    }
}
