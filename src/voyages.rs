//! Voyage data access

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    backend::DataStore,
    cache::QueryCache,
    errors::TrackerError,
    models::{
        NewSuccessfulTrip, StatusFilter, SuccessfulTrip, Voyage, VoyageForm, VoyageStatus,
    },
    session::Session,
};

pub struct VoyageService {
    store: Arc<dyn DataStore>,
    active: QueryCache<Vec<Voyage>>,
    archive: QueryCache<Vec<SuccessfulTrip>>,
}

impl VoyageService {
    pub fn new(store: Arc<dyn DataStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            active: QueryCache::new("vessels", cache_ttl),
            archive: QueryCache::new("successful-trips", cache_ttl),
        }
    }

    /// Active voyages, newest first
    pub async fn list(&self) -> Result<Arc<Vec<Voyage>>, TrackerError> {
        self.active.get_or_fetch(|| self.fetch_active()).await
    }

    pub async fn list_filtered(&self, filter: &StatusFilter) -> Result<Vec<Voyage>, TrackerError> {
        Ok(filter.apply(&self.list().await?))
    }

    async fn fetch_active(&self) -> Result<Vec<Voyage>, TrackerError> {
        // A failed archive lookup hides nothing rather than failing the list
        let archived: HashSet<Uuid> = match self.store.archived_trip_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Error fetching archived trip ids: {}", e);
                HashSet::new()
            }
        };

        let mut trips = self.store.list_trips().await.map_err(|e| {
            error!("Error fetching vessels: {}", e);
            e
        })?;
        trips.retain(|trip| !archived.contains(&trip.id));
        trips.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(trips)
    }

    pub async fn create(&self, session: &Session, form: VoyageForm) -> Result<Voyage, TrackerError> {
        let new_voyage = form.into_new_voyage(session.display_name())?;

        let voyage = self
            .store
            .insert_trip(&new_voyage, session.user_id())
            .await?;
        self.active.invalidate().await;

        info!(
            "Vessel {} ({}) added by {}",
            voyage.name, voyage.vessel_id, voyage.added_by
        );
        Ok(voyage)
    }

    /// Overwrite the status; the last write wins
    pub async fn update_status(
        &self,
        id: Uuid,
        status: VoyageStatus,
    ) -> Result<Voyage, TrackerError> {
        let voyage = self.store.update_trip_status(id, &status).await?;
        self.active.invalidate().await;

        info!("Vessel {} status set to {}", id, status);
        Ok(voyage)
    }

    /// Dock the voyage if needed and archive it
    ///
    /// The status update and the archive insert are separate writes. If the
    /// insert fails the voyage stays docked and active.
    pub async fn mark_successful(
        &self,
        session: &Session,
        id: Uuid,
    ) -> Result<SuccessfulTrip, TrackerError> {
        let voyage = self
            .store
            .get_trip(id)
            .await?
            .ok_or(TrackerError::not_found("voyage", id))?;

        if self.store.archived_trip_ids().await?.contains(&id) {
            return Err(TrackerError::Conflict(
                "Voyage has already been archived".to_string(),
            ));
        }

        if voyage.status != VoyageStatus::Docked {
            self.update_status(id, VoyageStatus::Docked).await?;
        }

        let entry = NewSuccessfulTrip::for_voyage(&voyage, session.user_id(), Utc::now());
        let archived = self.store.insert_successful_trip(&entry).await?;

        self.active.invalidate().await;
        self.archive.invalidate().await;

        info!("Vessel {} marked as successfully completed", id);
        Ok(archived)
    }

    /// Archive entries, most recently completed first
    pub async fn successful_trips(&self) -> Result<Arc<Vec<SuccessfulTrip>>, TrackerError> {
        self.archive
            .get_or_fetch(|| async {
                self.store.list_successful_trips().await.map_err(|e| {
                    error!("Error fetching successful trips: {}", e);
                    e
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::{Credentials, Registration};
    use crate::session::SessionManager;

    async fn setup() -> (Arc<MemoryBackend>, VoyageService, Arc<Session>) {
        let backend = Arc::new(MemoryBackend::new());
        let sessions = SessionManager::new(backend.clone(), backend.clone());
        sessions
            .register(&Registration {
                email: "jo@example.com".to_string(),
                password: "password123".to_string(),
                confirm_password: "password123".to_string(),
                username: "operator".to_string(),
                name: "John Operator".to_string(),
            })
            .await
            .unwrap();
        let session = sessions
            .login(&Credentials {
                email: "jo@example.com".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap();
        let service = VoyageService::new(backend.clone(), Duration::from_secs(60));
        (backend, service, session)
    }

    fn form(name: &str) -> VoyageForm {
        VoyageForm {
            name: Some(name.to_string()),
            vessel_id: Some(format!("{name}-ID")),
            destination: Some("Port of Rotterdam".to_string()),
            eta_date: Some("2025-04-15".to_string()),
            eta_time: Some("14:30".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_records_submitter() -> Result<(), TrackerError> {
        let (_, service, session) = setup().await;
        let voyage = service.create(&session, form("Atlantic Voyager")).await?;

        assert_eq!(voyage.added_by, "operator");
        assert_eq!(voyage.status, VoyageStatus::InTransit);
        assert_eq!(service.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_form_makes_no_store_call() {
        let (backend, service, session) = setup().await;
        backend.fail_on("insert_trip").await;

        let result = service
            .create(
                &session,
                VoyageForm {
                    destination: None,
                    ..form("Atlantic Voyager")
                },
            )
            .await;
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_cached() -> Result<(), TrackerError> {
        let (_, service, session) = setup().await;
        service.create(&session, form("First")).await?;
        service.create(&session, form("Second")).await?;

        let voyages = service.list().await?;
        assert_eq!(voyages[0].name, "Second");
        assert_eq!(voyages[1].name, "First");

        let again = service.list().await?;
        assert!(Arc::ptr_eq(&voyages, &again));
        Ok(())
    }

    #[tokio::test]
    async fn test_status_update_last_write_wins() -> Result<(), TrackerError> {
        let (_, service, session) = setup().await;
        let voyage = service.create(&session, form("Pacific Explorer")).await?;
        service.list().await?;

        service.update_status(voyage.id, VoyageStatus::Delayed).await?;
        service
            .update_status(voyage.id, VoyageStatus::from("anchored"))
            .await?;

        let voyages = service.list().await?;
        assert_eq!(voyages[0].status, VoyageStatus::Other("anchored".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_unknown_voyage() {
        let (_, service, _) = setup().await;
        let result = service
            .update_status(Uuid::new_v4(), VoyageStatus::Docked)
            .await;
        assert!(matches!(result, Err(TrackerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_mark_successful_archives_once() -> Result<(), TrackerError> {
        let (backend, service, session) = setup().await;
        let voyage = service.create(&session, form("Nordic Star")).await?;
        service.create(&session, form("Other")).await?;
        assert_eq!(service.list().await?.len(), 2);

        let archived = service.mark_successful(&session, voyage.id).await?;
        assert_eq!(archived.trip_id, voyage.id);
        assert_eq!(archived.vessel_name, "Nordic Star");

        let active = service.list().await?;
        assert_eq!(active.len(), 1);
        assert!(active.iter().all(|v| v.id != voyage.id));

        let docked = backend.get_trip(voyage.id).await?.unwrap();
        assert_eq!(docked.status, VoyageStatus::Docked);

        assert!(matches!(
            service.mark_successful(&session, voyage.id).await,
            Err(TrackerError::Conflict(_))
        ));
        let trips = service.successful_trips().await?;
        assert_eq!(trips.iter().filter(|t| t.trip_id == voyage.id).count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_leaves_voyage_docked() -> Result<(), TrackerError> {
        let (backend, service, session) = setup().await;
        let voyage = service.create(&session, form("Nordic Star")).await?;
        backend.fail_on("insert_successful_trip").await;

        assert!(service.mark_successful(&session, voyage.id).await.is_err());

        let active = service.list().await?;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, VoyageStatus::Docked);
        assert!(service.successful_trips().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_by_status() -> Result<(), TrackerError> {
        let (_, service, session) = setup().await;
        let delayed = service.create(&session, form("Late")).await?;
        service.create(&session, form("OnTime")).await?;
        service.update_status(delayed.id, VoyageStatus::Delayed).await?;

        let only_delayed = service
            .list_filtered(&StatusFilter::Status(VoyageStatus::Delayed))
            .await?;
        assert_eq!(only_delayed.len(), 1);
        assert_eq!(only_delayed[0].id, delayed.id);

        assert_eq!(service.list_filtered(&StatusFilter::All).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_lookup_failure_degrades() -> Result<(), TrackerError> {
        let (backend, service, session) = setup().await;
        service.create(&session, form("Nordic Star")).await?;
        backend.fail_on("archived_trip_ids").await;

        assert_eq!(service.list().await?.len(), 1);
        Ok(())
    }
}
