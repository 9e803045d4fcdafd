//! Admin user management

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AuthProvider, DataStore},
    cache::QueryCache,
    errors::TrackerError,
    models::UserSummary,
    session::{Session, SessionManager},
};

/// Username shown when a user has no profile
pub const UNKNOWN_USERNAME: &str = "Unknown";

pub struct AdminService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DataStore>,
    sessions: Arc<SessionManager>,
    users: QueryCache<Vec<UserSummary>>,
}

impl AdminService {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DataStore>,
        sessions: Arc<SessionManager>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            auth,
            store,
            sessions,
            users: QueryCache::new("users", cache_ttl),
        }
    }

    fn require_admin(session: &Session) -> Result<(), TrackerError> {
        if session.is_admin() {
            Ok(())
        } else {
            warn!("User {} denied access to admin panel", session.user_id());
            Err(TrackerError::AccessDenied)
        }
    }

    /// Every account with its username and admin flag
    pub async fn list_users(
        &self,
        session: &Session,
    ) -> Result<Arc<Vec<UserSummary>>, TrackerError> {
        Self::require_admin(session)?;
        self.users.get_or_fetch(|| self.fetch_users()).await
    }

    async fn fetch_users(&self) -> Result<Vec<UserSummary>, TrackerError> {
        let auth_users = self.auth.list_users().await.map_err(|e| {
            error!("Error fetching users: {}", e);
            e
        })?;

        let admins: HashSet<Uuid> = match self.store.admin_user_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Error fetching admin users: {}", e);
                HashSet::new()
            }
        };

        let usernames: HashMap<Uuid, String> = match self.store.profiles().await {
            Ok(profiles) => profiles.into_iter().map(|p| (p.id, p.username)).collect(),
            Err(e) => {
                warn!("Error fetching profiles: {}", e);
                HashMap::new()
            }
        };

        Ok(auth_users
            .into_iter()
            .map(|user| UserSummary {
                username: usernames
                    .get(&user.id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
                is_admin: admins.contains(&user.id),
                id: user.id,
                email: user.email,
                created_at: user.created_at,
                last_sign_in_at: user.last_sign_in_at,
            })
            .collect())
    }

    pub async fn delete_user(&self, session: &Session, user_id: Uuid) -> Result<(), TrackerError> {
        Self::require_admin(session)?;
        if session.user_id() == user_id {
            return Err(TrackerError::CannotDeleteSelf);
        }

        self.auth.delete_user(user_id).await?;
        self.users.invalidate().await;

        info!("User {} deleted by {}", user_id, session.user_id());
        Ok(())
    }

    /// Grant or revoke admin membership
    pub async fn set_admin(
        &self,
        session: &Session,
        user_id: Uuid,
        make_admin: bool,
    ) -> Result<(), TrackerError> {
        Self::require_admin(session)?;

        if make_admin {
            self.store.add_admin(user_id).await?;
        } else {
            self.store.remove_admin(user_id).await?;
        }
        // Cached sessions carry the old flag
        self.sessions.evict_user(user_id).await;
        self.users.invalidate().await;

        info!(
            "Admin membership of {} set to {} by {}",
            user_id,
            make_admin,
            session.user_id()
        );
        Ok(())
    }
}
