//! HTTP API consumed by the dashboard

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    admin::AdminService,
    backend::{AuthProvider, DataStore},
    config::AppConfig,
    errors::TrackerError,
    session::SessionManager,
    voyages::VoyageService,
};

pub mod extract;
pub mod routes;

/// Services shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub voyages: Arc<VoyageService>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DataStore>,
        cache_ttl: Duration,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(auth.clone(), store.clone()));
        Self {
            voyages: Arc::new(VoyageService::new(store.clone(), cache_ttl)),
            admin: Arc::new(AdminService::new(auth, store, sessions.clone(), cache_ttl)),
            sessions,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/auth/login", post(routes::login))
        .route("/auth/register", post(routes::register))
        .route("/auth/logout", post(routes::logout))
        .route("/auth/reset-password", post(routes::reset_password))
        .route(
            "/auth/reset-password/confirm",
            post(routes::confirm_password_reset),
        )
        .route("/auth/session", get(routes::current_session))
        .route("/settings/password", put(routes::change_password))
        .route("/settings/contact", put(routes::update_contact))
        .route(
            "/voyages",
            get(routes::list_voyages).post(routes::create_voyage),
        )
        .route("/voyages/{id}/status", put(routes::update_status))
        .route("/voyages/{id}/successful", post(routes::mark_successful))
        .route("/trips/successful", get(routes::successful_trips))
        .route("/admin/users", get(routes::list_users))
        .route("/admin/users/{id}", axum::routing::delete(routes::delete_user))
        .route("/admin/users/{id}/admin", put(routes::toggle_admin))
        .fallback(routes::not_found)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

/// Serve the API until Ctrl+C or SIGTERM
pub async fn serve(config: &AppConfig, state: AppState) -> Result<(), TrackerError> {
    let watcher = state.sessions.watch();
    let sweeper = state.sessions.sweep(config.session.sweep_interval);

    let app = router(state)
        .layer(cors_layer(&config.server.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Server running on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.abort();
    sweeper.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
