//! Voyage tracker server

use std::sync::Arc;

use tracing::info;
use voyage_tracker::{
    config::{AppConfig, BackendKind},
    database::{Database, PgAuthProvider},
    errors::TrackerError,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    voyage_tracker::config::load_dotenv(std::path::Path::new("."));

    let config = AppConfig::load()?;
    config.validate()?;

    let state = match config.database.backend {
        BackendKind::Postgres => {
            let database = Database::connect(&config.database).await?;
            let auth = PgAuthProvider::new(database.pool().clone(), &config.session);
            AppState::new(Arc::new(auth), Arc::new(database), config.cache.ttl)
        }
        #[cfg(feature = "memory")]
        BackendKind::Memory => {
            tracing::warn!("Using the in-memory backend, nothing is persisted");
            let backend = Arc::new(voyage_tracker::backend::memory::MemoryBackend::with_session_ttl(
                config.session.ttl,
            ));
            AppState::new(backend.clone(), backend, config.cache.ttl)
        }
        #[cfg(not(feature = "memory"))]
        BackendKind::Memory => {
            return Err(TrackerError::ConfigurationError {
                message: "In-memory backend requires the `memory` feature".to_string(),
            })
        }
    };
    info!("Backend ready: {:?}", config.database.backend);

    server::serve(&config, state).await
}
