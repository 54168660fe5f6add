use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::storage::MediaStore;
use crate::types::AnalysisEvent;

/// A handle to a running analysis job.
///
/// This struct provides mechanisms to control and communicate with the
/// background analysis of one scan, including cancellation and event
/// broadcasting capabilities.
#[derive(Clone)]
pub struct JobHandle {
    /// A cancellation token for stopping the job.
    ///
    /// When this token is cancelled, the analysis task should gracefully
    /// terminate its simulation loop and stop patching the scan row.
    pub cancel: CancellationToken,
    /// A broadcast sender for analysis events.
    ///
    /// Used to emit real-time progress, completion, and failure updates
    /// to connected clients via Server-Sent Events (SSE).
    pub sender: broadcast::Sender<AnalysisEvent>,
}

/// The shared application state.
///
/// Holds all core shared data structures accessed across HTTP handlers,
/// middleware, and background tasks. Thread-safe and cloneable for use with
/// Axum's request extraction system.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    ///
    /// Provides connections to the SQLite database holding users, profiles,
    /// and scan records.
    pub db: sqlx::SqlitePool,
    /// A map of running analysis jobs.
    ///
    /// Maps scan UUIDs to their job handles, allowing cancellation and
    /// event subscription while an analysis is in flight.
    pub jobs: Arc<RwLock<HashMap<Uuid, JobHandle>>>,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Operational counters (uploads, analyses, stored bytes).
    pub metrics: Metrics,
    /// The per-endpoint rate limiter.
    ///
    /// Tighter limits on the credential and upload endpoints than the
    /// global limiter provides.
    pub rate_limiter: EndpointRateLimiter,
    /// Blob storage for uploaded images and derived thumbnails.
    pub media: MediaStore,
}

impl AppState {
    /// Creates a new `AppState` with initialized components.
    ///
    /// # Arguments
    ///
    /// * `db` - The database connection pool for persistence operations
    /// * `config` - The application configuration containing all runtime settings
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/scans", 30, 60),                    // 30 uploads per minute
            ("/auth/signup", 10, 60),              // 10 signups per minute
            ("/auth/signin", 20, 60),              // 20 signin attempts per minute
            ("/auth/resend-confirmation", 5, 60),  // 5 resends per minute
        ]);

        let media = MediaStore::new(&config.storage);

        Self {
            db,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            metrics: Metrics::new(),
            rate_limiter,
            media,
        }
    }
}
