use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: checks DB connectivity with timeout protection
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    // Add timeout to prevent hanging readiness checks
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    Json(snapshot)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let body = format!(
        "# HELP mediscan_scans_uploaded Total scans uploaded\n# TYPE mediscan_scans_uploaded counter\nmediscan_scans_uploaded {}\n\
# HELP mediscan_analyses_started Total analyses started\n# TYPE mediscan_analyses_started counter\nmediscan_analyses_started {}\n\
# HELP mediscan_analyses_completed Total analyses completed\n# TYPE mediscan_analyses_completed counter\nmediscan_analyses_completed {}\n\
# HELP mediscan_analyses_failed Total analyses failed\n# TYPE mediscan_analyses_failed counter\nmediscan_analyses_failed {}\n\
# HELP mediscan_analyses_cancelled Total analyses cancelled\n# TYPE mediscan_analyses_cancelled counter\nmediscan_analyses_cancelled {}\n\
# HELP mediscan_bytes_stored Bytes stored\n# TYPE mediscan_bytes_stored counter\nmediscan_bytes_stored {}\n\
# HELP mediscan_uptime_seconds Uptime seconds\n# TYPE mediscan_uptime_seconds gauge\nmediscan_uptime_seconds {}\n",
        m.scans_uploaded,
        m.analyses_started,
        m.analyses_completed,
        m.analyses_failed,
        m.analyses_cancelled,
        m.bytes_stored,
        m.uptime_seconds,
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
