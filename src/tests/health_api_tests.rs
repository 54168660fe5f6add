#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::routes::health::{healthz, metrics, metrics_prometheus, readyz, version};
    use crate::state::AppState;

    async fn setup_test_app() -> Router {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let state = AppState::new(pool, AppConfig::default());

        Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/metrics", get(metrics))
            .route("/metrics/prometheus", get(metrics_prometheus))
            .route("/version", get(version))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["name"], "mediscan");
        assert!(!v["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_readyz_endpoint_ok() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ready");
    }

    #[tokio::test]
    async fn test_readyz_endpoint_db_error() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        pool.close().await;

        let state = AppState::new(pool, AppConfig::default());
        let app = Router::new().route("/readyz", get(readyz)).with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("not ready"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["scans_uploaded"], 0);
        assert_eq!(v["analyses_started"], 0);
        assert_eq!(v["bytes_stored"], 0);
    }

    #[tokio::test]
    async fn test_metrics_prometheus_endpoint() {
        let app = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/metrics/prometheus").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body_str = String::from_utf8(body.to_vec()).unwrap();
        assert!(body_str.contains("mediscan_scans_uploaded 0"));
        assert!(body_str.contains("mediscan_analyses_completed 0"));
        assert!(body_str.contains("mediscan_bytes_stored 0"));
        assert!(body_str.contains("# TYPE mediscan_uptime_seconds gauge"));
    }
}
