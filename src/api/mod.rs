//! EWS REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Readings
//! - `POST /api/v1/readings` - Store a reading and broadcast it
//! - `POST /data` - Same as above, path used by existing sensor firmware
//! - `GET /api/v1/readings` - History (`start`, `end`, `limit`)
//! - `GET /api/v1/readings/latest` - Most recent reading
//! - `GET /api/v1/readings/summary` - Aggregate statistics (`start`, `end`)
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` (also `/api/v1/ws`) - Live reading stream
//!
//! # Example
//!
//! ```rust,ignore
//! use ews::api::{serve, shutdown_signal, AppState};
//! use ews::config::ApiConfig;
//! use ews::ingest::BroadcastPolicy;
//! use ews::storage::SqliteStore;
//! use ews::websocket::{ConnectionHub, HubConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("ews.db")?);
//!     let hub = ConnectionHub::spawn(HubConfig::default());
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, hub, BroadcastPolicy::Always, config.clone());
//!     serve(state, &config, shutdown_signal()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use crate::config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::{websocket_handler, ConnectionHub};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    let api_routes = Router::new()
        .route(
            "/readings",
            get(routes::readings::list_readings).post(routes::readings::create_reading),
        )
        .route("/readings/latest", get(routes::readings::latest_reading))
        .route("/readings/summary", get(routes::readings::reading_summary))
        .route("/ws", get(websocket_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .route("/data", post(routes::readings::create_reading))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        // Subscribers may connect from any origin
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = state.hub.clone();
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("EWS API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    // The listener is closed, so no subscriber can register past this point
    release_subscribers(&hub).await;

    tracing::info!("EWS API shut down gracefully");
    Ok(())
}

/// Close every WebSocket subscriber and give them time to send close frames
async fn release_subscribers(hub: &ConnectionHub) {
    let config = hub.config();

    match tokio::time::timeout(config.shutdown_timeout(), hub.close_all()).await {
        Ok(Ok(closed)) => {
            tracing::info!(closed, "WebSocket subscribers released");
            if closed > 0 {
                tokio::time::sleep(config.close_timeout()).await;
            }
        }
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to release subscribers"),
        Err(_) => tracing::warn!("Timed out releasing subscribers"),
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{HealthResponse, ReadingListResponse};
    use crate::api::error::ErrorResponse;
    use crate::ingest::{BroadcastPolicy, IngestPipeline};
    use crate::reading::types::fixtures::sample_reading;
    use crate::reading::StoredReading;
    use crate::storage::store::fixtures::FailingStore;
    use crate::storage::{ReadingStore, SqliteStore};
    use crate::websocket::{HubConfig, OutboundQueue};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde::de::DeserializeOwned;
    use tower::util::ServiceExt;

    const SCENARIO_BODY: &str = r#"{
        "timestamp": "2023-11-14T22:13:20Z",
        "temperature": 28.5, "humidity": 77.0, "pressure": 1008.2,
        "altitude": 41.5, "co2": 412.0, "distance": 120.4,
        "windSpeed": 3.2, "windDirection": 270.0, "rainfall": 0.8,
        "voltage": 4.9, "busVoltage": 5.02, "current": 131.5
    }"#;

    struct TestApp {
        router: Router,
        store: Arc<SqliteStore>,
        hub: ConnectionHub,
    }

    fn create_test_app() -> TestApp {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let hub = ConnectionHub::spawn(HubConfig::default());
        let state = AppState::new(
            store.clone(),
            hub.clone(),
            BroadcastPolicy::Always,
            ApiConfig::default(),
        );

        TestApp {
            router: build_router(state),
            store,
            hub,
        }
    }

    async fn subscribe(hub: &ConnectionHub) -> OutboundQueue {
        let (handle, queue) = hub.subscriber_channel();
        hub.register(handle).await.unwrap();
        queue
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body<T: DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/health/live")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/health/ready")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_reports_subscribers() {
        let app = create_test_app();
        let _first = subscribe(&app.hub).await;
        let _second = subscribe(&app.hub).await;
        app.hub.broadcast(Arc::new(sample_reading(1))).unwrap();

        let response = app.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = json_body(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.subscribers, 2);
        assert_eq!(health.hub.connections, 2);
        assert_eq!(health.hub.broadcasts, 1);
        assert_eq!(health.hub.delivered, 2);
        assert_eq!(health.hub.dropped, 0);
        assert_eq!(health.bus, "disabled");
        assert_eq!(health.store, "ok");
    }

    #[tokio::test]
    async fn test_create_reading_stores_and_broadcasts() {
        let app = create_test_app();
        let mut queue = subscribe(&app.hub).await;

        let response = app
            .router
            .oneshot(post_json("/api/v1/readings", SCENARIO_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored: StoredReading = json_body(response).await;
        assert!(stored.id > 0);
        assert_eq!(stored.reading, sample_reading(1_700_000_000_000));

        assert_eq!(app.store.count().await.unwrap(), 1);
        let received = queue.recv().await.unwrap();
        assert_eq!(received.temperature, 28.5);
    }

    #[tokio::test]
    async fn test_create_reading_legacy_path() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/data", SCENARIO_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_create_reading_invalid_json() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/readings", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error.code, "VALIDATION_ERROR");
        assert!(!error.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_create_reading_missing_field() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/readings",
                r#"{"timestamp": "2023-11-14T22:13:20Z", "temperature": 28.5}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_still_broadcasts() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let hub = ConnectionHub::spawn(HubConfig::default());
        let failing: Arc<dyn ReadingStore> = Arc::new(FailingStore::default());
        let pipeline = IngestPipeline::new(failing, hub.clone(), BroadcastPolicy::Always);
        let router = build_router(AppState::from_parts(store, pipeline, ApiConfig::default()));
        let mut queue = subscribe(&hub).await;

        let response = router
            .oneshot(post_json("/api/v1/readings", SCENARIO_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error.code, "STORE_ERROR");
        assert_eq!(queue.recv().await.unwrap().temperature, 28.5);
    }

    #[tokio::test]
    async fn test_latest_reading() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(get("/api/v1/readings/latest"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.store.write(&sample_reading(1_000)).await.unwrap();
        app.store.write(&sample_reading(2_000)).await.unwrap();

        let response = app
            .router
            .oneshot(get("/api/v1/readings/latest"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let latest: StoredReading = json_body(response).await;
        assert_eq!(latest.reading.timestamp_millis(), 2_000);
    }

    #[tokio::test]
    async fn test_list_readings_in_range() {
        let app = create_test_app();
        for ms in [1_000, 2_000, 3_000, 4_000] {
            app.store.write(&sample_reading(ms)).await.unwrap();
        }

        let response = app
            .router
            .oneshot(get(
                "/api/v1/readings?start=1970-01-01T00:00:02Z&end=1970-01-01T00:00:04Z&limit=10",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list: ReadingListResponse = json_body(response).await;
        let timestamps: Vec<i64> = list
            .readings
            .iter()
            .map(|r| r.reading.timestamp_millis())
            .collect();
        assert_eq!(timestamps, vec![3_000, 2_000]);
        assert_eq!(list.count, 2);
    }

    #[tokio::test]
    async fn test_list_readings_rejects_inverted_range() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(get(
                "/api/v1/readings?start=1970-01-01T00:00:04Z&end=1970-01-01T00:00:02Z",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_readings_rejects_bad_timestamp() {
        let app = create_test_app();

        let response = app
            .router
            .oneshot(get("/api/v1/readings?start=yesterday"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_summary() {
        let app = create_test_app();
        app.store.write(&sample_reading(1_000)).await.unwrap();

        let response = app
            .router
            .oneshot(get(
                "/api/v1/readings/summary?start=1970-01-01T00:00:00Z&end=1970-01-01T01:00:00Z",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = json_body(response).await;
        assert_eq!(value["count"], 1);
        assert_eq!(value["maxTemp"], 28.5);
        assert_eq!(value["peakHour"], 0);
    }

    #[tokio::test]
    async fn test_websocket_requires_upgrade() {
        let app = create_test_app();

        let response = app.router.oneshot(get("/ws")).await.unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(app.hub.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_serve_releases_subscribers_on_shutdown() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let hub = ConnectionHub::spawn(HubConfig {
            close_timeout_ms: 0,
            ..Default::default()
        });
        let config = ApiConfig::new("127.0.0.1", 0);
        let state = AppState::new(store, hub.clone(), BroadcastPolicy::Always, config.clone());
        let mut queue = subscribe(&hub).await;

        serve(state, &config, async {}).await.unwrap();

        assert_eq!(hub.count().await.unwrap(), 0);
        assert!(queue.recv().await.is_none());
    }
}
