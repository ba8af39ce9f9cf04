//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ApiConfig;
use crate::ingest::{BroadcastPolicy, BusStatus, IngestPipeline};
use crate::storage::SqliteStore;
use crate::websocket::ConnectionHub;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Reading store for history queries and health checks
    pub store: Arc<SqliteStore>,
    /// Persist-then-broadcast path for created readings
    pub pipeline: IngestPipeline,
    /// Hub serving WebSocket subscribers
    pub hub: ConnectionHub,
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Sensor bus connection state; `None` when the consumer is not running
    pub bus_status: Option<BusStatus>,
}

impl AppState {
    /// Create state whose pipeline writes to `store`
    pub fn new(
        store: Arc<SqliteStore>,
        hub: ConnectionHub,
        policy: BroadcastPolicy,
        config: ApiConfig,
    ) -> Self {
        let pipeline = IngestPipeline::new(store.clone(), hub.clone(), policy);
        Self::from_parts(store, pipeline, config)
    }

    /// Create state around an existing pipeline
    pub fn from_parts(store: Arc<SqliteStore>, pipeline: IngestPipeline, config: ApiConfig) -> Self {
        Self {
            store,
            hub: pipeline.hub().clone(),
            pipeline,
            config: Arc::new(config),
            start_time: Instant::now(),
            bus_status: None,
        }
    }

    /// Report the sensor bus connection in health checks
    pub fn with_bus_status(mut self, status: BusStatus) -> Self {
        self.bus_status = Some(status);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Bus state as reported by the health endpoint
    pub fn bus_state(&self) -> &'static str {
        match &self.bus_status {
            None => "disabled",
            Some(status) if status.is_connected() => "connected",
            Some(_) => "disconnected",
        }
    }
}
