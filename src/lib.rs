//! # EWS
//!
//! Early-warning weather station backend. Sensor stations publish telemetry
//! over MQTT (or POST it over HTTP); every reading is stored and streamed in
//! real time to dashboard clients over WebSocket.
//!
//! ## Features
//!
//! - **Typed wire decoding**: sensor payloads decode into one strongly typed struct
//! - **Durable history**: SQLite store with range queries and summaries
//! - **Live fan-out**: bounded per-subscriber queues, slow consumers are dropped
//! - **Configurable**: TOML config with `EWS_*` environment overrides
//!
//! ## Modules
//!
//! - [`reading`]: Reading domain type and MQTT wire schema
//! - [`storage`]: Reading store trait and SQLite implementation
//! - [`ingest`]: MQTT consumer and the persist-then-broadcast pipeline
//! - [`websocket`]: Broadcast hub and subscriber connections
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ews::ingest::{BroadcastPolicy, IngestPipeline};
//! use ews::reading::decode_payload;
//! use ews::storage::SqliteStore;
//! use ews::websocket::{ConnectionHub, HubConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("ews.db")?);
//!     let hub = ConnectionHub::spawn(HubConfig::default());
//!     let pipeline = IngestPipeline::new(store, hub, BroadcastPolicy::Always);
//!
//!     let payload = br#"{"waktu":1700000000000,"suhu":28.5,"lembap":77.0,
//!         "tekanan":1008.2,"ketinggian":41.5,"co2":412.0,"jarak":120.4,
//!         "angin":3.2,"arahAngin":270.0,"rain":0.8,"voltSensor":4.9,
//!         "busVoltage":5.02,"current_mA":131.5}"#;
//!
//!     let stored = pipeline.ingest(decode_payload(payload)?).await?;
//!     println!("Stored reading {}", stored.id);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod ingest;
pub mod reading;
pub mod storage;
pub mod websocket;

// Re-export top-level types for convenience
pub use reading::{decode_payload, DecodeError, Reading, SensorPayload, StoredReading};

pub use storage::{ReadingStore, ReadingSummary, SqliteStore, StoreError, StoreResult, TimeRange};

pub use ingest::{
    BroadcastPolicy, BusStatus, ConnectError, ConsumerHandle, IngestPipeline, MqttConsumer,
    SubscribeError,
};

pub use websocket::{websocket_handler, ConnectionHub, HubConfig, HubError, ServerMessage};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{
    ApiConfig, Config, ConfigError, IngestConfig, LoggingConfig, MqttConfig, StorageConfig,
};
