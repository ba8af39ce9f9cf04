//! EWS Server
//!
//! Run with: cargo run --bin ews -- --config config.toml
//!
//! Starts the reading store, the broadcast hub, the MQTT consumer and the
//! HTTP/WebSocket API. Configuration comes from the TOML file given with
//! `--config`, else the first of `$XDG_CONFIG_HOME/ews/config.toml`,
//! `/etc/ews/config.toml` and `./config.toml`, with `EWS_*` environment
//! variables applied on top. `RUST_LOG` overrides the configured log level.

use clap::Parser;
use ews::api::{serve, shutdown_signal, AppState};
use ews::config::{Config, LoggingConfig, MqttConfig};
use ews::ingest::{ConsumerHandle, IngestPipeline, MqttConsumer};
use ews::storage::SqliteStore;
use ews::websocket::ConnectionHub;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ews")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Weather station telemetry ingestion and live streaming server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = args.config.or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::from_env()?,
    };

    init_logging(&config.logging);

    tracing::info!("Starting EWS server v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("No config file found, using defaults"),
    }

    // Initialize reading store
    tracing::info!("Database: {}", config.storage.database_path);
    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);

    // Start the broadcast hub
    let hub = ConnectionHub::spawn(config.hub.clone());
    let pipeline = IngestPipeline::new(store.clone(), hub, config.ingest.broadcast_policy)
        .with_max_in_flight(config.ingest.max_in_flight);
    tracing::info!(
        policy = %config.ingest.broadcast_policy,
        max_in_flight = config.ingest.max_in_flight,
        max_connections = config.hub.max_connections,
        "Broadcast hub started"
    );

    // Bus failures leave HTTP ingestion and streaming running
    let consumer = if config.mqtt.enabled {
        start_consumer(&config.mqtt, pipeline.clone()).await
    } else {
        tracing::info!("MQTT consumer disabled (set EWS_MQTT_ENABLED=true to enable)");
        None
    };

    let mut state = AppState::from_parts(store, pipeline, config.api.clone());
    if let Some(consumer) = &consumer {
        state = state.with_bus_status(consumer.status());
    }

    // Stop bus intake before the listener closes
    let disconnect_timeout = config.mqtt.disconnect_timeout();
    let shutdown = async move {
        shutdown_signal().await;

        if let Some(consumer) = consumer {
            consumer.shutdown(disconnect_timeout).await;
        }
    };

    tracing::info!("Starting server on {}", config.api.addr());
    serve(state, &config.api, shutdown).await?;

    tracing::info!("EWS server stopped");
    Ok(())
}

/// Connect, subscribe and start the MQTT consumer, logging any failure
async fn start_consumer(config: &MqttConfig, pipeline: IngestPipeline) -> Option<ConsumerHandle> {
    let mut consumer = match MqttConsumer::connect(config, pipeline).await {
        Ok(consumer) => consumer,
        Err(e) => {
            tracing::error!(broker = %config.broker, error = %e, "MQTT connect failed, bus ingestion disabled");
            return None;
        }
    };

    if let Err(e) = consumer.subscribe(&config.topic, config.qos).await {
        tracing::error!(topic = %config.topic, error = %e, "MQTT subscribe failed, bus ingestion disabled");
        return None;
    }

    Some(consumer.spawn())
}

/// Install the tracing subscriber
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ews={},tower_http=info", config.level).into());

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
