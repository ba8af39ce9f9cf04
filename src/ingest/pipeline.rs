//! Persist-then-broadcast pipeline shared by every producer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::reading::{Reading, StoredReading};
use crate::storage::{ReadingStore, StoreResult};
use crate::websocket::ConnectionHub;

/// Whether a reading reaches subscribers when the store write fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    /// Broadcast regardless of the write outcome
    #[default]
    Always,
    /// Broadcast only readings that were stored
    PersistedOnly,
}

impl FromStr for BroadcastPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "persisted_only" | "persisted-only" => Ok(Self::PersistedOnly),
            other => Err(format!("unknown broadcast policy '{}'", other)),
        }
    }
}

impl fmt::Display for BroadcastPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::PersistedOnly => write!(f, "persisted_only"),
        }
    }
}

/// Default bound on readings submitted but not yet stored
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Store a reading, then offer it to the hub
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn ReadingStore>,
    hub: ConnectionHub,
    policy: BroadcastPolicy,
    in_flight: Arc<Semaphore>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn ReadingStore>, hub: ConnectionHub, policy: BroadcastPolicy) -> Self {
        Self {
            store,
            hub,
            policy,
            in_flight: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        }
    }

    /// Limit how many submitted readings may be pending at once
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    /// Persist and broadcast, returning the store outcome
    ///
    /// The broadcast never waits on subscribers. Under
    /// [`BroadcastPolicy::Always`] a failed write is still broadcast.
    pub async fn ingest(&self, reading: Reading) -> StoreResult<StoredReading> {
        let reading = Arc::new(reading);

        match self.store.write(&reading).await {
            Ok(stored) => {
                tracing::debug!(id = stored.id, timestamp = %reading.timestamp, "Stored reading");
                self.publish(reading);
                Ok(stored)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    timestamp = %reading.timestamp,
                    policy = %self.policy,
                    "Failed to store reading"
                );
                if self.policy == BroadcastPolicy::Always {
                    self.publish(reading);
                }
                Err(e)
            }
        }
    }

    /// Run [`ingest`](Self::ingest) on its own task
    ///
    /// Used from the bus event loop, which must not wait on the store.
    /// Failures are logged by `ingest` and otherwise dropped. When the
    /// in-flight limit is reached the reading is shed and `None` returned.
    pub fn submit(&self, reading: Reading) -> Option<JoinHandle<()>> {
        let permit = match self.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    timestamp = %reading.timestamp,
                    "Ingest backlog full, dropping reading"
                );
                return None;
            }
        };

        let pipeline = self.clone();
        Some(tokio::spawn(async move {
            let _ = pipeline.ingest(reading).await;
            drop(permit);
        }))
    }

    fn publish(&self, reading: Arc<Reading>) {
        if let Err(e) = self.hub.broadcast(reading) {
            tracing::warn!(error = %e, "Reading not broadcast");
        }
    }
}
