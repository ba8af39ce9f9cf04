//! WebSocket Connection Hub
//!
//! Owns the registry of subscriber connections and fans readings out to them.
//! The registry lives inside a single worker task; callers talk to it through
//! a bounded command channel, so registration, removal and broadcast
//! enumeration never race with each other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use super::queue::{subscriber_channel, ConnectionId, Offer, OutboundQueue, SubscriberHandle};
use crate::reading::Reading;

/// Configuration for the connection hub
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of the hub's command channel
    pub command_capacity: usize,
    /// Readings buffered per connection
    pub outbound_capacity: usize,
    /// Consecutive dropped readings before a connection is torn down
    pub max_consecutive_drops: u32,
    pub keepalive_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub close_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            command_capacity: 1024,
            outbound_capacity: 64,
            max_consecutive_drops: 16,
            keepalive_interval_secs: 30,
            client_timeout_secs: 90,
            close_timeout_ms: 1000,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl HubConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs.max(1))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Hub errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Too many connections (limit {0})")]
    TooManyConnections(usize),

    #[error("Hub command queue is full")]
    Saturated,

    #[error("Hub is not running")]
    Closed,
}

/// Running totals kept by the hub worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub slow_consumers: u64,
}

enum Command {
    Register {
        handle: SubscriberHandle,
        reply: oneshot::Sender<Result<ConnectionId, HubError>>,
    },
    Unregister {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        reading: Arc<Reading>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    CloseAll {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the hub worker
///
/// Cloning is cheap; every clone talks to the same worker. The worker stops
/// once all clones are dropped.
#[derive(Clone)]
pub struct ConnectionHub {
    commands: mpsc::Sender<Command>,
    config: Arc<HubConfig>,
}

impl ConnectionHub {
    /// Start the hub worker on the current runtime
    pub fn spawn(config: HubConfig) -> Self {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let worker = HubWorker {
            registry: HashMap::new(),
            max_connections: config.max_connections,
            max_consecutive_drops: config.max_consecutive_drops.max(1),
            stats: HubStats::default(),
        };
        tokio::spawn(worker.run(receiver));

        Self {
            commands,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a handle/queue pair sized for this hub
    pub fn subscriber_channel(&self) -> (SubscriberHandle, OutboundQueue) {
        subscriber_channel(self.config.outbound_capacity)
    }

    /// Add a connection to the registry
    pub async fn register(&self, handle: SubscriberHandle) -> Result<ConnectionId, HubError> {
        self.request(|reply| Command::Register { handle, reply })
            .await?
    }

    /// Remove a connection, closing its queue
    ///
    /// Returns whether the connection was still registered.
    pub async fn unregister(&self, id: ConnectionId) -> Result<bool, HubError> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Offer a reading to every registered connection
    ///
    /// Never waits: when the command channel is full the reading is dropped
    /// for all subscribers and `Saturated` is returned.
    pub fn broadcast(&self, reading: Arc<Reading>) -> Result<(), HubError> {
        match self.commands.try_send(Command::Broadcast { reading }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Hub command queue full, dropping reading");
                Err(HubError::Saturated)
            }
            Err(TrySendError::Closed(_)) => Err(HubError::Closed),
        }
    }

    /// Number of registered connections
    pub async fn count(&self) -> Result<usize, HubError> {
        self.request(|reply| Command::Count { reply }).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Release every connection; their outbound loops send a close frame
    pub async fn close_all(&self) -> Result<usize, HubError> {
        self.request(|reply| Command::CloseAll { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }
}

struct HubWorker {
    registry: HashMap<ConnectionId, SubscriberHandle>,
    max_connections: usize,
    max_consecutive_drops: u32,
    stats: HubStats,
}

impl HubWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        tracing::debug!(connections = self.registry.len(), "Hub worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { handle, reply } => {
                let _ = reply.send(self.register(handle));
            }
            Command::Unregister { id, reply } => {
                let removed = self.registry.remove(&id).is_some();
                if removed {
                    tracing::info!(connection_id = %id, "WebSocket disconnected");
                }
                let _ = reply.send(removed);
            }
            Command::Broadcast { reading } => self.broadcast(reading),
            Command::Count { reply } => {
                let _ = reply.send(self.registry.len());
            }
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.registry.len(),
                    ..self.stats
                });
            }
            Command::CloseAll { reply } => {
                let closed = self.registry.len();
                self.registry.clear();
                tracing::info!(closed, "Closed all WebSocket connections");
                let _ = reply.send(closed);
            }
        }
    }

    fn register(&mut self, handle: SubscriberHandle) -> Result<ConnectionId, HubError> {
        if self.registry.len() >= self.max_connections {
            return Err(HubError::TooManyConnections(self.max_connections));
        }

        let id = handle.id();
        self.registry.insert(id, handle);
        tracing::info!(
            connection_id = %id,
            connections = self.registry.len(),
            "WebSocket connected"
        );
        Ok(id)
    }

    fn broadcast(&mut self, reading: Arc<Reading>) {
        let mut evicted = Vec::new();
        let mut delivered = 0u64;

        for (id, handle) in self.registry.iter_mut() {
            match handle.offer(&reading) {
                Offer::Queued => delivered += 1,
                Offer::Dropped { consecutive } => {
                    self.stats.dropped += 1;
                    if consecutive >= self.max_consecutive_drops {
                        tracing::warn!(
                            connection_id = %id,
                            dropped = consecutive,
                            "Slow consumer, disconnecting"
                        );
                        self.stats.slow_consumers += 1;
                        evicted.push(*id);
                    } else {
                        tracing::debug!(connection_id = %id, consecutive, "Outbound queue full");
                    }
                }
                Offer::Closed => {
                    tracing::debug!(connection_id = %id, "Outbound queue closed, removing");
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            self.registry.remove(&id);
        }

        self.stats.broadcasts += 1;
        self.stats.delivered += delivered;
        tracing::trace!(delivered, "Broadcast reading");
    }
}
