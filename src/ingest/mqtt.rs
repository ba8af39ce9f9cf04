//! MQTT sensor bus consumer
//!
//! Holds one broker connection, subscribes to the sensor topic and turns
//! each PUBLISH into a [`Reading`](crate::reading::Reading) handed to the
//! [`IngestPipeline`]. The event loop never waits on the store: every
//! decoded reading is submitted on its own task.

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{ConnectError, SubscribeError};
use super::pipeline::IngestPipeline;
use crate::config::MqttConfig;
use crate::reading::decode_payload;

/// Port used when the broker address names none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Split a broker address into host and port
///
/// Accepts `tcp://host:port`, `mqtt://host:port` and bare `host[:port]`.
pub fn parse_broker_address(address: &str) -> Result<(String, u16), ConnectError> {
    let trimmed = address.trim();
    let rest = match trimmed.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some((scheme, _)) => {
            return Err(ConnectError::InvalidAddress(format!(
                "unsupported scheme '{}' in '{}'",
                scheme, address
            )))
        }
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                ConnectError::InvalidAddress(format!("invalid port in '{}'", address))
            })?;
            (host, port)
        }
        None => (rest, DEFAULT_MQTT_PORT),
    };

    if host.is_empty() {
        return Err(ConnectError::InvalidAddress(format!(
            "missing host in '{}'",
            address
        )));
    }
    Ok((host.to_string(), port))
}

/// Map a numeric delivery guarantee to a QoS level
pub fn qos_from_level(level: u8) -> Result<QoS, SubscribeError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(SubscribeError::InvalidQos(other)),
    }
}

/// Shared view of whether the broker connection is up
#[derive(Debug, Clone, Default)]
pub struct BusStatus(Arc<AtomicBool>);

impl BusStatus {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Relaxed);
    }
}

/// Decode one bus payload and submit it
///
/// Malformed payloads are logged and dropped; they never end the
/// subscription. Returns the task running the store write and broadcast,
/// or `None` when the payload was malformed or shed.
pub fn handle_payload(
    pipeline: &IngestPipeline,
    topic: &str,
    payload: &[u8],
) -> Option<JoinHandle<()>> {
    match decode_payload(payload) {
        Ok(reading) => {
            debug!(topic = topic, timestamp = %reading.timestamp, "received reading");
            pipeline.submit(reading)
        }
        Err(e) => {
            warn!(
                topic = topic,
                error = %e,
                bytes = payload.len(),
                "dropping malformed sensor payload"
            );
            None
        }
    }
}

/// Connected MQTT consumer, not yet running
pub struct MqttConsumer {
    client: AsyncClient,
    eventloop: EventLoop,
    pipeline: IngestPipeline,
    subscription: Option<(String, QoS)>,
    status: BusStatus,
}

impl MqttConsumer {
    /// Connect to the broker and wait for its CONNACK
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the address is invalid, the broker is
    /// unreachable or refuses the client, or no CONNACK arrives within
    /// `connect_timeout_secs`.
    pub async fn connect(
        config: &MqttConfig,
        pipeline: IngestPipeline,
    ) -> Result<Self, ConnectError> {
        let (host, port) = parse_broker_address(&config.broker)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host.clone(), port);
        options.set_clean_session(true);
        options.set_keep_alive(config.keep_alive().max(Duration::from_secs(5)));
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        info!(host = %host, port, client_id = %config.client_id, "connecting to MQTT broker");
        let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));

        let timeout = config.connect_timeout();
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| ConnectError::Timeout(timeout))??;

        let status = BusStatus::default();
        status.set(true);
        info!(host = %host, port, "MQTT connection established");

        Ok(Self {
            client,
            eventloop,
            pipeline,
            subscription: None,
            status,
        })
    }

    pub fn status(&self) -> BusStatus {
        self.status.clone()
    }

    /// Subscribe to the sensor topic
    ///
    /// The subscription is re-issued automatically after a reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError`] if the QoS level is invalid, the
    /// connection is down, or the request cannot be queued.
    pub async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), SubscribeError> {
        let qos = qos_from_level(qos)?;
        if !self.status.is_connected() {
            return Err(SubscribeError::NotConnected);
        }

        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| SubscribeError::Request(e.to_string()))?;
        self.subscription = Some((topic.to_string(), qos));

        info!(topic = topic, qos = ?qos, "subscribed to sensor topic");
        Ok(())
    }

    /// Run the event loop on its own task
    pub fn spawn(self) -> ConsumerHandle {
        let client = self.client.clone();
        let status = self.status.clone();
        let task = tokio::spawn(self.run());

        ConsumerHandle {
            client,
            status,
            task,
        }
    }

    async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_payload(&self.pipeline, &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.status.set(true);
                    info!("MQTT connection re-established");
                    self.resubscribe();
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "subscription acknowledged");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.status.set(false);
                    info!("MQTT disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.status.set(false);
                    warn!(error = %e, backoff = ?RECONNECT_BACKOFF, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    fn resubscribe(&self) {
        let Some((topic, qos)) = &self.subscription else {
            return;
        };
        // The request channel is drained by this task, so never wait on it here
        if let Err(e) = self.client.try_subscribe(topic.clone(), *qos) {
            warn!(topic = %topic, error = %e, "failed to re-subscribe");
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(ConnectError::Refused(format!("{:?}", code))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(ConnectError::Connection(e.to_string())),
        }
    }
}

/// Handle to a running consumer
pub struct ConsumerHandle {
    client: AsyncClient,
    status: BusStatus,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn status(&self) -> BusStatus {
        self.status.clone()
    }

    /// Send DISCONNECT and wait up to `timeout` for the event loop to stop
    pub async fn shutdown(self, timeout: Duration) {
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "failed to queue MQTT disconnect");
        }

        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => info!("MQTT consumer stopped"),
            Err(_) => {
                warn!(timeout = ?timeout, "MQTT consumer did not stop in time, aborting");
                task.abort();
            }
        }
        self.status.set(false);
    }
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("connected", &self.status.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::BroadcastPolicy;
    use crate::reading::types::fixtures::sample_reading;
    use crate::reading::SensorPayload;
    use crate::storage::SqliteStore;
    use crate::websocket::{ConnectionHub, HubConfig};

    #[test]
    fn test_parse_broker_address() {
        assert_eq!(
            parse_broker_address("tcp://broker.local:1884").unwrap(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(
            parse_broker_address("mqtt://10.0.0.5").unwrap(),
            ("10.0.0.5".to_string(), DEFAULT_MQTT_PORT)
        );
        assert_eq!(
            parse_broker_address("localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_address(" broker ").unwrap(),
            ("broker".to_string(), DEFAULT_MQTT_PORT)
        );
    }

    #[test]
    fn test_parse_broker_address_rejects() {
        assert!(matches!(
            parse_broker_address("ws://broker:80"),
            Err(ConnectError::InvalidAddress(_))
        ));
        assert!(parse_broker_address("tcp://broker:port").is_err());
        assert!(parse_broker_address("tcp://:1883").is_err());
        assert!(parse_broker_address("").is_err());
    }

    #[test]
    fn test_qos_from_level() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_level(3), Err(SubscribeError::InvalidQos(3))));
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_block_next() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let hub = ConnectionHub::spawn(HubConfig::default());
        let (handle, mut queue) = hub.subscriber_channel();
        hub.register(handle).await.unwrap();
        let pipeline = IngestPipeline::new(store.clone(), hub, BroadcastPolicy::Always);

        assert!(handle_payload(&pipeline, "ews/sensor", b"{\"waktu\": \"soon\"}").is_none());
        assert!(handle_payload(&pipeline, "ews/sensor", b"not json").is_none());

        let valid = serde_json::to_vec(&SensorPayload::from_reading(&sample_reading(
            1_700_000_000_000,
        )))
        .unwrap();
        handle_payload(&pipeline, "ews/sensor", &valid)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let received = queue.recv().await.unwrap();
        assert_eq!(received.temperature, 28.5);
        assert_eq!(received.timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[tokio::test]
    async fn test_connect_unreachable_broker() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = IngestPipeline::new(
            store,
            ConnectionHub::spawn(HubConfig::default()),
            BroadcastPolicy::Always,
        );
        let config = MqttConfig {
            broker: "tcp://127.0.0.1:1".to_string(),
            connect_timeout_secs: 2,
            ..Default::default()
        };

        let err = MqttConsumer::connect(&config, pipeline).await.err().unwrap();
        assert!(matches!(
            err,
            ConnectError::Connection(_) | ConnectError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = IngestPipeline::new(
            store,
            ConnectionHub::spawn(HubConfig::default()),
            BroadcastPolicy::Always,
        );
        let config = MqttConfig {
            broker: "http://broker:1883".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            MqttConsumer::connect(&config, pipeline).await,
            Err(ConnectError::InvalidAddress(_))
        ));
    }
}
