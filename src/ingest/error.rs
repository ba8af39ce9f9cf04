//! Sensor bus errors

use std::time::Duration;
use thiserror::Error;

/// Failure to establish the bus connection
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid broker address: {0}")]
    InvalidAddress(String),

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Broker refused connection: {0}")]
    Refused(String),

    #[error("No CONNACK within {0:?}")]
    Timeout(Duration),
}

/// Failure to subscribe to the sensor topic
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Invalid QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Subscribe request failed: {0}")]
    Request(String),
}
