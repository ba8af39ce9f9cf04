//! Reading ingestion
//!
//! Two producers feed the same pipeline:
//!
//! - **mqtt**: the sensor bus consumer, decoding wire payloads
//! - the HTTP create endpoint (`api::routes::readings`)
//!
//! Both go through [`IngestPipeline`], which persists a reading and then
//! offers it to the hub according to the configured [`BroadcastPolicy`].

pub mod error;
pub mod mqtt;
pub mod pipeline;

pub use error::{ConnectError, SubscribeError};
pub use mqtt::{BusStatus, ConsumerHandle, MqttConsumer};
pub use pipeline::{BroadcastPolicy, IngestPipeline};
