//! Sensor Readings
//!
//! The domain value that flows through the whole pipeline:
//!
//! - **types**: `Reading` (one telemetry sample) and `StoredReading`
//!   (a reading plus the identity and timestamps assigned by the store)
//! - **wire**: the MQTT payload schema and its mapping into `Reading`
//! - **error**: decode errors shared by the bus consumer and the HTTP entry point
//!
//! # Field mapping
//!
//! Sensors publish short Indonesian field names; everything past the
//! decode step uses the English names of the persisted schema.
//!
//! ```text
//! waktu      -> timestamp      (Unix ms)
//! suhu       -> temperature    (°C)
//! lembap     -> humidity       (%)
//! tekanan    -> pressure       (hPa)
//! ketinggian -> altitude       (m)
//! co2        -> co2            (ppm)
//! jarak      -> distance       (cm)
//! angin      -> windSpeed      (m/s)
//! arahAngin  -> windDirection  (degrees)
//! rain       -> rainfall       (mm)
//! voltSensor -> voltage        (V)
//! busVoltage -> busVoltage     (V)
//! current_mA -> current        (mA)
//! ```

pub mod error;
pub mod types;
pub mod wire;

pub use error::DecodeError;
pub use types::{Reading, StoredReading};
pub use wire::{decode_payload, SensorPayload};
