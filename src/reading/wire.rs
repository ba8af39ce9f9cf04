//! MQTT wire schema
//!
//! Sensors publish a flat JSON object with Indonesian field names and a
//! Unix-millisecond capture time. The payload is decoded once into
//! [`SensorPayload`] and then mapped field by field into [`Reading`].

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::error::DecodeError;
use super::types::Reading;

/// Payload published by the sensor station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    /// Capture time, Unix milliseconds
    pub waktu: i64,
    /// Temperature
    pub suhu: f64,
    /// Humidity
    pub lembap: f64,
    /// Pressure
    pub tekanan: f64,
    /// Altitude
    pub ketinggian: f64,
    pub co2: f64,
    /// Distance
    pub jarak: f64,
    /// Wind speed
    pub angin: f64,
    /// Wind direction
    #[serde(rename = "arahAngin")]
    pub arah_angin: f64,
    pub rain: f64,
    #[serde(rename = "voltSensor")]
    pub volt_sensor: f64,
    #[serde(rename = "busVoltage")]
    pub bus_voltage: f64,
    #[serde(rename = "current_mA")]
    pub current_ma: f64,
}

impl SensorPayload {
    /// Map the wire fields onto a [`Reading`]
    pub fn into_reading(self) -> Result<Reading, DecodeError> {
        let timestamp = DateTime::from_timestamp_millis(self.waktu)
            .ok_or(DecodeError::TimestampOutOfRange(self.waktu))?;

        Ok(Reading {
            timestamp,
            temperature: self.suhu,
            humidity: self.lembap,
            pressure: self.tekanan,
            altitude: self.ketinggian,
            co2: self.co2,
            distance: self.jarak,
            wind_speed: self.angin,
            wind_direction: self.arah_angin,
            rainfall: self.rain,
            voltage: self.volt_sensor,
            bus_voltage: self.bus_voltage,
            current: self.current_ma,
        })
    }

    /// Build the wire form of a reading (used by publishers and tests)
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            waktu: reading.timestamp_millis(),
            suhu: reading.temperature,
            lembap: reading.humidity,
            tekanan: reading.pressure,
            ketinggian: reading.altitude,
            co2: reading.co2,
            jarak: reading.distance,
            angin: reading.wind_speed,
            arah_angin: reading.wind_direction,
            rain: reading.rainfall,
            volt_sensor: reading.voltage,
            bus_voltage: reading.bus_voltage,
            current_ma: reading.current,
        }
    }
}

/// Decode a raw MQTT payload into a [`Reading`]
pub fn decode_payload(payload: &[u8]) -> Result<Reading, DecodeError> {
    let wire: SensorPayload = serde_json::from_slice(payload)?;
    wire.into_reading()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::types::fixtures::sample_reading;

    const SCENARIO: &str = r#"{
        "waktu": 1700000000000,
        "suhu": 28.5, "lembap": 77.0, "tekanan": 1008.2, "ketinggian": 41.5,
        "co2": 412.0, "jarak": 120.4, "angin": 3.2, "arahAngin": 270.0,
        "rain": 0.8, "voltSensor": 4.9, "busVoltage": 5.02, "current_mA": 131.5
    }"#;

    #[test]
    fn test_decode_maps_every_field() {
        let reading = decode_payload(SCENARIO.as_bytes()).unwrap();

        assert_eq!(reading.timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(reading, sample_reading(1_700_000_000_000));
    }

    #[test]
    fn test_wire_round_trip_keeps_milliseconds() {
        let original = sample_reading(1_700_000_000_123);
        let bytes = serde_json::to_vec(&SensorPayload::from_reading(&original)).unwrap();

        let decoded = decode_payload(&bytes).unwrap();
        assert_eq!(decoded.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(decoded.temperature.to_bits(), original.temperature.to_bits());
        assert_eq!(decoded.current.to_bits(), original.current.to_bits());
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_missing_field_rejected() {
        let payload = r#"{"waktu": 1700000000000, "suhu": 28.5, "lembap": 77.0}"#;
        let err = decode_payload(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField(_)));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_non_numeric_rejected() {
        let payload = SCENARIO.replace("\"suhu\": 28.5", "\"suhu\": \"hot\"");
        let err = decode_payload(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            decode_payload(b"[1, 2, 3]").unwrap_err(),
            DecodeError::InvalidField(_)
        ));
        assert!(matches!(
            decode_payload(b"temperature=28.5").unwrap_err(),
            DecodeError::InvalidJson(_)
        ));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let payload = SCENARIO.replace("1700000000000", &i64::MAX.to_string());
        let err = decode_payload(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::TimestampOutOfRange(_)));
    }
}
