//! Reading types
//!
//! - `Reading`: one sensor sample, immutable once handed to the hub
//! - `StoredReading`: a reading after the store assigned identity and timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DecodeError;

/// A single sensor telemetry sample
///
/// `timestamp` is the instant of capture on the sensor, not of receipt.
/// Values are taken as reported; no physical-range clamping is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Capture instant
    pub timestamp: DateTime<Utc>,
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Air pressure in hPa
    pub pressure: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// CO₂ concentration in ppm
    pub co2: f64,
    /// Distance (water level sensor) in cm
    pub distance: f64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Wind direction in degrees, conventionally [0, 360)
    pub wind_direction: f64,
    /// Rainfall in mm
    pub rainfall: f64,
    /// Sensor supply voltage in V
    pub voltage: f64,
    /// Bus voltage in V
    pub bus_voltage: f64,
    /// Current draw in mA
    pub current: f64,
}

impl Reading {
    /// Decode a reading written in the persisted field naming
    ///
    /// Every field is required; unknown fields (such as `id`) are ignored.
    pub fn from_json(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Capture instant as Unix milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// A reading as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    /// Store-assigned identity
    pub id: i64,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
    /// The reading itself
    #[serde(flatten)]
    pub reading: Reading,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A reading with distinct values in every field
    pub fn sample_reading(timestamp_ms: i64) -> Reading {
        Reading {
            timestamp: DateTime::from_timestamp_millis(timestamp_ms).unwrap(),
            temperature: 28.5,
            humidity: 77.0,
            pressure: 1008.2,
            altitude: 41.5,
            co2: 412.0,
            distance: 120.4,
            wind_speed: 3.2,
            wind_direction: 270.0,
            rainfall: 0.8,
            voltage: 4.9,
            bus_voltage: 5.02,
            current: 131.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_reading;
    use super::*;

    #[test]
    fn test_serialize_uses_persisted_names() {
        let json = serde_json::to_string(&sample_reading(1_700_000_000_000)).unwrap();
        assert!(json.contains("\"timestamp\":\"2023-11-14T22:13:20Z\""));
        assert!(json.contains("\"windSpeed\":3.2"));
        assert!(json.contains("\"windDirection\":270.0"));
        assert!(json.contains("\"busVoltage\":5.02"));
        assert!(json.contains("\"current\":131.5"));
    }

    #[test]
    fn test_from_json_accepts_persisted_body() {
        let body = br#"{
            "id": 99,
            "timestamp": "2023-11-14T22:13:20Z",
            "temperature": 28.5, "humidity": 77.0, "pressure": 1008.2,
            "altitude": 41.5, "co2": 412.0, "distance": 120.4,
            "windSpeed": 3.2, "windDirection": 270.0, "rainfall": 0.8,
            "voltage": 4.9, "busVoltage": 5.02, "current": 131.5
        }"#;

        let reading = Reading::from_json(body).unwrap();
        assert_eq!(reading, sample_reading(1_700_000_000_000));
    }

    #[test]
    fn test_from_json_rejects_missing_field() {
        let body = br#"{"timestamp": "2023-11-14T22:13:20Z", "temperature": 28.5}"#;
        let err = Reading::from_json(body).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField(_)));
    }

    #[test]
    fn test_from_json_rejects_non_numeric() {
        let mut value = serde_json::to_value(sample_reading(0)).unwrap();
        value["humidity"] = serde_json::json!("wet");
        let body = serde_json::to_vec(&value).unwrap();

        let err = Reading::from_json(&body).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField(_)));
    }

    #[test]
    fn test_stored_reading_flattens_reading() {
        let stored = StoredReading {
            id: 7,
            created_at: DateTime::from_timestamp_millis(1_700_000_001_000).unwrap(),
            updated_at: DateTime::from_timestamp_millis(1_700_000_001_000).unwrap(),
            reading: sample_reading(1_700_000_000_000),
        };

        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["temperature"], 28.5);
        assert!(value.get("reading").is_none());
        assert!(value.get("createdAt").is_some());

        let back: StoredReading = serde_json::from_value(value).unwrap();
        assert_eq!(back, stored);
    }
}
