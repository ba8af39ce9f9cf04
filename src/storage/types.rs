//! Storage query types
//!
//! - `TimeRange`: a half-open interval of capture timestamps
//! - `ReadingSummary`: aggregate statistics over a range

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{StoreError, StoreResult};

/// Time range for history queries, `[start, end)` in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range, rejecting empty or inverted ranges
    pub fn new(start: i64, end: i64) -> StoreResult<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(StoreError::InvalidTimeRange)
        }
    }

    /// Create a range from two instants
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Self> {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    /// Get the duration in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// The range of equal length immediately before this one
    pub fn preceding(&self) -> Self {
        Self {
            start: self.start - self.duration_millis(),
            end: self.start,
        }
    }
}

/// Aggregate statistics over a range of readings
///
/// All statistics are `None` when the range holds no readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSummary {
    /// Number of readings in the range
    pub count: u64,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub avg_temp: Option<f64>,
    pub min_hum: Option<f64>,
    pub max_hum: Option<f64>,
    pub avg_hum: Option<f64>,
    /// Hour of day (UTC) with the highest average temperature
    pub peak_hour: Option<u32>,
    /// Average temperature during `peak_hour`
    pub peak_hour_avg: Option<f64>,
    /// `avg_temp` minus the average temperature of the preceding range
    pub prev_period_diff: Option<f64>,
}
