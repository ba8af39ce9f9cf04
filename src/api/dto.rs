//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::StoredReading;
use crate::storage::ReadingSummary;
use crate::websocket::HubStats;

// ============================================
// HISTORY DTOs
// ============================================

/// Query parameters for history endpoints
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Range start (RFC 3339), defaults to 24 hours before `end`
    pub start: Option<DateTime<Utc>>,
    /// Range end (RFC 3339), defaults to now
    pub end: Option<DateTime<Utc>>,
    /// Maximum readings to return
    pub limit: Option<usize>,
}

/// Reading history response, newest first
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingListResponse {
    pub readings: Vec<StoredReading>,
    pub count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Summary response
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: ReadingSummary,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    /// Store status: "ok" or "error"
    pub store: String,
    /// Sensor bus: "connected", "disconnected" or "disabled"
    pub bus: String,
    /// Connected WebSocket subscribers
    pub subscribers: usize,
    /// Broadcast and delivery totals since startup
    pub hub: HubStats,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
}
