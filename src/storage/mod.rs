//! Reading Storage
//!
//! Durable storage for sensor readings.
//!
//! - **store**: the `ReadingStore` capability the ingest pipeline writes through
//! - **sqlite**: the SQLite-backed implementation with history queries
//! - **types**: `TimeRange` and `ReadingSummary`
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Reading → ReadingStore::write → spawn_blocking → INSERT sensor_data
//!
//! Read Path (HTTP history only):
//!   TimeRange → SELECT ... WHERE timestamp >= ? AND timestamp < ? → StoredReading
//! ```
//!
//! The bus consumer and the hub only ever see `Arc<dyn ReadingStore>`;
//! queries are inherent methods on `SqliteStore` used by the HTTP routes.

pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use store::ReadingStore;
pub use types::{ReadingSummary, TimeRange};
