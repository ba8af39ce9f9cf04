//! Store capability
//!
//! The ingest pipeline depends on this trait only, never on a concrete
//! database. Implementations must be safe to call from many tasks at once.

use async_trait::async_trait;

use crate::reading::{Reading, StoredReading};
use crate::storage::error::StoreResult;

/// Durable sink for readings
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist a reading, returning it with its assigned identity
    async fn write(&self, reading: &Reading) -> StoreResult<StoredReading>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::storage::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A store that is always down
    #[derive(Default)]
    pub struct FailingStore {
        pub attempts: AtomicUsize,
    }

    #[async_trait]
    impl ReadingStore for FailingStore {
        async fn write(&self, _reading: &Reading) -> StoreResult<StoredReading> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// A store whose writes hang until permits are released
    pub struct StalledStore {
        pub gate: tokio::sync::Semaphore,
    }

    impl Default for StalledStore {
        fn default() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadingStore for StalledStore {
        async fn write(&self, _reading: &Reading) -> StoreResult<StoredReading> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Err(StoreError::Unavailable("busy".to_string()))
        }
    }
}
