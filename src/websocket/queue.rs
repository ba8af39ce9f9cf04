//! Per-subscriber outbound queue
//!
//! Each subscriber owns a bounded FIFO of readings. The hub holds the sending
//! half ([`SubscriberHandle`]) in its registry and the connection's outbound
//! loop drains the receiving half ([`OutboundQueue`]). Dropping the handle
//! closes the queue, which is how the hub tells a connection to go away.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::reading::Reading;

/// Unique identifier for a subscriber connection
pub type ConnectionId = Uuid;

/// Create a connected handle/queue pair with room for `capacity` readings
pub fn subscriber_channel(capacity: usize) -> (SubscriberHandle, OutboundQueue) {
    let id = Uuid::new_v4();
    let (sender, receiver) = mpsc::channel(capacity.max(1));

    (
        SubscriberHandle {
            id,
            sender,
            consecutive_drops: 0,
        },
        OutboundQueue { id, receiver },
    )
}

/// Outcome of offering a reading to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queue was full; the reading was dropped
    Dropped { consecutive: u32 },
    /// The connection has gone away
    Closed,
}

/// Hub-side handle for a subscriber
#[derive(Debug)]
pub struct SubscriberHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Arc<Reading>>,
    consecutive_drops: u32,
}

impl SubscriberHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue without waiting, tracking consecutive drops
    pub fn offer(&mut self, reading: &Arc<Reading>) -> Offer {
        match self.sender.try_send(Arc::clone(reading)) {
            Ok(()) => {
                self.consecutive_drops = 0;
                Offer::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.consecutive_drops = self.consecutive_drops.saturating_add(1);
                Offer::Dropped {
                    consecutive: self.consecutive_drops,
                }
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }
}

/// Connection-side end of a subscriber's queue
#[derive(Debug)]
pub struct OutboundQueue {
    id: ConnectionId,
    receiver: mpsc::Receiver<Arc<Reading>>,
}

impl OutboundQueue {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next reading in FIFO order, or `None` once the hub dropped the handle
    /// and the queue is drained
    pub async fn recv(&mut self) -> Option<Arc<Reading>> {
        self.receiver.recv().await
    }

    /// Next reading if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<Reading>> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::types::fixtures::sample_reading;

    #[test]
    fn test_pair_shares_id() {
        let (handle, queue) = subscriber_channel(4);
        assert_eq!(handle.id(), queue.id());
    }

    #[test]
    fn test_offer_counts_consecutive_drops() {
        let (mut handle, mut queue) = subscriber_channel(2);
        let reading = Arc::new(sample_reading(0));

        assert_eq!(handle.offer(&reading), Offer::Queued);
        assert_eq!(handle.offer(&reading), Offer::Queued);
        assert_eq!(handle.offer(&reading), Offer::Dropped { consecutive: 1 });
        assert_eq!(handle.offer(&reading), Offer::Dropped { consecutive: 2 });

        // Draining one slot lets the next offer through and resets the count
        assert!(queue.try_recv().is_some());
        assert_eq!(handle.offer(&reading), Offer::Queued);
        assert_eq!(handle.offer(&reading), Offer::Dropped { consecutive: 1 });
    }

    #[test]
    fn test_offer_after_queue_dropped() {
        let (mut handle, queue) = subscriber_channel(2);
        drop(queue);

        assert_eq!(handle.offer(&Arc::new(sample_reading(0))), Offer::Closed);
    }

    #[test]
    fn test_fifo_order() {
        let (mut handle, mut queue) = subscriber_channel(4);
        for ms in [1, 2, 3] {
            handle.offer(&Arc::new(sample_reading(ms)));
        }
        drop(handle);

        let order: Vec<i64> = std::iter::from_fn(|| queue.try_recv())
            .map(|r| r.timestamp_millis())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (mut handle, _queue) = subscriber_channel(0);
        assert_eq!(handle.offer(&Arc::new(sample_reading(0))), Offer::Queued);
    }
}
