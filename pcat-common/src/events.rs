//! Event types for the pcat event system
//!
//! Provides the shared event definitions and the broadcast EventBus used to report
//! batch progress to whatever surface is driving the run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Batch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchState {
    /// Identifier validation and store de-duplication
    Filtering,
    /// Source adapter rounds
    Collecting,
    /// Merging observations into candidate sets
    Consolidating,
    /// Assigning taxonomy facets
    Classifying,
    /// Writing finalized records
    Persisting,
    /// Batch finished
    Completed,
    /// Batch stopped by a cancellation request
    Cancelled,
    /// Batch could not make progress
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Cancelled | BatchState::Failed
        )
    }
}

/// pcat event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// Batch moved to a new state
    BatchStateChanged {
        batch_id: Uuid,
        old_state: BatchState,
        new_state: BatchState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A source round began
    SourceStarted {
        batch_id: Uuid,
        source: String,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One identifier attempted within a source round
    SourceProgress {
        batch_id: Uuid,
        source: String,
        identifier: String,
        current: usize,
        total: usize,
        percentage: f64,
        elapsed_seconds: u64,
        estimated_remaining_seconds: Option<u64>,
    },

    /// A source round ended
    SourceFinished {
        batch_id: Uuid,
        source: String,
        attempted: usize,
        observations: usize,
        failures: usize,
        failed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A product received its facets
    ItemClassified {
        batch_id: Uuid,
        identifier: String,
        tier: String,
        category: String,
    },

    /// The batch reached a terminal state
    BatchFinished {
        batch_id: Uuid,
        state: BatchState,
        persisted: usize,
        skipped: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for CatalogEvent
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(BatchState::Completed.is_terminal());
        assert!(BatchState::Cancelled.is_terminal());
        assert!(BatchState::Failed.is_terminal());
        assert!(!BatchState::Collecting.is_terminal());
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(4);
        let result = bus.emit(CatalogEvent::SourceStarted {
            batch_id: Uuid::new_v4(),
            source: "chewy".to_string(),
            total: 3,
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let batch_id = Uuid::new_v4();

        bus.emit_lossy(CatalogEvent::ItemClassified {
            batch_id,
            identifier: "035585499741".to_string(),
            tier: "FUZZY".to_string(),
            category: "Dog Food".to_string(),
        });

        match rx.recv().await.unwrap() {
            CatalogEvent::ItemClassified { identifier, .. } => {
                assert_eq!(identifier, "035585499741")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CatalogEvent::BatchStateChanged {
            batch_id: Uuid::nil(),
            old_state: BatchState::Filtering,
            new_state: BatchState::Collecting,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchStateChanged");
        assert_eq!(json["new_state"], "COLLECTING");
    }
}
