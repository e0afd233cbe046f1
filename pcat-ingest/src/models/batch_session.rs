//! Batch workflow state machine
//!
//! A batch progresses FILTERING → COLLECTING → CONSOLIDATING → CLASSIFYING →
//! PERSISTING → COMPLETED, or ends early in CANCELLED / FAILED.

use chrono::{DateTime, Utc};
use pcat_common::events::{BatchState, CatalogEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Non-fatal problem recorded during a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    /// Source name or pipeline stage
    pub stage: String,
    pub identifier: Option<String>,
    pub message: String,
}

/// Progress of the current phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    /// 0.0 - 100.0
    pub percentage: f64,
    pub current_operation: String,
    /// Seconds since the current phase began
    pub elapsed_seconds: u64,
    /// None until at least one item finished
    pub estimated_remaining_seconds: Option<u64>,
    pub phase_started_at: DateTime<Utc>,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            current_operation: String::from("Initializing..."),
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
            phase_started_at: Utc::now(),
        }
    }
}

/// One batch run (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSession {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub progress: BatchProgress,
    pub errors: Vec<BatchError>,
    pub started_at: DateTime<Utc>,
    /// Set on reaching a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchSession {
    pub fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            state: BatchState::Filtering,
            progress: BatchProgress::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state, returning the event to broadcast
    pub fn transition_to(&mut self, new_state: BatchState) -> CatalogEvent {
        let event = CatalogEvent::BatchStateChanged {
            batch_id: self.batch_id,
            old_state: self.state,
            new_state,
            timestamp: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        event
    }

    /// Start timing a new phase of `total` items
    pub fn begin_phase(&mut self, total: usize, operation: impl Into<String>) {
        self.progress = BatchProgress {
            total,
            current_operation: operation.into(),
            phase_started_at: Utc::now(),
            ..Default::default()
        };
    }

    /// Update progress within the current phase
    ///
    /// ETA is the average time per finished item times the items left.
    pub fn update_progress(&mut self, current: usize, operation: impl Into<String>) {
        let total = self.progress.total;
        self.progress.current = current;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation.into();

        let elapsed = (Utc::now() - self.progress.phase_started_at)
            .num_seconds()
            .max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        self.progress.estimated_remaining_seconds = if current > 0 && total > current {
            let rate = elapsed as f64 / current as f64;
            Some(((total - current) as f64 * rate) as u64)
        } else if current > 0 && current >= total {
            Some(0)
        } else {
            None
        };
    }

    pub fn add_error(
        &mut self,
        stage: impl Into<String>,
        identifier: Option<&str>,
        message: impl Into<String>,
    ) {
        self.errors.push(BatchError {
            stage: stage.into(),
            identifier: identifier.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for BatchSession {
    fn default() -> Self {
        Self::new()
    }
}
