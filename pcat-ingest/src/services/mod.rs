//! Batch services: identifier handling, consolidation, candidate selection,
//! similarity scoring and orchestration

pub mod consolidation;
pub mod identifiers;
pub mod orchestrator;
pub mod selection;
pub mod similarity;
pub mod working_set;

pub use orchestrator::{BatchOrchestrator, BatchReport, BatchRequest, IdentifierOutcome, SourceStats};
pub use selection::{CandidateSelector, SourcePrioritySelector};
pub use working_set::WorkingSet;
