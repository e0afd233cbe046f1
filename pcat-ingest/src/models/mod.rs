//! Data models for pcat-ingest

pub mod batch_session;
pub mod taxonomy;

pub use batch_session::{BatchError, BatchProgress, BatchSession};
pub use taxonomy::{Taxonomy, TaxonomyRow};
