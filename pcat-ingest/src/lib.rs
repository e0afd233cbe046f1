//! pcat-ingest library interface
//!
//! Collects product observations from several sources, consolidates them per
//! identifier, assigns taxonomy facets and persists the result.

pub mod adapters;
pub mod classification;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{CacheError, ClassifierError, SourceError};
