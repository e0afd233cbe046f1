//! # pcat Common Library
//!
//! Shared code for the pcat catalog tools:
//! - Error types
//! - Bootstrap configuration (TOML + environment) and root folder resolution
//! - Event types (CatalogEvent) and the broadcast EventBus
//! - Human-readable time formatting for progress displays

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use error::{Error, Result};
