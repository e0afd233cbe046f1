//! Utility modules for pcat-ingest

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
