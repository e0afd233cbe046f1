//! Error types for pcat-ingest
//!
//! None of these are fatal to a batch: source failures shrink the candidate pool,
//! classifier failures fall through to the fuzzy and default tiers, and cache
//! failures only cost a cache write. Only `pcat_common::Error` from the product
//! store can stop a run.

use thiserror::Error;

/// Failure talking to the AI classifier or interpreting its answer
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Network or transport failure
    #[error("Classifier service error: {0}")]
    Service(String),

    /// Service answered with a non-success status
    #[error("Classifier API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response did not contain a parseable JSON object
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Classifier cannot run with the current configuration
    #[error("Classifier not configured: {0}")]
    NotConfigured(String),
}

impl ClassifierError {
    /// Whether a retry could plausibly succeed
    ///
    /// Connection failures, rate limiting (429) and server errors (5xx) are
    /// transient. Client errors and malformed output are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Service(_) => true,
            ClassifierError::Api { status, .. } => *status == 429 || *status >= 500,
            ClassifierError::MalformedResponse(_) | ClassifierError::NotConfigured(_) => false,
        }
    }
}

/// Failure of a source adapter
#[derive(Debug, Error)]
pub enum SourceError {
    /// One identifier could not be fetched; the round continues
    #[error("Transient source failure: {0}")]
    Transient(String),

    /// The source cannot serve this round at all
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Classification cache file failure
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Cache write error: {0}")]
    Write(#[from] pcat_common::Error),
}
