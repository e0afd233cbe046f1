//! Errors that can stop a catalog batch
//!
//! Everything recoverable (a flaky source, a classifier timeout, a cache write)
//! has its own error type in `pcat-ingest` and never reaches this enum. What
//! lands here is the product store, the filesystem under the root folder, or
//! the configuration being unusable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Product store query or connection failure
    #[cfg(feature = "sqlx")]
    #[error("Product store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder, working set, taxonomy or config file IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Product columns that fail to encode or decode
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/pcat/working_set.txt")?)
        }
        let err = read_missing().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }

    #[test]
    fn test_config_error_message() {
        let err = Error::Config("matching.top_k must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: matching.top_k must be positive"
        );
    }
}
