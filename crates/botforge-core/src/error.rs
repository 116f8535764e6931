//! Error types for botforge.

use thiserror::Error;

/// Result type alias using botforge's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for botforge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Knowledge source not found
    #[error("Knowledge source not found: {0}")]
    SourceNotFound(uuid::Uuid),

    /// Ingestion job not found
    #[error("Ingestion job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Text extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Search-index read/write failed
    #[error("Index error: {0}")]
    Index(String),

    /// Outbound delivery failed
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_source_not_found() {
        let id = Uuid::nil();
        let err = Error::SourceNotFound(id);
        assert_eq!(err.to_string(), format!("Knowledge source not found: {}", id));
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("unsupported extension".to_string());
        assert_eq!(err.to_string(), "Extraction error: unsupported extension");
    }

    #[test]
    fn test_error_display_index() {
        let err = Error::Index("bulk write rejected".to_string());
        assert_eq!(err.to_string(), "Index error: bulk write rejected");
    }

    #[test]
    fn test_error_display_delivery() {
        let err = Error::Delivery("endpoint inactive".to_string());
        assert_eq!(err.to_string(), "Delivery error: endpoint inactive");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
