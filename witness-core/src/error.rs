use thiserror::Error;
use std::path::PathBuf;
use crate::document::DocumentId;

/// The main result type for witness-core operations.
pub type WitnessResult<T> = Result<T, WitnessError>;

/// Typed failure of an embedding call. Never carries a raw transport error
/// past the embedder boundary, only its description.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedError {
    #[error("Cannot embed empty text")]
    EmptyInput,

    #[error("Embedding request failed: {0}")]
    Network(String),

    #[error("Embedding quota exceeded: {0}")]
    Quota(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Embedding request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Enum representing possible errors within the witness-core library.
#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding failure: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    #[error("Document ID already exists: {0}")]
    AlreadyExists(DocumentId),

    #[error("Vector index not found: {0}")]
    IndexNotFound(String),

    #[error("Operation is not supported: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error accessing path {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WitnessError {
    fn from(err: serde_json::Error) -> Self {
        WitnessError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_error_display_configuration() {
        let err = WitnessError::Configuration("GEMINI_API_KEY is not set".to_string());
        assert_eq!(format!("{}", err), "Configuration error: GEMINI_API_KEY is not set");
    }

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = WitnessError::DimensionMismatch { expected: 768, actual: 3 };
        assert_eq!(format!("{}", err), "Vector dimension mismatch: expected 768, got 3");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = WitnessError::NotFound("doc-1".to_string());
        assert_eq!(format!("{}", err), "Document not found: doc-1");
    }

    #[test]
    fn test_embed_error_wraps_into_witness_error() {
        let err: WitnessError = EmbedError::Quota("429".to_string()).into();
        assert!(matches!(err, WitnessError::Embedding(EmbedError::Quota(_))));
        assert_eq!(format!("{}", err), "Embedding failure: Embedding quota exceeded: 429");
    }

    #[test]
    fn test_embed_timeout_display() {
        let err = EmbedError::Timeout(Duration::from_secs(5));
        assert_eq!(format!("{}", err), "Embedding request timed out after 5s");
    }

    #[test]
    fn test_error_display_io_error() {
        let path = PathBuf::from("/tmp/store.json");
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = WitnessError::IoError { path, source: io_err };
        assert!(format!("{}", err).contains("I/O error accessing path \"/tmp/store.json\""));
        assert!(format!("{}", err).contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WitnessError = json_err.into();
        assert!(matches!(err, WitnessError::Serialization(_)));
    }
}
