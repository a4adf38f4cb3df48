use thiserror::Error;

/// Central error type for the Hemlock provenance engine
#[derive(Error, Debug)]
pub enum HemlockError {
    // ============================================================================
    // Identity / Key Errors
    // ============================================================================
    #[error("Failed to load key: {0}")]
    KeyLoad(String),

    #[error("Failed to generate device identity: {0}")]
    KeyGeneration(String),

    #[error("Failed to sign provenance record: {0}")]
    SigningFailed(String),

    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    // ============================================================================
    // Provenance Errors
    // ============================================================================
    #[error("No provenance found: {0}")]
    ProvenanceMissing(String),

    #[error("Invalid grid {rows}x{cols}: {reason}")]
    InvalidGrid { rows: u32, cols: u32, reason: String },

    // ============================================================================
    // Media Errors
    // ============================================================================
    #[error("Failed to decode media: {0}")]
    MediaDecode(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Failed to save to storage: {0}")]
    StorageSaveFailed(String),

    #[error("Failed to load from storage: {0}")]
    StorageLoadFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ============================================================================
    // Job / Pipeline Errors
    // ============================================================================
    #[error("Job failed: {0}")]
    JobFailure(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Builder pattern validation error
    #[error("Builder error: {0}")]
    BuilderError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for HemlockError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        HemlockError::LockError
    }
}

// Implement conversion to String for callers that surface plain messages
impl From<HemlockError> for String {
    fn from(error: HemlockError) -> Self {
        error.to_string()
    }
}

impl From<String> for HemlockError {
    fn from(err: String) -> Self {
        HemlockError::Internal(err)
    }
}

impl From<&str> for HemlockError {
    fn from(err: &str) -> Self {
        HemlockError::Internal(err.to_string())
    }
}

// Helper type alias for Results
pub type HemlockResult<T> = Result<T, HemlockError>;
