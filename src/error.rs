//! Error types for image conversion sessions

use thiserror::Error;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid geometry, datatype, dimension sequence or missing inputs, caught before the engine is touched
    Construction,
    /// Reported by the engine through its last-error poll
    Engine,
    /// Buffer length or sample type does not fit the block
    DataShape,
    /// Call made in the wrong session state or with bad metadata
    Usage,
    /// Filesystem, serialization or library loading
    Io,
}

/// Main error type for conversion operations
#[derive(Error, Debug)]
pub enum ImsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid dimension sequence: {0}")]
    InvalidDimensionSequence(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Data type mismatch: converter expects {expected}, got {actual}")]
    DataTypeMismatch { expected: String, actual: String },

    #[error("Data size mismatch: expected {expected} samples, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },

    #[error("Sample conversion failed: {0}")]
    DataConversion(String),

    #[error("Block index out of range: {0}")]
    BlockOutOfRange(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Failed to load engine library: {0}")]
    LibraryLoad(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ImsError {
    /// Which part of the conversion protocol raised this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimensions(_)
            | Self::InvalidDimensionSequence(_)
            | Self::UnsupportedDataType(_)
            | Self::MissingField(_)
            | Self::InvalidColor(_)
            | Self::Configuration(_) => ErrorCategory::Construction,
            Self::Engine(_) => ErrorCategory::Engine,
            Self::DataTypeMismatch { .. }
            | Self::DataSizeMismatch { .. }
            | Self::DataConversion(_)
            | Self::BlockOutOfRange(_) => ErrorCategory::DataShape,
            Self::Metadata(_) | Self::InvalidState(_) => ErrorCategory::Usage,
            Self::Io(_) | Self::LibraryLoad(_) | Self::Serialization(_) => ErrorCategory::Io,
        }
    }

    /// True when the failure came from the engine and the session must not be used further
    pub fn poisons_session(&self) -> bool {
        self.category() == ErrorCategory::Engine
    }
}

/// Specialized Result type for conversion operations
pub type Result<T> = std::result::Result<T, ImsError>;

impl From<serde_json::Error> for ImsError {
    fn from(err: serde_json::Error) -> Self {
        ImsError::Serialization(err.to_string())
    }
}
