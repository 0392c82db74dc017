//! Error Handling Module
//!
//! Defines the error type shared by every stage of the crop pipeline.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for crop recommender operations
#[derive(Error, Debug)]
pub enum CropError {
    /// A crop name that was not present when the label encoding was fit
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Malformed hyperparameters, descriptors or split settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Loss became NaN or infinite during training
    #[error("Numeric divergence at epoch {epoch}: loss = {loss}")]
    NumericDivergence { epoch: usize, loss: f64 },

    /// Artifact does not match the expected architecture or format version
    #[error("Architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    /// Malformed inference request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error with dataset contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model tensors or records
    #[error("Model error: {0}")]
    Model(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CropError {
    fn from(err: serde_json::Error) -> Self {
        CropError::Serialization(err.to_string())
    }
}

/// Convenience Result type for crop recommender operations
pub type Result<T> = std::result::Result<T, CropError>;

/// Context for request-input failures; every error becomes `InvalidInput`
pub trait InputContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> InputContext<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| CropError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| CropError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> InputContext<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CropError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| CropError::InvalidInput(f()))
    }
}
