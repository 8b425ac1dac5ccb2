//! Error types for defect-scan operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for defect-scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during defect inspection.
///
/// None of these are fatal to an enclosing service: malformed input is
/// contained at the stage that sees it, and every model failure has a
/// rule-based recovery path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to load an image file.
    #[error("Image load failed: {path}: {reason}")]
    ImageLoad {
        /// Path to the image that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Input image or feature vector rejected before processing.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model artifact is missing, unreadable or structurally incomplete.
    #[error("Model unavailable: {path}: {reason}")]
    ModelUnavailable {
        /// Path to the artifact that could not be loaded.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Feature vector does not match the schema a model was trained on.
    #[error("Feature schema mismatch: model expects {expected} values, got {actual}")]
    SchemaMismatch {
        /// Arity of the layout the model was fitted on.
        expected: usize,
        /// Arity of the vector presented at inference time.
        actual: usize,
    },

    /// Model inference failed for a reason other than a schema mismatch.
    #[error("Model inference failed: {0}")]
    ModelInference(String),

    /// Training input rejected (empty set, ragged rows, label count mismatch).
    #[error("Training error: {0}")]
    Training(String),

    /// Error reading or writing a defect record store.
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image decoding/encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
