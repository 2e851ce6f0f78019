//! Detector description error types.

use thiserror::Error;
use trackpix_core::ModuleId;

/// Result type for detector description operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Detector description error types.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Description parsed but is inconsistent.
    #[error("invalid detector description: {0}")]
    InvalidDescription(String),

    /// Two modules share an identifier.
    #[error("duplicate module identifier: {0}")]
    DuplicateModule(ModuleId),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] trackpix_core::Error),
}
