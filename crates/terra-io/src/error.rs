//! Error types for terra-io

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported project version: {found} (expected {expected})")]
    UnsupportedVersion { found: String, expected: String },

    #[error("invalid project data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
