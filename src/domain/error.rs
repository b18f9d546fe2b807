use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("A download is already in progress for this pane")]
    Busy,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response is missing the {0} header")]
    MissingHeader(&'static str),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to extract {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Decompression of {path} failed with exit code {code:?}")]
    DecompressionFailed { path: PathBuf, code: Option<i32> },

    #[error("Tool dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<crate::api::ApiError> for AppError {
    fn from(e: crate::api::ApiError) -> Self {
        match e {
            crate::api::ApiError::MissingHeader(name) => AppError::MissingHeader(name),
            other => AppError::Network(other.to_string()),
        }
    }
}
