//! Error types for media operations.

use std::time::Duration;

use batchpix_models::FailureKind;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching or transcoding an image.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed(message.into())
    }

    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Task failure kind this error is reported as.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            MediaError::Timeout(_) => FailureKind::FetchTimeout,
            MediaError::DownloadFailed { .. } => FailureKind::FetchError,
            MediaError::DecodeFailed(_)
            | MediaError::EncodeFailed(_)
            | MediaError::UnsupportedFormat(_)
            | MediaError::Internal(_) => FailureKind::TranscodeError,
            MediaError::Io(_) => FailureKind::OutputWrite,
        }
    }
}
