use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::token::TokenError;

/// Errors raised by `FileService` while downloading a source file to the
/// per-job temp directory. `Skipped` is not a failure: callers treat it as
/// "drop this entity, increment the skip counter, keep the run going."
#[derive(Debug, ThisError)]
pub enum FileError {
    #[error("file skipped: {reason} ({filename})")]
    Skipped { reason: String, filename: String },

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    #[error("token error while downloading: {0}")]
    Token(#[from] TokenError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download exceeded the configured read timeout")]
    ReadTimeout,

    #[error("download exceeded the configured connect timeout")]
    ConnectTimeout,

    #[error("file not found in ARF store: {0}")]
    ArfNotFound(String),
}

impl IsRetryable for FileError {
    fn is_retryable(&self) -> bool {
        match self {
            FileError::Request(_) | FileError::ReadTimeout | FileError::ConnectTimeout => true,
            FileError::UpstreamStatus(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FileError::Token(e) => e.is_retryable(),
            FileError::Skipped { .. } | FileError::Io(_) | FileError::ArfNotFound(_) => false,
        }
    }
}
