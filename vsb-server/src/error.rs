//! Error types for vsb-server
//!
//! Every request-level failure is one of these variants. None of them is
//! fatal to the process: the HTTP boundary turns each into a response and
//! keeps serving.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the soundboard service
#[derive(Error, Debug)]
pub enum Error {
    /// Uploaded or requested identifier failed sanitization
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// No clip with this identifier exists in the library
    #[error("Sound not found: {0}")]
    SoundNotFound(String),

    /// Device name is not currently enumerated
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// An output device switch is in progress
    #[error("Audio device busy: {0}")]
    DeviceBusy(String),

    /// External transcoder failed or input was not decodable audio
    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    /// Stored clip could not be decoded
    #[error("Audio decode error: {0}")]
    DecodeFailed(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Mixing sink refused a player
    #[error("Playback error: {0}")]
    Playback(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using vsb-server Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status reported for this error at the request boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidIdentifier(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::SoundNotFound(_) | Error::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Error::DeviceBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::TranscodeFailed(_)
            | Error::DecodeFailed(_)
            | Error::AudioOutput(_)
            | Error::Playback(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<vsb_common::Error> for Error {
    fn from(e: vsb_common::Error) -> Self {
        match e {
            vsb_common::Error::Io(io) => Error::Io(io),
            vsb_common::Error::Config(msg) => Error::Config(msg),
            vsb_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
            vsb_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Background task failed: {}", e))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the log
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(Error::InvalidIdentifier("../x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::SoundNotFound("a.mp3".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::DeviceNotFound("hdmi".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::DeviceBusy("switching".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Error::TranscodeFailed("bad".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::DecodeFailed("bad".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_common_error_conversion() {
        let err: Error = vsb_common::Error::Config("broken".into()).into();
        assert!(matches!(err, Error::Config(ref m) if m == "broken"));
    }
}
