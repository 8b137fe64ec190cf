use strum_macros::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;

use crate::engine::EngineError;

/// Failure classes surfaced to callers. Every [`VidQueueError`] maps onto one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum ErrorKind {
    IncorrectLink,
    ConnectionFailure,
    Timeout,
    OtherFailure,
}

impl ErrorKind {
    /// Fixed user-facing message for this kind.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::IncorrectLink => {
                "Could not access the video. Check the link and try again."
            }
            ErrorKind::ConnectionFailure => {
                "Could not connect to the platform. Check your internet connection and try again."
            }
            ErrorKind::Timeout => "The request timed out. Try again in a few minutes.",
            ErrorKind::OtherFailure => {
                "An unknown error occurred. Try again in a few minutes."
            }
        }
    }
}

#[derive(Error, Debug, IntoStaticStr)]
pub enum VidQueueError {
    #[error("Incorrect link: {0}")]
    IncorrectLink(String),

    #[error("No connection to the platform API: {0}")]
    ConnectionFailure(String),

    #[error("Timed out while {0}")]
    Timeout(String),

    #[error("Extraction engine failed: {0}")]
    Engine(#[source] EngineError),

    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("HTTP error {status} for URL: {url}")]
    HttpError { status: u16, url: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParseError(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Download reported an error status")]
    DownloadStatusError,

    #[error("Queue item not found: {0}")]
    ItemNotFound(i64),

    #[error("Worker stopped unexpectedly: {0}")]
    WorkerFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl VidQueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VidQueueError::IncorrectLink(_) => ErrorKind::IncorrectLink,
            VidQueueError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            VidQueueError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::OtherFailure,
        }
    }

    /// Type name of the underlying failure, shown next to the
    /// [`ErrorKind::OtherFailure`] message.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            VidQueueError::Engine(e) => e.into(),
            other => other.into(),
        }
    }

    /// Message plus diagnostic code, as shown to the user.
    pub fn user_message(&self) -> String {
        let kind = self.kind();
        match kind {
            ErrorKind::OtherFailure => {
                format!("{}\nError code: {}", kind.message(), self.diagnostic_code())
            }
            _ => kind.message().to_string(),
        }
    }
}

impl From<toml::de::Error> for VidQueueError {
    fn from(e: toml::de::Error) -> Self {
        VidQueueError::ConfigParseError(e.to_string())
    }
}

impl From<toml::ser::Error> for VidQueueError {
    fn from(e: toml::ser::Error) -> Self {
        VidQueueError::ConfigParseError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VidQueueError>;
