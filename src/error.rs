// src/error.rs

//! Unified error handling for the ad rotator.

use std::fmt;

use thiserror::Error;

/// Result type alias for rotator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client setup or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ad fetch failed after all retries
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Media could not be mounted
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure of a single fetch attempt, or of the whole retry sequence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The attempt did not complete within the per-attempt timeout
    #[error("ad request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The endpoint answered with a non-success status
    #[error("ad endpoint returned HTTP {0}")]
    Status(u16),

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Payload was not JSON or carried no usable media
    #[error("malformed ad payload: {0}")]
    Malformed(String),

    /// All attempts failed
    #[error("ad fetch failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Create a network error from any displayable cause.
    pub fn network(cause: impl fmt::Display) -> Self {
        Self::Network(cause.to_string())
    }

    /// Create a malformed-payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// The underlying cause, unwrapping `Exhausted`.
    pub fn root_cause(&self) -> &FetchError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status(status.as_u16());
        }
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

/// Media mount failure, always recovered inside the renderer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The host failed to load the mounted image or video
    #[error("failed to load media from {url}")]
    MediaLoad { url: String },

    /// Descriptor had nothing the slot can display
    #[error("ad {ad_id} has no displayable media")]
    NoMedia { ad_id: String },
}
