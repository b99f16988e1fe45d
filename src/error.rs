//! Error types for oobleck-codec.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error, including contract violations raised inside layers.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Invalid or incomplete model configuration.
    #[error("config: {0}")]
    Config(String),

    /// Call-time shape or contract violation.
    #[error("contract: {0}")]
    Contract(String),

    /// Audio file error (WAV I/O).
    #[error("audio: {0}")]
    Audio(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}
