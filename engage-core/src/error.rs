//! Error types for engage-core

use thiserror::Error;

/// Main error type for the engage-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Key-value store error
    #[error("storage error: {0}")]
    Storage(String),

    /// Tracking collector error
    #[error("collector error: {0}")]
    Collector(String),

    /// Realtime channel transport error
    #[error("channel error: {0}")]
    Channel(String),

    /// A realtime event whose payload could not be decoded
    #[error("malformed {event} event: {message}")]
    MalformedEvent { event: String, message: String },

    /// Audio or speech playback failed
    #[error("playback error: {0}")]
    Playback(String),
}

/// Result type alias for engage-core
pub type Result<T> = std::result::Result<T, Error>;
