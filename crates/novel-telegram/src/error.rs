//! Error types for the Telegram bot.

use thiserror::Error;

use novel_assistant::GatewayError;
use novel_core::ConfigError;
use novel_engine::EngineError;
use novel_persistence::PersistenceError;

/// Errors that can occur in the Telegram bot.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Configuration missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session store failure.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    /// Assistant service failure outside of a turn.
    #[error("Assistant error: {0}")]
    Gateway(#[from] GatewayError),

    /// Engine failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),

    /// Scenario file needed to create the assistant could not be read.
    #[error("Scenario file {path} unreadable: {source}")]
    ScenarioMissing {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image reference with characters a storage id never has.
    #[error("Invalid image id: {0}")]
    InvalidImageId(String),

    /// Image storage answered with a failure status or an empty body.
    #[error("Image {image_id} download failed with status {status}")]
    ImageDownload { image_id: String, status: u16 },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::HttpError(e.to_string())
    }
}
