//! Error types for the lmchat engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Client(#[from] lmchat_lmstudio::LMStudioError),

    #[error("No model selected")]
    NoModelSelected,

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("A reply is already streaming")]
    AlreadyStreaming,

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
