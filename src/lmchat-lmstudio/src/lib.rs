//! LM Studio client for lmchat
//!
//! This crate talks to a locally hosted OpenAI-compatible inference server
//! (LM Studio, llama.cpp server, ...): it lists models, sends chat completions
//! and decodes streamed `text/event-stream` bodies into content deltas.

mod client;
mod models;
mod stream;

pub use client::LMStudioClient;
pub use models::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent,
    Model, ModelsResponse, ResponseMessage, Usage,
};
pub use stream::{DeltaStream, SseDecoder, decode_deltas};

/// Default LM Studio server URL (without the `/v1` suffix).
pub const DEFAULT_LMSTUDIO_URL: &str = "http://127.0.0.1:1234";

/// Sampling temperature sent with every chat request unless overridden.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Error types for LM Studio operations
#[derive(Debug, thiserror::Error)]
pub enum LMStudioError {
    /// The request never reached the server.
    #[error("Could not connect to {url}: {message}")]
    Connection { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The connection dropped while a streamed body was being read.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The server answered 2xx with a body that is not the expected JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LMStudioError {
    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened before any server answered.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type for LM Studio operations
pub type Result<T> = std::result::Result<T, LMStudioError>;
