//! lmchat engine
//!
//! Owns the conversation state of one chat with a local model:
//! - [`Transcript`] - ordered turns, folded in place while a reply streams
//! - [`split_reasoning`] - separates a `<think>` span from the visible answer
//! - [`ThoughtPanel`] - collapse policy for the reasoning span
//! - [`ChatSession`] - model selection and the request/stream/fold loop
//! - [`Settings`] - persisted connection and display preferences

pub mod attachments;
pub mod config;
pub mod error;
pub mod reasoning;
pub mod session;
pub mod transcript;

pub use attachments::ImageAttachment;
pub use config::{LMCHAT_HOME_ENV, Settings, Theme, find_lmchat_home};
pub use error::{EngineError, Result};
pub use reasoning::{SplitResult, THINK_CLOSE, THINK_OPEN, ThoughtPanel, split_reasoning};
pub use session::{ChatSession, ReplyOutcome};
pub use transcript::{ConversationTurn, Role, Transcript};

pub use lmchat_lmstudio::{LMStudioClient, LMStudioError, Model};
