//! Conversation transcript and its reducer operations.
//!
//! The transcript is the single owned, ordered list of turns for one
//! conversation. Turns are identified by position. At most one turn is
//! streaming at a time and it is always the last one; deltas are folded into
//! it in place.

use chrono::{DateTime, Utc};
use lmchat_lmstudio::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::attachments::ImageAttachment;
use crate::error::{EngineError, Result};

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    role: Role,
    text: String,
    attachments: Vec<ImageAttachment>,
    created_at: DateTime<Utc>,
    streaming: bool,
}

impl ConversationTurn {
    fn new(role: Role, text: String, attachments: Vec<ImageAttachment>, streaming: bool) -> Self {
        Self {
            role,
            text,
            attachments,
            created_at: Utc::now(),
            streaming,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[ImageAttachment] {
        &self.attachments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Request form of this turn: plain text, or text plus image parts.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::with_images(
            self.role.as_str(),
            self.text.clone(),
            self.attachments
                .iter()
                .map(|a| a.data_url().to_string()),
        )
    }
}

/// Ordered conversation turns.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// The turn currently receiving deltas, if any.
    pub fn streaming_turn(&self) -> Option<&ConversationTurn> {
        self.turns.last().filter(|t| t.streaming)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_turn().is_some()
    }

    /// Append a finished user turn.
    ///
    /// A reply still streaming is finished first so the streaming turn stays
    /// last; an empty placeholder is dropped.
    pub fn append_user_turn(&mut self, text: impl Into<String>, attachments: Vec<ImageAttachment>) {
        if let Some(turn) = self.turns.last_mut().filter(|t| t.streaming) {
            tracing::warn!(
                partial_len = turn.text.len(),
                "Appending a user turn while a reply is still streaming"
            );
            if turn.text.is_empty() {
                self.turns.pop();
            } else {
                turn.streaming = false;
            }
        }
        self.turns
            .push(ConversationTurn::new(Role::User, text.into(), attachments, false));
    }

    /// Append the empty assistant placeholder that deltas fold into.
    pub fn begin_assistant_turn(&mut self) -> Result<()> {
        if self.turns.iter().any(|t| t.streaming) {
            return Err(EngineError::AlreadyStreaming);
        }
        self.turns.push(ConversationTurn::new(
            Role::Assistant,
            String::new(),
            Vec::new(),
            true,
        ));
        Ok(())
    }

    /// Append `delta` to the streaming assistant turn.
    ///
    /// Returns `false` and leaves the transcript untouched when the last turn
    /// is not a streaming assistant turn.
    pub fn fold_delta(&mut self, delta: &str) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.streaming && turn.role == Role::Assistant => {
                turn.text.push_str(delta);
                true
            }
            _ => {
                tracing::debug!(delta_len = delta.len(), "Dropping delta: no streaming turn");
                false
            }
        }
    }

    /// Mark the streaming turn as finished.
    pub fn complete_streaming(&mut self) {
        if let Some(turn) = self.turns.last_mut().filter(|t| t.streaming) {
            turn.streaming = false;
        }
    }

    /// Finish the streaming turn with an error.
    ///
    /// Partial output already received is kept and followed by a system turn;
    /// an empty placeholder is replaced by the system turn.
    pub fn fail_streaming(&mut self, error_message: impl Into<String>) {
        let error_turn =
            ConversationTurn::new(Role::System, error_message.into(), Vec::new(), false);

        match self.turns.last_mut() {
            Some(turn) if turn.streaming && turn.text.is_empty() => {
                *turn = error_turn;
            }
            Some(turn) if turn.streaming => {
                turn.streaming = false;
                self.turns.push(error_turn);
            }
            _ => self.turns.push(error_turn),
        }
    }

    /// Drop every turn; conversation context is scoped to one model.
    pub fn reset_on_model_change(&mut self) {
        self.turns.clear();
    }

    /// History to send with the next request. The streaming turn is excluded.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter(|t| !t.streaming)
            .map(ConversationTurn::to_chat_message)
            .collect()
    }
}
