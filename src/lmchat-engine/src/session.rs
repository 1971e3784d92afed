//! Chat session: model selection and the request/stream/fold loop.
//!
//! A session owns the client, the model list, the active selection and the
//! transcript of one conversation. `send` borrows the session mutably for the
//! whole exchange, so only one request can be in flight.

use futures::StreamExt;
use lmchat_lmstudio::{ChatRequest, LMStudioClient, Model};
use tracing::{debug, info, warn};

use crate::attachments::ImageAttachment;
use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::transcript::Transcript;

/// Assistant text used when a non-streaming reply carries no content.
pub const NO_CONTENT: &str = "No content returned.";

/// How an exchange ended. Failures are also recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed,
    Failed { message: String },
}

impl ReplyOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// State of one conversation with a local model server.
pub struct ChatSession {
    client: LMStudioClient,
    models: Vec<Model>,
    selected_model: Option<String>,
    connection_error: Option<String>,
    transcript: Transcript,
    stream: bool,
    temperature: f32,
}

impl ChatSession {
    pub fn new(client: LMStudioClient) -> Self {
        Self {
            client,
            models: Vec::new(),
            selected_model: None,
            connection_error: None,
            transcript: Transcript::new(),
            stream: true,
            temperature: lmchat_lmstudio::DEFAULT_TEMPERATURE,
        }
    }

    /// Build a session from persisted settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(LMStudioClient::new(settings.base_url.clone()))
            .with_streaming(settings.stream)
            .with_temperature(settings.temperature)
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Point the session at another server. The model list is stale until
    /// the next [`ChatSession::refresh_models`].
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.client = LMStudioClient::new(base_url);
        debug!(base_url = %self.client.base_url(), "Base URL changed");
    }

    pub fn is_streaming_enabled(&self) -> bool {
        self.stream
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Message of the last failed model refresh.
    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Start a fresh conversation with the same model.
    pub fn clear_transcript(&mut self) {
        self.transcript.reset_on_model_change();
    }

    /// Re-fetch the model list.
    ///
    /// Keeps the current selection if it is still listed, otherwise selects
    /// the first model. On failure the list is cleared and the error is kept
    /// as the connection banner. The selection and transcript survive an
    /// unreachable server; a server that answers with an error status clears
    /// the selection.
    pub async fn refresh_models(&mut self) -> Result<&[Model]> {
        self.connection_error = None;

        match self.client.fetch_models().await {
            Ok(models) => {
                info!(count = models.len(), base_url = %self.client.base_url(), "Models refreshed");
                let next = match &self.selected_model {
                    Some(current) if models.iter().any(|m| &m.id == current) => {
                        Some(current.clone())
                    }
                    _ => models.first().map(|m| m.id.clone()),
                };
                self.models = models;
                self.set_selection(next);
                Ok(&self.models)
            }
            Err(e) => {
                warn!(error = %e, "Model refresh failed");
                self.connection_error = Some(e.to_string());
                self.models.clear();
                if !e.is_connectivity() {
                    self.set_selection(None);
                }
                Err(e.into())
            }
        }
    }

    /// Select a listed model. Changing the selection clears the transcript.
    pub fn select_model(&mut self, model_id: &str) -> Result<()> {
        if !self.models.iter().any(|m| m.id == model_id) {
            return Err(EngineError::UnknownModel(model_id.to_string()));
        }
        self.set_selection(Some(model_id.to_string()));
        Ok(())
    }

    fn set_selection(&mut self, model: Option<String>) {
        if self.selected_model == model {
            return;
        }
        info!(from = ?self.selected_model, to = ?model, "Model selection changed");
        self.selected_model = model;
        if !self.transcript.is_empty() {
            self.transcript.reset_on_model_change();
        }
    }

    /// Send a user message and fold the reply into the transcript.
    ///
    /// `on_update` runs after every transcript change so the caller can
    /// re-render. Server and transport failures do not return `Err`: they end
    /// the exchange as [`ReplyOutcome::Failed`] and leave a system turn.
    pub async fn send<F>(
        &mut self,
        text: &str,
        attachments: Vec<ImageAttachment>,
        mut on_update: F,
    ) -> Result<ReplyOutcome>
    where
        F: FnMut(&Transcript),
    {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let model = self
            .selected_model
            .clone()
            .ok_or(EngineError::NoModelSelected)?;
        if self.transcript.is_streaming() {
            return Err(EngineError::AlreadyStreaming);
        }

        self.transcript.append_user_turn(text, attachments);
        let request = ChatRequest::new(model, self.transcript.request_messages())
            .with_temperature(self.temperature);
        on_update(&self.transcript);

        self.transcript.begin_assistant_turn()?;
        on_update(&self.transcript);

        let result = if self.stream {
            self.stream_reply(&request, &mut on_update).await
        } else {
            self.complete_reply(&request).await
        };

        let outcome = match result {
            Ok(()) => {
                self.transcript.complete_streaming();
                ReplyOutcome::Completed
            }
            Err(e) => {
                warn!(error = %e, "Chat request failed");
                let message = error_turn_text(&e);
                self.transcript.fail_streaming(message.clone());
                ReplyOutcome::Failed { message }
            }
        };
        on_update(&self.transcript);
        Ok(outcome)
    }

    async fn stream_reply<F>(
        &mut self,
        request: &ChatRequest,
        on_update: &mut F,
    ) -> lmchat_lmstudio::Result<()>
    where
        F: FnMut(&Transcript),
    {
        let mut deltas = self.client.stream_chat_completion(request).await?;
        let mut count = 0usize;
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            self.transcript.fold_delta(&delta);
            count += 1;
            on_update(&self.transcript);
        }
        debug!(deltas = count, "Stream finished");
        Ok(())
    }

    async fn complete_reply(&mut self, request: &ChatRequest) -> lmchat_lmstudio::Result<()> {
        let response = self.client.chat_completion(request).await?;
        let content = response
            .content()
            .filter(|c| !c.is_empty())
            .unwrap_or(NO_CONTENT);
        self.transcript.fold_delta(content);
        Ok(())
    }
}

fn error_turn_text(err: &lmchat_lmstudio::LMStudioError) -> String {
    format!("Error: {err}. Ensure LM Studio is running and the model is loaded.")
}
