//! LM Studio client implementation

use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::models::{ApiErrorBody, ChatRequest, ChatResponse, Model, ModelsResponse};
use crate::stream::{DeltaStream, decode_deltas};
use crate::{LMStudioError, Result};

/// Client for interacting with an OpenAI-compatible local server
#[derive(Clone)]
pub struct LMStudioClient {
    client: reqwest::Client,
    base_url: String,
}

impl LMStudioClient {
    /// Create a new client for the given base URL
    ///
    /// # Arguments
    /// * `base_url` - Server root, e.g. "http://127.0.0.1:1234". A trailing
    ///   slash is dropped; `/v1/...` is appended per endpoint.
    pub fn new(base_url: impl Into<String>) -> Self {
        // No overall timeout: streamed generations may run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: normalize_base_url(&base_url.into()),
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn connection_error(url: &str, err: reqwest::Error) -> LMStudioError {
        tracing::error!(error = %err, url = %url, "Request failed");
        LMStudioError::Connection {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Fetch the list of available models from the server
    pub async fn fetch_models(&self) -> Result<Vec<Model>> {
        let url = self.endpoint("models");
        tracing::debug!(url = %url, "Fetching models");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::connection_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, url = %url, "Model listing failed");
            return Err(LMStudioError::Http {
                status: status.as_u16(),
                message: format!("Failed to fetch models. Status: {}", status.as_u16()),
            });
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| LMStudioError::InvalidResponse(format!("models list: {e}")))?;
        tracing::debug!(count = models.data.len(), "Models received");
        Ok(models.data)
    }

    /// Send a non-streaming chat completion request
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.endpoint("chat/completions");
        let body = request.clone().with_stream(false);
        tracing::info!(url = %url, model = %body.model, messages = body.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::connection_error(&url, e))?;

        let response = error_for_status(response).await?;
        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LMStudioError::InvalidResponse(format!("chat completion: {e}")))?;
        Ok(chat_response)
    }

    /// Send a streaming chat completion request.
    ///
    /// Fails before any delta is produced when the server is unreachable or
    /// answers with a non-success status.
    pub async fn stream_chat_completion(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let url = self.endpoint("chat/completions");
        let body = request.clone().with_stream(true);
        tracing::info!(url = %url, model = %body.model, messages = body.messages.len(), "Sending streaming chat completion");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::connection_error(&url, e))?;

        let response = error_for_status(response).await?;
        tracing::debug!(status = %response.status(), "Stream opened");
        Ok(decode_deltas(response.bytes_stream()))
    }
}

/// Map a non-success chat response to [`LMStudioError::Http`], preferring the
/// server-supplied `error.message`.
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = ApiErrorBody::message_from(&body).unwrap_or_else(|| generic_status_message(status));
    tracing::error!(status = %status, body = %body, "Chat completion failed");
    Err(LMStudioError::Http {
        status: status.as_u16(),
        message,
    })
}

fn generic_status_message(status: StatusCode) -> String {
    format!("API Error: {}", status.as_u16())
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
