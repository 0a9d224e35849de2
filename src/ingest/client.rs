//! Upstream chat endpoint.
//!
//! [`Transport`] is the seam between the pipeline and the network;
//! [`HttpTransport`] is the reqwest implementation.

use crate::config::EndpointConfig;
use crate::core::{Conversation, Message, Role};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use tracing::debug;

/// Stream of raw body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Request body sent to both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's new message.
    pub prompt: String,
    /// Earlier messages, oldest first.
    pub conversation_context: Vec<ContextMessage>,
}

/// One prior message as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
}

impl ChatRequest {
    /// Build a request for `prompt`, using every settled message before
    /// `prompt_message_id` as context.
    #[must_use]
    pub fn for_prompt(conversation: &Conversation, prompt_message_id: &str) -> Self {
        let mut prompt = String::new();
        let mut context = Vec::new();
        for message in &conversation.messages {
            if message.id == prompt_message_id {
                prompt.clone_from(&message.content);
                break;
            }
            if is_context(message) {
                context.push(ContextMessage {
                    role: message.role,
                    content: message.content.clone(),
                });
            }
        }
        Self {
            prompt,
            conversation_context: context,
        }
    }
}

/// Failed and unfinished replies are not sent back upstream.
fn is_context(message: &Message) -> bool {
    match message.status {
        None => true,
        Some(status) => status == crate::core::MessageStatus::Sent,
    }
}

/// Single-shot response from the non-streaming endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Complete reply text.
    pub answer: String,
    /// Per-source auxiliary answers.
    #[serde(default, alias = "auxiliary_answers")]
    pub auxiliary_answers: BTreeMap<String, Value>,
    /// Audit events.
    #[serde(default, alias = "audit_events")]
    pub audit_events: Vec<Value>,
}

/// Result of asking for a stream.
pub enum StreamOpen {
    /// The endpoint answered with an event stream.
    Events(ByteStream),
    /// The endpoint answered, but not with an event stream.
    NotEventStream,
}

impl std::fmt::Debug for StreamOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Events(_) => f.write_str("Events(..)"),
            Self::NotEventStream => f.write_str("NotEventStream"),
        }
    }
}

/// Network seam used by the ingestion pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamFailure`] if the request cannot be made or is
    /// refused.
    async fn open_stream(&self, request: &ChatRequest) -> Result<StreamOpen>;

    /// Make a single request/response call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamFailure`] if the request fails or the body
    /// cannot be decoded.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// HTTP transport built on reqwest.
///
/// No overall request timeout: a hung stream ends only when cancelled.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    stream_url: String,
    complete_url: String,
}

impl HttpTransport {
    /// Create a transport for the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            stream_url: endpoint.stream_url.clone(),
            complete_url: endpoint.complete_url.clone(),
        })
    }
}

fn is_event_stream(value: Option<&HeaderValue>) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().to_ascii_lowercase().starts_with("text/event-stream"))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<StreamOpen> {
        let response = self
            .client
            .post(&self.stream_url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::StreamFailure(format!("stream request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status, "stream response received");
        if !status.is_success() {
            return Err(Error::StreamFailure(format!(
                "stream endpoint returned {status}"
            )));
        }
        if !is_event_stream(response.headers().get(CONTENT_TYPE)) {
            return Ok(StreamOpen::NotEventStream);
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| Error::StreamFailure(format!("stream interrupted: {e}")))
        });
        Ok(StreamOpen::Events(Box::pin(body)))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(&self.complete_url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::StreamFailure(format!("request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status, "completion response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StreamFailure(format!(
                "endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::StreamFailure(format!("failed to parse response: {e}")))
    }
}
