//! Serde request/response structs for the gateway's chat-completions API.
//!
//! Response types declare only the content path the client reads; every
//! other field the gateway sends is ignored whatever its type.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// SSE "[DONE]" marker that ends a streamed response.
pub(in super::super) const SSE_DONE_MARKER: &str = "[DONE]";

/// A single message in the request body.
#[derive(Debug, Serialize)]
pub(in super::super) struct ApiMessage<'a> {
    pub(in super::super) role: &'static str,
    pub(in super::super) content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: &m.content,
        }
    }
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Serialize)]
pub(in super::super) struct ChatRequest<'a> {
    /// Model identifier.
    pub(in super::super) model: String,
    /// Conversation messages, in chronological order.
    pub(in super::super) messages: Vec<ApiMessage<'a>>,
    /// Whether the response is streamed as SSE.
    pub(in super::super) stream: bool,
    /// Output token cap. Only the reachability probe sets it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in super::super) max_tokens: Option<u32>,
}

impl<'a> ChatRequest<'a> {
    pub(in super::super) fn new(model: String, messages: &'a [Message], stream: bool) -> Self {
        Self {
            model,
            messages: messages.iter().map(ApiMessage::from).collect(),
            stream,
            max_tokens: None,
        }
    }
}

/// Response body of a non-streaming completion.
#[derive(Debug, Deserialize)]
pub(in super::super) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if present and non-empty.
    pub(in super::super) fn into_content(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .message?
            .content
            .filter(|c| !c.is_empty())
    }
}

/// A choice in the completion response.
#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

/// Message content in a completion choice.
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One `data:` event of a streamed response.
#[derive(Debug, Deserialize)]
pub(in super::super) struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
}

impl StreamChunk {
    /// Text fragment of the first choice, if present and non-empty.
    pub(in super::super) fn into_delta_content(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|c| !c.is_empty())
    }
}

/// A choice in a streamed chunk.
#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

/// Delta content in a streamed choice.
#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
