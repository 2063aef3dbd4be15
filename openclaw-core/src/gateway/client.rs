//! HTTP client for the gateway's chat-completions endpoint.
//!
//! Every operation takes the [`Config`] explicitly; the client itself only
//! owns a pooled `reqwest::Client` and is cheap to clone.

pub(super) mod types;

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

use self::types::{ApiMessage, ChatCompletionResponse, ChatRequest};
use super::sse::sse_events;
use super::{EventStream, GatewayError, StreamEvent};
use crate::config::Config;
use crate::message::Message;

/// Path appended to the gateway base URL for every request.
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Header selecting the target agent on the gateway.
pub const AGENT_HEADER: &str = "x-openclaw-agent-id";

/// Model identifier used when neither a model nor an agent is configured.
/// Also the namespace prefix of agent-derived identifiers.
pub const DEFAULT_MODEL: &str = "openclaw";

/// Timeout of the reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Full endpoint URL: base URL without trailing slashes plus [`COMPLETIONS_PATH`].
///
/// # Examples
///
/// ```
/// use openclaw_core::Config;
/// use openclaw_core::gateway::endpoint_url;
///
/// let config = Config::new("http://127.0.0.1:18789//");
/// assert_eq!(endpoint_url(&config), "http://127.0.0.1:18789/v1/chat/completions");
/// ```
pub fn endpoint_url(config: &Config) -> String {
    format!(
        "{}{}",
        config.gateway_url.trim_end_matches('/'),
        COMPLETIONS_PATH
    )
}

/// Request headers for `config`.
///
/// Always carries a JSON content type; adds a bearer token and the agent
/// header only when those are configured.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidHeader`] if the token or agent id contains
/// characters not allowed in a header value.
pub fn build_headers(config: &Config) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = config.token() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }
    if let Some(agent) = config.agent() {
        headers.insert(
            HeaderName::from_static(AGENT_HEADER),
            HeaderValue::from_str(agent)?,
        );
    }
    Ok(headers)
}

/// Model identifier sent in the request body.
///
/// An explicit model wins, then `openclaw:<agent_id>`, then `openclaw`.
pub fn resolve_model(config: &Config) -> String {
    if let Some(model) = config.model_override() {
        return model.to_string();
    }
    match config.agent() {
        Some(agent) => format!("{}:{}", DEFAULT_MODEL, agent),
        None => DEFAULT_MODEL.to_string(),
    }
}

/// Client for the OpenClaw gateway.
///
/// # Examples
///
/// ```no_run
/// use openclaw_core::{Config, GatewayClient, Message};
///
/// # async fn example() -> Result<(), openclaw_core::GatewayError> {
/// let client = GatewayClient::new();
/// let config = Config::new("http://127.0.0.1:18789");
/// let reply = client.complete(&config, &[Message::user("Hello")]).await?;
/// println!("{reply}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct GatewayClient {
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client with a default `reqwest::Client`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client on top of a preconfigured `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send `messages` and wait for the whole reply.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Transport`] if the request could not be sent.
    /// - [`GatewayError::AuthRequired`] / [`GatewayError::InvalidToken`] on 405.
    /// - [`GatewayError::HttpStatus`] on any other non-success status.
    /// - [`GatewayError::EmptyResponse`] if the body has no usable content.
    pub async fn complete(
        &self,
        config: &Config,
        messages: &[Message],
    ) -> Result<String, GatewayError> {
        let endpoint = endpoint_url(config);
        let request = ChatRequest::new(resolve_model(config), messages, false);

        tracing::debug!(endpoint = %endpoint, model = %request.model, "gateway: POST complete request");
        let response = self
            .http
            .post(&endpoint)
            .headers(build_headers(config)?)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, config, &CancellationToken::new()).await?;

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::debug!(error = %e, "gateway: unparsable completion body");
            GatewayError::EmptyResponse
        })?;

        parsed.into_content().ok_or(GatewayError::EmptyResponse)
    }

    /// Stream the reply to `messages` as [`StreamEvent`]s.
    ///
    /// The returned stream owns everything it needs. It yields zero or more
    /// `TextDelta`s followed by exactly one `Done`, or ends with an error.
    /// Cancelling `cancel` ends it with [`GatewayError::Aborted`]; dropping
    /// it releases the connection.
    pub fn stream(
        &self,
        config: &Config,
        messages: &[Message],
        cancel: Option<CancellationToken>,
    ) -> EventStream {
        let client = self.http.clone();
        let config = config.clone();
        let messages = messages.to_vec();
        let cancel = cancel.unwrap_or_default();

        Box::pin(async_stream::stream! {
            let headers = match build_headers(&config) {
                Ok(headers) => headers,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let endpoint = endpoint_url(&config);
            let request = ChatRequest::new(resolve_model(&config), &messages, true);
            tracing::debug!(endpoint = %endpoint, model = %request.model, "gateway: POST stream request");

            let send = client.post(&endpoint).headers(headers).json(&request).send();
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = send => Some(result),
            };

            let response = match sent {
                None => {
                    yield Err(GatewayError::Aborted);
                    return;
                }
                Some(Err(e)) => {
                    yield Err(GatewayError::Transport(e));
                    return;
                }
                Some(Ok(response)) => response,
            };

            let response = match check_status(response, &config, &cancel).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            tracing::debug!(endpoint = %endpoint, "gateway: SSE stream started");
            let mut events = Box::pin(sse_events(
                response.bytes_stream(),
                config.stream_parsing,
                cancel,
            ));
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }

    /// Stream the reply to `messages` through a pair of callbacks.
    ///
    /// `on_chunk` receives each text fragment in arrival order; `on_done`
    /// runs exactly once after the last fragment. Neither runs after a
    /// failure or an abort.
    ///
    /// # Errors
    ///
    /// The same errors as [`complete`](Self::complete) before streaming
    /// starts, [`GatewayError::Aborted`] on cancellation, and
    /// [`GatewayError::Transport`] if the body breaks off mid-stream.
    pub async fn stream_with_callbacks<F, D>(
        &self,
        config: &Config,
        messages: &[Message],
        mut on_chunk: F,
        on_done: D,
        cancel: Option<CancellationToken>,
    ) -> Result<(), GatewayError>
    where
        F: FnMut(&str),
        D: FnOnce(),
    {
        let mut events = self.stream(config, messages, cancel);
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::TextDelta(text) => on_chunk(&text),
                StreamEvent::Done => break,
            }
        }
        on_done();
        Ok(())
    }

    /// Check whether the gateway answers a minimal completion request.
    ///
    /// Returns `true` only for a success status within [`PROBE_TIMEOUT`].
    /// Never fails.
    pub async fn probe(&self, config: &Config) -> bool {
        self.probe_with_timeout(config, PROBE_TIMEOUT).await
    }

    pub(crate) async fn probe_with_timeout(&self, config: &Config, timeout: Duration) -> bool {
        let headers = match build_headers(config) {
            Ok(headers) => headers,
            Err(e) => {
                tracing::debug!(error = %e, "gateway: probe failed");
                return false;
            }
        };

        let request = ChatRequest {
            model: resolve_model(config),
            messages: vec![ApiMessage {
                role: "user",
                content: "ping",
            }],
            stream: false,
            max_tokens: Some(1),
        };

        let result = self
            .http
            .post(endpoint_url(config))
            .headers(headers)
            .json(&request)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                tracing::debug!(status = status.as_u16(), "gateway: probe response");
                status.is_success()
            }
            Err(e) => {
                tracing::debug!(error = %e, "gateway: probe failed");
                false
            }
        }
    }
}

/// Pass successful responses through; turn anything else into an error.
///
/// Reading the error body is abandoned with [`GatewayError::Aborted`] once
/// `cancel` fires.
async fn check_status(
    response: Response,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Response, GatewayError> {
    let status = response.status();
    tracing::debug!(status = status.as_u16(), "gateway: response status");
    if status.is_success() {
        return Ok(response);
    }

    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GatewayError::Aborted),
        body = response.text() => body.unwrap_or_else(|_| "unknown error".to_string()),
    };
    tracing::warn!(status = status.as_u16(), body = %body, "gateway: request failed");
    Err(status_error(status, body, config.token().is_some()))
}

/// Classify a non-success status. 405 is how the gateway reports auth problems.
fn status_error(status: StatusCode, body: String, has_token: bool) -> GatewayError {
    match status {
        StatusCode::METHOD_NOT_ALLOWED if has_token => GatewayError::InvalidToken { body },
        StatusCode::METHOD_NOT_ALLOWED => GatewayError::AuthRequired { body },
        _ => GatewayError::HttpStatus {
            status: status.as_u16(),
            body,
        },
    }
}

#[cfg(test)]
mod tests;
