//! OpenClaw gateway client.
//!
//! Talks to the gateway's OpenAI-compatible `/v1/chat/completions` endpoint
//! in blocking and streamed modes, and classifies its failures into
//! [`GatewayError`].

mod client;
mod sse;
mod streaming;

pub use client::{
    AGENT_HEADER, COMPLETIONS_PATH, DEFAULT_MODEL, GatewayClient, PROBE_TIMEOUT, build_headers,
    endpoint_url, resolve_model,
};
pub use streaming::{EventStream, StreamEvent};

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network, DNS, or timeout failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("OpenClaw Gateway error ({status}): {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// 405 with no auth token configured. The gateway signals missing
    /// authentication this way.
    #[error(
        "OpenClaw Gateway returned 405 (Method Not Allowed). This usually means authentication is required. Set an auth token in the configuration."
    )]
    AuthRequired {
        /// Raw response body.
        body: String,
    },

    /// 405 while an auth token is configured.
    #[error(
        "OpenClaw Gateway returned 405 (Method Not Allowed). Your auth token may be invalid. Check the auth token in the configuration."
    )]
    InvalidToken {
        /// Raw response body.
        body: String,
    },

    /// Successful status but no usable content in the response.
    #[error("No response content from OpenClaw")]
    EmptyResponse,

    /// The request was cancelled by the caller.
    #[error("request aborted")]
    Aborted,

    /// A streamed chunk was not valid JSON (strict parsing only).
    #[error("malformed stream chunk: {0}")]
    MalformedChunk(String),

    /// The auth token or agent id cannot be sent as a header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl GatewayError {
    /// Whether this error is a caller-initiated cancellation.
    ///
    /// UIs should not report aborts as failures.
    pub fn is_aborted(&self) -> bool {
        matches!(self, GatewayError::Aborted)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::HttpStatus { status, .. } => Some(*status),
            GatewayError::AuthRequired { .. } | GatewayError::InvalidToken { .. } => Some(405),
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
