//! Streaming event types for gateway responses.
//!
//! This module defines the [`StreamEvent`] enum yielded by
//! [`GatewayClient::stream`](super::GatewayClient::stream).

use std::pin::Pin;

use futures::Stream;

use super::GatewayError;

/// Events emitted during a streamed completion.
///
/// # Examples
///
/// ```
/// use openclaw_core::gateway::StreamEvent;
///
/// let delta = StreamEvent::TextDelta("Hello".to_string());
/// let done = StreamEvent::Done;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text fragment, to be appended to the output.
    ///
    /// The content is guaranteed to be non-empty.
    TextDelta(String),

    /// Stream completed successfully.
    ///
    /// Emitted exactly once, after the last `TextDelta`. Nothing follows it.
    Done,
}

/// Owned stream of gateway events, as returned by
/// [`GatewayClient::stream`](super::GatewayClient::stream).
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>;
