//! Line-oriented decoding of the gateway's SSE response body.
//!
//! The body arrives as arbitrary byte chunks. [`LineBuffer`] reassembles
//! them into complete lines and [`sse_events`] turns `data:` lines into
//! [`StreamEvent`]s.

use bytes::BytesMut;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::client::types::{SSE_DONE_MARKER, StreamChunk};
use super::{GatewayError, StreamEvent};
use crate::config::StreamParsing;

/// Prefix of every meaningful SSE line.
const DATA_PREFIX: &str = "data: ";

/// Accumulates raw body bytes and hands out complete lines.
///
/// Lines are only decoded once their terminating `\n` has arrived, so a
/// UTF-8 sequence split across two reads is never mangled. Invalid UTF-8 is
/// replaced rather than rejected.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: BytesMut,
    /// Prefix of `buf` already known to contain no `\n`.
    scanned: usize,
}

impl LineBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and drain every complete line (without its `\n`).
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.buf.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
            self.scanned = 0;
        }
        self.scanned = self.buf.len();
        lines
    }

    /// Remaining unterminated text, if any.
    fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

/// Meaning of a single complete line.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// Blank, comment, non-data field, or a chunk without text.
    Skip,
    /// A non-empty text fragment.
    Text(String),
    /// The `[DONE]` marker.
    Done,
}

/// Interpret one complete line.
///
/// Malformed JSON is skipped in [`StreamParsing::Tolerant`] mode and is an
/// error in [`StreamParsing::Strict`] mode.
fn parse_line(line: &str, parsing: StreamParsing) -> Result<Line, GatewayError> {
    let Some(data) = line.trim().strip_prefix(DATA_PREFIX) else {
        return Ok(Line::Skip);
    };

    if data == SSE_DONE_MARKER {
        return Ok(Line::Done);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Ok(chunk.into_delta_content().map_or(Line::Skip, Line::Text)),
        Err(e) => match parsing {
            StreamParsing::Tolerant => {
                tracing::debug!(error = %e, "gateway: skipping malformed SSE chunk");
                Ok(Line::Skip)
            }
            StreamParsing::Strict => Err(GatewayError::MalformedChunk(e.to_string())),
        },
    }
}

/// Outcome of racing the next body read against cancellation.
enum Read<T> {
    Cancelled,
    Chunk(Option<T>),
}

/// Decode a byte stream into [`StreamEvent`]s.
///
/// Yields one `TextDelta` per non-empty fragment in arrival order, then a
/// single `Done`, either on `[DONE]` (the rest of the body is not read) or
/// when the body ends. Once `cancel` fires nothing else is yielded except a
/// final [`GatewayError::Aborted`]. The body is dropped on every exit path.
pub(super) fn sse_events<S, B, E>(
    body: S,
    parsing: StreamParsing,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamEvent, GatewayError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Into<GatewayError> + Send,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::new();

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => Read::Cancelled,
                chunk = body.next() => Read::Chunk(chunk),
            };

            let chunk = match read {
                Read::Cancelled => {
                    tracing::debug!("gateway: SSE stream aborted");
                    yield Err(GatewayError::Aborted);
                    return;
                }
                Read::Chunk(None) => break,
                Read::Chunk(Some(Err(e))) => {
                    yield Err(e.into());
                    return;
                }
                Read::Chunk(Some(Ok(chunk))) => chunk,
            };

            for line in lines.push(chunk.as_ref()) {
                if cancel.is_cancelled() {
                    yield Err(GatewayError::Aborted);
                    return;
                }
                match parse_line(&line, parsing) {
                    Ok(Line::Skip) => {}
                    Ok(Line::Text(text)) => yield Ok(StreamEvent::TextDelta(text)),
                    Ok(Line::Done) => {
                        tracing::debug!("gateway: SSE stream ended");
                        yield Ok(StreamEvent::Done);
                        return;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // Body ended without [DONE]; a final unterminated line still counts.
        if let Some(line) = lines.finish() {
            match parse_line(&line, parsing) {
                Ok(Line::Text(text)) => yield Ok(StreamEvent::TextDelta(text)),
                Ok(Line::Skip | Line::Done) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if cancel.is_cancelled() {
            yield Err(GatewayError::Aborted);
            return;
        }

        tracing::debug!("gateway: SSE stream ended without [DONE]");
        yield Ok(StreamEvent::Done);
    }
}
