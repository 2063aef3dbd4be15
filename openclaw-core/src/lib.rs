//! OpenClaw core library.
//!
//! Client for the OpenClaw gateway's OpenAI-compatible chat-completions
//! endpoint: blocking and streamed completions, a reachability probe, and
//! the configuration they run against.

pub mod config;
pub mod gateway;
pub mod message;

pub use config::{Config, ConfigError, StreamParsing};
pub use gateway::{EventStream, GatewayClient, GatewayError, StreamEvent};
pub use message::{Message, Role};

/// Cancellation signal accepted by the streaming operations.
pub use tokio_util::sync::CancellationToken;
