//! Configuration management for the OpenClaw gateway client.
//!
//! Provides configuration loading from TOML files with support for
//! multiple file locations, environment variable overrides, and sensible defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable pointing at a config file.
const CONFIG_PATH_ENV: &str = "OPENCLAW_CONFIG";

const GATEWAY_URL_ENV: &str = "OPENCLAW_GATEWAY_URL";
const AUTH_TOKEN_ENV: &str = "OPENCLAW_AUTH_TOKEN";
const AGENT_ID_ENV: &str = "OPENCLAW_AGENT_ID";
const MODEL_ENV: &str = "OPENCLAW_MODEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        /// Path to the configuration file that could not be parsed.
        path: PathBuf,
        /// The underlying TOML parse error.
        source: toml::de::Error,
    },

    /// The gateway URL is empty or not an http(s) URL.
    #[error("invalid gateway URL '{0}': expected an http:// or https:// URL")]
    InvalidGatewayUrl(String),
}

/// How malformed `data:` payloads in a streamed response are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamParsing {
    /// Skip chunks that are not valid JSON and keep reading.
    #[default]
    Tolerant,
    /// Fail the stream on the first malformed chunk.
    Strict,
}

/// Gateway client configuration.
///
/// Read once per call and never mutated by the client. Empty strings in the
/// optional fields are treated the same as absent values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Base URL of the gateway, e.g. `http://127.0.0.1:18789`.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Bearer token for gateway authentication.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Agent to route requests to (e.g. "main", "beta").
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Explicit model identifier. Takes precedence over the agent-derived one.
    #[serde(default)]
    pub model: Option<String>,

    /// Handling of malformed streamed chunks.
    #[serde(default)]
    pub stream_parsing: StreamParsing,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:18789".to_string()
}

impl Config {
    /// Create a configuration pointing at `gateway_url` with everything else unset.
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            ..Self::default()
        }
    }

    /// Configured auth token, if non-empty.
    pub fn token(&self) -> Option<&str> {
        non_empty(&self.auth_token)
    }

    /// Configured agent id, if non-empty.
    pub fn agent(&self) -> Option<&str> {
        non_empty(&self.agent_id)
    }

    /// Configured model override, if non-empty.
    pub fn model_override(&self) -> Option<&str> {
        non_empty(&self.model)
    }

    /// Load configuration from the file system and environment.
    ///
    /// File priority order:
    /// 1. `explicit` path, when given
    /// 2. OPENCLAW_CONFIG environment variable
    /// 3. ./config.toml (local directory)
    /// 4. ~/.config/openclaw/config.toml (user config)
    ///
    /// Falls back to defaults if no file is found. `OPENCLAW_GATEWAY_URL`,
    /// `OPENCLAW_AUTH_TOKEN`, `OPENCLAW_AGENT_ID` and `OPENCLAW_MODEL` then
    /// override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if a found file cannot be read.
    /// Returns [`ConfigError::ParseError`] if a found file is not valid TOML.
    /// Returns [`ConfigError::InvalidGatewayUrl`] if the resulting URL is unusable.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::discover(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but without the final validation.
    ///
    /// For callers that layer further overrides (command-line flags) on top
    /// and call [`Config::validate`] themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] or [`ConfigError::ParseError`] if a
    /// found file cannot be read or parsed.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match Self::find_config_file(explicit) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "config: loading file");
                Self::load_from(path)?
            }
            None => Self::default(),
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read.
    /// Returns [`ConfigError::ParseError`] if the file is not valid TOML.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Only non-empty values override.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get(GATEWAY_URL_ENV) {
            self.gateway_url = url;
        }
        if let Some(token) = get(AUTH_TOKEN_ENV) {
            self.auth_token = Some(token);
        }
        if let Some(agent) = get(AGENT_ID_ENV) {
            self.agent_id = Some(agent);
        }
        if let Some(model) = get(MODEL_ENV) {
            self.model = Some(model);
        }
        self
    }

    /// Check that the gateway URL is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGatewayUrl`] if the URL is empty or
    /// does not use the http or https scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.gateway_url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidGatewayUrl(self.gateway_url.clone()))
        }
    }

    fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Some(p);
            }
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }

        let user_config = dirs::home_dir()?.join(".config/openclaw/config.toml");
        user_config.exists().then_some(user_config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            auth_token: None,
            agent_id: None,
            model: None,
            stream_parsing: StreamParsing::default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
