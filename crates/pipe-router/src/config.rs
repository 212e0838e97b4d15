//! Router and pipe configuration from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Default number of messages an in-memory endpoint will queue.
pub const DEFAULT_PIPE_CAPACITY: usize = 1000;

/// Default payload size limit for the in-memory pipe (4 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Errors from strict configuration parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// What happens to a responder whose request could not be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedSendPolicy {
    /// Take the responder back out and reject it with `SendFailed`; it never
    /// stays pending.
    #[default]
    RejectImmediately,
    /// Store the responder anyway; only a response or a later connection
    /// error resolves it.
    KeepPending,
}

impl FromStr for FailedSendPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" | "reject_immediately" => Ok(Self::RejectImmediately),
            "keep" | "keep_pending" => Ok(Self::KeepPending),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FailedSendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RejectImmediately => write!(f, "reject"),
            Self::KeepPending => write!(f, "keep"),
        }
    }
}

/// Configuration for a [`Router`](crate::Router).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterConfig {
    /// Handling of two-way calls whose write fails.
    pub failed_send_policy: FailedSendPolicy,
}

impl RouterConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPE_FAILED_SEND_POLICY`: `reject` or `keep` (default: reject)
    ///
    /// Invalid values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default router config");
            Self::default()
        })
    }

    /// Strict variant of [`RouterConfig::from_env`].
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("PIPE_FAILED_SEND_POLICY") {
            config.failed_send_policy =
                value.parse().map_err(|()| ConfigError::InvalidValue {
                    key: "PIPE_FAILED_SEND_POLICY",
                    value,
                })?;
        }
        Ok(config)
    }
}

/// Limits of an in-memory [`MemoryPipe`](crate::MemoryPipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Messages an endpoint queues before writes to it are refused.
    pub capacity: usize,
    /// Largest payload accepted by `write`.
    pub max_message_bytes: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PIPE_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl PipeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPE_CAPACITY`: queued messages per endpoint (default: 1000)
    /// - `PIPE_MAX_MESSAGE_BYTES`: payload limit (default: 4 MiB)
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default pipe config");
            Self::default()
        })
    }

    /// Strict variant of [`PipeConfig::from_env`].
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("PIPE_CAPACITY") {
            config.capacity = parse_positive("PIPE_CAPACITY", value)?;
        }
        if let Some(value) = lookup("PIPE_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = parse_positive("PIPE_MAX_MESSAGE_BYTES", value)?;
        }
        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: String) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
