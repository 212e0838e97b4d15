//! # Error Types
//!
//! Defines the error types used across the pipe layer.

use thiserror::Error;

/// Result of a non-blocking operation on a pipe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum PipeError {
    /// Nothing to read right now; wait for readability and retry.
    #[error("Operation would block")]
    ShouldWait,

    /// The peer endpoint has been closed.
    #[error("Peer endpoint closed")]
    FailedPrecondition,

    /// The endpoint is closed, or the message was rejected by the transport.
    #[error("Invalid argument")]
    InvalidArgument,

    /// The peer's inbox is full. Transient.
    #[error("Peer inbox full")]
    ResourceExhausted,
}

impl PipeError {
    /// Whether the pipe is still usable after this result.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ShouldWait | Self::ResourceExhausted)
    }
}

/// Errors delivered to callers waiting on a two-way exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The request could not be written to the pipe.
    #[error("Message could not be written to the pipe")]
    SendFailed,

    /// The connection failed while reading.
    #[error("Connection lost: {0}")]
    Pipe(#[from] PipeError),

    /// The router was closed before a response arrived.
    #[error("Router closed")]
    Closed,
}

/// Errors related to envelope and header decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Both EXPECTS_RESPONSE and IS_RESPONSE are set.
    #[error("Conflicting routing flags: {flags:#x}")]
    ConflictingFlags { flags: u32 },

    /// A routing flag is set but no request id is present.
    #[error("Routing flags {flags:#x} require a request id")]
    MissingRequestId { flags: u32 },

    /// Request id 0 is reserved and never assigned.
    #[error("Request id 0 is reserved")]
    ReservedRequestId,

    /// The buffer is shorter than the header it claims to hold.
    #[error("Truncated header: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Unknown version/size combination.
    #[error("Unsupported header: version {version}, size {num_bytes}")]
    UnsupportedHeader { version: u32, num_bytes: u32 },
}
