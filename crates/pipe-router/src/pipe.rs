//! # Message Pipe Port
//!
//! The transport contract the [`Connector`](crate::Connector) is written
//! against. Implementations own one endpoint of a bidirectional pipe.

use async_trait::async_trait;
use pipe_types::{Message, PipeError};

/// One endpoint of a bidirectional message pipe.
///
/// `write` and `read` never block. Readiness is awaited separately through
/// [`MessagePipe::readable`]; dropping that future cancels the wait.
#[async_trait]
pub trait MessagePipe: Send + Sync {
    /// Write a message to the peer.
    ///
    /// On `Ok` the attached handles have been moved out of `message`. On
    /// error `message` is left untouched.
    ///
    /// - `FailedPrecondition`: the peer is gone.
    /// - `ResourceExhausted`: the peer's inbox is full for now.
    /// - `InvalidArgument`: this endpoint is closed or the message was refused.
    fn write(&self, message: &mut Message) -> Result<(), PipeError>;

    /// Read the next queued message.
    ///
    /// - `ShouldWait`: nothing queued, the peer is still open.
    /// - `FailedPrecondition`: nothing queued and the peer is gone.
    /// - `InvalidArgument`: this endpoint is closed.
    fn read(&self) -> Result<Message, PipeError>;

    /// Resolve once a `read` would not return `ShouldWait`.
    async fn readable(&self);

    /// Close this endpoint. Idempotent.
    fn close(&self);
}
