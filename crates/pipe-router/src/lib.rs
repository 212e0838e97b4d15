//! # Pipe Router - Request/Response Routing over Message Pipes
//!
//! Two layers sit on top of one endpoint of a bidirectional message pipe:
//!
//! ```text
//! ┌──────────────┐  accept / accept_with_responder  ┌──────────────┐
//! │  Application │ ───────────────────────────────→ │    Router    │
//! │              │ ←─────────────────────────────── │              │
//! └──────────────┘  IncomingReceiver / Responder    └──────┬───────┘
//!                                                          │
//!                                                   ┌──────▼───────┐
//!                                                   │  Connector   │ read loop
//!                                                   └──────┬───────┘
//!                                                          │
//!                                                   ┌──────▼───────┐
//!                                                   │ MessagePipe  │
//!                                                   └──────────────┘
//! ```
//!
//! - **Connector:** owns the endpoint, writes without blocking and pushes
//!   every inbound message to one receiver in arrival order.
//! - **Router:** stamps request ids on outgoing calls, matches responses to
//!   the responders waiting on them and rejects all of them when the
//!   connection fails.
//!
//! Both must be created inside a tokio runtime.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod connector;
pub mod memory;
pub mod pipe;
pub mod responder;
pub mod router;

/// Shared test helpers.
///
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types
pub use config::{
    ConfigError, FailedSendPolicy, PipeConfig, RouterConfig, DEFAULT_MAX_MESSAGE_BYTES,
    DEFAULT_PIPE_CAPACITY,
};
pub use connector::{Connector, ErrorHandler, MessageReceiver};
pub use memory::MemoryPipe;
pub use pipe::MessagePipe;
pub use responder::{PendingResponders, Responder, ResponseSender, RouterStats};
pub use router::{IncomingReceiver, ResponseSink, Router, RouterErrorHandler};

pub use pipe_types::{ConnectionError, HandleId, Message, MessageFlags, MessageKind, PipeError};
