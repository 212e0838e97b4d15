//! Test utilities for connectors and routers.
//!
//! Recording receivers and responders that capture what a router delivers,
//! plus a polling helper for waiting on the background read loop.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipe_router::test_utils::{wait_until, RecordingReceiver};
//! use pipe_router::{MemoryPipe, MessagePipe, Router, RouterConfig};
//! use pipe_types::Message;
//!
//! let (a, b) = MemoryPipe::pair();
//! let receiver = RecordingReceiver::new();
//! let router = Router::with_receiver(b, RouterConfig::default(), receiver.clone());
//!
//! a.write(&mut Message::new(7, Vec::new())).unwrap();
//! wait_until(|| receiver.len() == 1).await;
//! assert_eq!(receiver.names(), vec![7]);
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipe_types::{ConnectionError, Message, MessageKind};

use crate::connector::MessageReceiver;
use crate::responder::Responder;
use crate::router::{IncomingReceiver, ResponseSink};

/// How long [`wait_until`] polls before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {WAIT_TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[derive(Default)]
struct Recorded {
    messages: Vec<Message>,
    sinks: Vec<ResponseSink>,
}

/// Receiver that records every message and keeps request sinks for later.
///
/// Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingReceiver {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far
    pub fn len(&self) -> usize {
        self.recorded.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the received messages, in arrival order.
    pub fn names(&self) -> Vec<u32> {
        self.recorded
            .lock()
            .messages
            .iter()
            .map(Message::name)
            .collect()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.recorded
            .lock()
            .messages
            .iter()
            .map(|m| m.payload().to_vec())
            .collect()
    }

    /// Routing kinds of the received messages; malformed ones are skipped.
    pub fn kinds(&self) -> Vec<MessageKind> {
        self.recorded
            .lock()
            .messages
            .iter()
            .filter_map(|m| m.kind().ok())
            .collect()
    }

    /// Number of unanswered request sinks held.
    pub fn sink_count(&self) -> usize {
        self.recorded.lock().sinks.len()
    }

    /// Hand over the request sinks collected so far.
    pub fn take_sinks(&self) -> Vec<ResponseSink> {
        std::mem::take(&mut self.recorded.lock().sinks)
    }
}

impl MessageReceiver for RecordingReceiver {
    fn accept(&self, message: Message) -> bool {
        self.recorded.lock().messages.push(message);
        true
    }
}

impl IncomingReceiver for RecordingReceiver {
    fn accept(&self, message: Message) -> bool {
        self.recorded.lock().messages.push(message);
        true
    }

    fn accept_with_responder(&self, message: Message, responder: ResponseSink) -> bool {
        let mut recorded = self.recorded.lock();
        recorded.messages.push(message);
        recorded.sinks.push(responder);
        true
    }
}

/// How a [`RecordingResponder`] was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Resolved with a response carrying this payload.
    Accepted(Vec<u8>),
    Rejected(ConnectionError),
}

/// Responder that records its outcome. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingResponder {
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }
}

impl Responder for RecordingResponder {
    fn accept(self: Box<Self>, response: Message) {
        self.outcomes
            .lock()
            .push(Outcome::Accepted(response.payload().to_vec()));
    }

    fn reject(self: Box<Self>, error: ConnectionError) {
        self.outcomes.lock().push(Outcome::Rejected(error));
    }
}
