//! # Connector
//!
//! Turns a [`MessagePipe`] endpoint into a push-based message stream with
//! best-effort, non-blocking writes.
//!
//! ## Read Loop
//!
//! ```text
//!   ┌──────────────┐  readable   ┌──────────────┐
//!   │ wait_to_read │ ──────────→ │  read_more   │──┐ message: dispatch,
//!   │    _more     │ ←────────── │              │←─┘ read again
//!   └──────────────┘ ShouldWait  └──────────────┘
//!                                       │ any other error
//!                                       ↓
//!                              errored = true, error handler
//! ```
//!
//! The readability wait is the only suspension point. Everything buffered at
//! wake-up time is dispatched, in order, before the next wait.
//!
//! ## Write Failures
//!
//! A write to a vanished peer flips `drop_writes` and is reported as success;
//! the authoritative signal for a dead peer is the read side, which keeps
//! draining whatever the peer sent before it went away.

use std::sync::Arc;

use parking_lot::Mutex;
use pipe_types::{Message, PipeError};
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::pipe::MessagePipe;

/// Sink for messages read off a pipe.
pub trait MessageReceiver: Send + Sync {
    /// Consume one inbound message. Returns whether it was handled.
    fn accept(&self, message: Message) -> bool;
}

impl<F> MessageReceiver for F
where
    F: Fn(Message) -> bool + Send + Sync,
{
    fn accept(&self, message: Message) -> bool {
        self(message)
    }
}

/// Callback invoked once when reading fails.
pub type ErrorHandler = Arc<dyn Fn(PipeError) + Send + Sync>;

struct ConnectorState {
    pipe: Option<Arc<dyn MessagePipe>>,
    drop_writes: bool,
    errored: bool,
    read_wait: Option<AbortHandle>,
}

struct ConnectorShared {
    state: Mutex<ConnectorState>,
    incoming_receiver: Mutex<Option<Arc<dyn MessageReceiver>>>,
    error_handler: Mutex<Option<ErrorHandler>>,
}

impl ConnectorShared {
    fn pipe(&self) -> Option<Arc<dyn MessagePipe>> {
        self.state.lock().pipe.clone()
    }

    fn is_closed(&self) -> bool {
        self.state.lock().pipe.is_none()
    }

    async fn wait_to_read_more(self: Arc<Self>) {
        loop {
            let Some(pipe) = self.pipe() else {
                return;
            };
            pipe.readable().await;
            drop(pipe);

            if !self.read_more() {
                return;
            }
        }
    }

    /// Drain the pipe. Returns whether the loop should wait again.
    fn read_more(&self) -> bool {
        loop {
            let Some(pipe) = self.pipe() else {
                return false;
            };
            let result = pipe.read();

            // Closed from inside a dispatch.
            if self.is_closed() {
                return false;
            }

            match result {
                Ok(message) => self.dispatch(message),
                Err(PipeError::ShouldWait) => return true,
                Err(error) => {
                    self.fail(error);
                    return false;
                }
            }
        }
    }

    fn dispatch(&self, message: Message) {
        let receiver = self.incoming_receiver.lock().clone();
        match receiver {
            Some(receiver) => {
                trace!(name = message.name(), "Dispatching inbound message");
                receiver.accept(message);
            }
            None => {
                debug!(name = message.name(), "No incoming receiver, message dropped");
            }
        }
    }

    fn fail(&self, error: PipeError) {
        self.state.lock().errored = true;
        warn!(error = %error, "Pipe read failed");

        let handler = self.error_handler.lock().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}

/// Owns a pipe endpoint and drives its read loop.
///
/// Must be created inside a tokio runtime: the read loop runs as a spawned
/// task whose abort handle is the cancelable read-wait registration.
/// Dropping a `Connector` closes it.
pub struct Connector {
    shared: Arc<ConnectorShared>,
}

impl Connector {
    /// Take ownership of `pipe` and start waiting for inbound messages.
    pub fn new(pipe: impl MessagePipe + 'static) -> Self {
        let connector = Self::idle(pipe);
        connector.start();
        connector
    }

    /// Like [`Connector::new`], with `receiver` installed before the first read.
    pub fn with_receiver(
        pipe: impl MessagePipe + 'static,
        receiver: impl MessageReceiver + 'static,
    ) -> Self {
        let connector = Self::idle(pipe);
        connector.set_incoming_receiver(receiver);
        connector.start();
        connector
    }

    /// Build a connector without starting the read loop.
    pub(crate) fn idle(pipe: impl MessagePipe + 'static) -> Self {
        Self {
            shared: Arc::new(ConnectorShared {
                state: Mutex::new(ConnectorState {
                    pipe: Some(Arc::new(pipe)),
                    drop_writes: false,
                    errored: false,
                    read_wait: None,
                }),
                incoming_receiver: Mutex::new(None),
                error_handler: Mutex::new(None),
            }),
        }
    }

    /// Register the read wait.
    pub(crate) fn start(&self) {
        let task = tokio::spawn(Arc::clone(&self.shared).wait_to_read_more());

        let mut state = self.shared.state.lock();
        if state.pipe.is_none() {
            task.abort();
            return;
        }
        if let Some(previous) = state.read_wait.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// Write `message` to the peer without blocking.
    ///
    /// Returns `false` when the connector is closed or errored, or when the
    /// transport refused this particular message. A vanished peer is not
    /// reported here: the write is absorbed and later writes are dropped.
    /// On a successful write the message's handles are moved out.
    pub fn accept(&self, message: &mut Message) -> bool {
        let pipe = {
            let state = self.shared.state.lock();
            if state.errored {
                return false;
            }
            let Some(pipe) = state.pipe.clone() else {
                return false;
            };
            if state.drop_writes {
                return true;
            }
            pipe
        };

        match pipe.write(message) {
            Ok(()) => true,
            Err(PipeError::FailedPrecondition) => {
                self.shared.state.lock().drop_writes = true;
                debug!(name = message.name(), "Peer gone, dropping further writes");
                true
            }
            Err(error) if error.is_transient() => {
                debug!(name = message.name(), error = %error, "Write deferred by transport");
                false
            }
            Err(error) => {
                warn!(name = message.name(), error = %error, "Write rejected");
                false
            }
        }
    }

    /// Cancel the read wait and close the pipe. Idempotent.
    pub fn close(&self) {
        let (pipe, read_wait) = {
            let mut state = self.shared.state.lock();
            (state.pipe.take(), state.read_wait.take())
        };

        if let Some(read_wait) = read_wait {
            read_wait.abort();
        }
        if let Some(pipe) = pipe {
            pipe.close();
            self.shared.incoming_receiver.lock().take();
            self.shared.error_handler.lock().take();
            debug!("Connector closed");
        }
    }

    /// Replace the inbound message sink.
    pub fn set_incoming_receiver(&self, receiver: impl MessageReceiver + 'static) {
        *self.shared.incoming_receiver.lock() = Some(Arc::new(receiver));
    }

    /// Replace the read-failure callback.
    pub fn set_error_handler(&self, handler: impl Fn(PipeError) + Send + Sync + 'static) {
        *self.shared.error_handler.lock() = Some(Arc::new(handler));
    }

    /// Whether a read has failed.
    #[must_use]
    pub fn encountered_error(&self) -> bool {
        self.shared.state.lock().errored
    }

    /// Whether writes are being discarded because the peer is gone.
    #[must_use]
    pub fn drops_writes(&self) -> bool {
        self.shared.state.lock().drop_writes
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close();
    }
}
