//! # In-Memory Message Pipe
//!
//! Two connected endpoints living in the same process. Each endpoint owns an
//! inbox; writing on one side queues into the other side's inbox and wakes
//! its reader.
//!
//! Suitable for tests and single-process wiring; it is not an OS transport.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipe_types::{Message, PipeError};
use tokio::sync::Notify;
use tracing::trace;

use crate::config::PipeConfig;
use crate::pipe::MessagePipe;

#[derive(Default)]
struct EndState {
    inbox: VecDeque<Message>,
    closed: bool,
}

#[derive(Default)]
struct Endpoint {
    state: Mutex<EndState>,
    notify: Notify,
}

struct PipeShared {
    ends: [Endpoint; 2],
    config: PipeConfig,
}

/// One end of an in-memory message pipe.
///
/// Dropping an endpoint closes it.
pub struct MemoryPipe {
    shared: Arc<PipeShared>,
    side: usize,
}

impl MemoryPipe {
    /// Create a connected pair with default limits.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_config(PipeConfig::default())
    }

    /// Create a connected pair with explicit limits.
    #[must_use]
    pub fn pair_with_config(config: PipeConfig) -> (Self, Self) {
        let shared = Arc::new(PipeShared {
            ends: [Endpoint::default(), Endpoint::default()],
            config,
        });
        let a = Self {
            shared: Arc::clone(&shared),
            side: 0,
        };
        let b = Self { shared, side: 1 };
        (a, b)
    }

    fn local(&self) -> &Endpoint {
        &self.shared.ends[self.side]
    }

    fn peer(&self) -> &Endpoint {
        &self.shared.ends[1 - self.side]
    }

    /// Messages queued for reading at this endpoint.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.local().state.lock().inbox.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.local().state.lock().closed
    }

    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        self.peer().state.lock().closed
    }

    fn is_ready(&self) -> bool {
        {
            let local = self.local().state.lock();
            if local.closed || !local.inbox.is_empty() {
                return true;
            }
        }
        self.is_peer_closed()
    }
}

#[async_trait]
impl MessagePipe for MemoryPipe {
    fn write(&self, message: &mut Message) -> Result<(), PipeError> {
        if self.is_closed() {
            return Err(PipeError::InvalidArgument);
        }
        if message.payload().len() > self.shared.config.max_message_bytes {
            return Err(PipeError::InvalidArgument);
        }

        {
            let mut peer = self.peer().state.lock();
            if peer.closed {
                return Err(PipeError::FailedPrecondition);
            }
            if peer.inbox.len() >= self.shared.config.capacity {
                return Err(PipeError::ResourceExhausted);
            }

            let handles = message.take_handles();
            peer.inbox.push_back(Message::from_parts(
                message.header(),
                message.payload().to_vec(),
                handles,
            ));
            trace!(side = self.side, queued = peer.inbox.len(), "Message queued");
        }

        self.peer().notify.notify_one();
        Ok(())
    }

    fn read(&self) -> Result<Message, PipeError> {
        {
            let mut local = self.local().state.lock();
            if local.closed {
                return Err(PipeError::InvalidArgument);
            }
            if let Some(message) = local.inbox.pop_front() {
                return Ok(message);
            }
        }

        if self.is_peer_closed() {
            Err(PipeError::FailedPrecondition)
        } else {
            Err(PipeError::ShouldWait)
        }
    }

    async fn readable(&self) {
        loop {
            let notified = self.local().notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    fn close(&self) {
        {
            let mut local = self.local().state.lock();
            if local.closed {
                return;
            }
            local.closed = true;
            local.inbox.clear();
        }
        trace!(side = self.side, "Pipe endpoint closed");

        self.local().notify.notify_one();
        self.peer().notify.notify_one();
    }
}

impl Drop for MemoryPipe {
    fn drop(&mut self) {
        self.close();
    }
}
