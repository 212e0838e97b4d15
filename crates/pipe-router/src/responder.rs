//! # Pending Responders
//!
//! Maps request ids to the responders waiting on them.
//!
//! Flow:
//! 1. `register()` allocates a fresh request id and stores the responder
//! 2. the router stamps the id on the outgoing request and writes it
//! 3. an inbound response with that id calls `complete()`
//! 4. a connection error calls `reject_all()`; `clear()` drops everything
//!
//! Insertion and removal are the only mutation points; an id is never handed
//! out twice while its responder is still stored. `reject_all()` and `clear()`
//! close the store: later registrations are rejected with `Closed` on the spot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use pipe_types::{ConnectionError, Message};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Sink for the outcome of one two-way call.
///
/// Consumed by whichever of `accept` / `reject` runs first, so at most one
/// outcome is ever delivered. A responder dropped without either (the router
/// was closed) never hears back.
pub trait Responder: Send {
    /// The matching response arrived.
    fn accept(self: Box<Self>, response: Message);

    /// The connection failed before a response arrived.
    fn reject(self: Box<Self>, error: ConnectionError);
}

/// Oneshot-backed responder used by [`Router::call`](crate::Router::call).
pub type ResponseSender = oneshot::Sender<Result<Message, ConnectionError>>;

impl Responder for ResponseSender {
    fn accept(self: Box<Self>, response: Message) {
        if (*self).send(Ok(response)).is_err() {
            debug!("Caller stopped waiting for response");
        }
    }

    fn reject(self: Box<Self>, error: ConnectionError) {
        if (*self).send(Err(error)).is_err() {
            debug!("Caller stopped waiting for rejection");
        }
    }
}

/// Counters for two-way traffic through a router.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Requests given a request id
    pub total_issued: AtomicU64,
    /// Responders resolved with a response
    pub total_completed: AtomicU64,
    /// Responders resolved with an error
    pub total_rejected: AtomicU64,
    /// Responses whose request id matched nothing
    pub total_unmatched: AtomicU64,
}

struct PendingState {
    next_request_id: u64,
    responders: HashMap<u64, Box<dyn Responder>>,
    closed: bool,
}

impl PendingState {
    fn allocate(&mut self) -> u64 {
        loop {
            let id = self.next_request_id;
            self.next_request_id = self.next_request_id.wrapping_add(1);
            if id != 0 && !self.responders.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Request-id allocator plus the responders awaiting those ids.
pub struct PendingResponders {
    state: Mutex<PendingState>,
    stats: RouterStats,
}

impl Default for PendingResponders {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingResponders {
    /// Create an empty store whose counter starts at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create an empty store whose counter starts at `next_request_id`.
    #[must_use]
    pub fn starting_at(next_request_id: u64) -> Self {
        Self {
            state: Mutex::new(PendingState {
                next_request_id,
                responders: HashMap::new(),
                closed: false,
            }),
            stats: RouterStats::default(),
        }
    }

    /// Allocate a request id and store `responder` under it.
    ///
    /// Returns `None` once the store is closed; `responder` has then already
    /// been rejected with [`ConnectionError::Closed`].
    pub fn register(&self, responder: Box<dyn Responder>) -> Option<u64> {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Responder store closed, rejecting registration");
            responder.reject(ConnectionError::Closed);
            return None;
        }

        let request_id = state.allocate();
        state.responders.insert(request_id, responder);
        drop(state);

        self.stats.total_issued.fetch_add(1, Ordering::Relaxed);
        debug!(request_id, "Registered responder");
        Some(request_id)
    }

    /// Remove the responder for `request_id` without resolving it.
    pub fn take(&self, request_id: u64) -> Option<Box<dyn Responder>> {
        self.state.lock().responders.remove(&request_id)
    }

    /// Deliver `response` to the responder waiting on `request_id`.
    ///
    /// Returns false if no responder was waiting.
    pub fn complete(&self, request_id: u64, response: Message) -> bool {
        let Some(responder) = self.take(request_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(request_id, "Response for unknown request id");
            return false;
        };

        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        debug!(request_id, "Completed pending request");
        responder.accept(response);
        true
    }

    /// Reject one responder, if still stored.
    pub fn reject(&self, request_id: u64, error: ConnectionError) -> bool {
        let Some(responder) = self.take(request_id) else {
            return false;
        };
        self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
        responder.reject(error);
        true
    }

    /// Reject every stored responder with `error`, empty the map and close
    /// the store.
    ///
    /// Returns the number of responders rejected.
    pub fn reject_all(&self, error: &ConnectionError) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.responders.drain().collect()
        };
        let count = drained.len();

        for (request_id, responder) in drained {
            debug!(request_id, error = %error, "Rejecting pending request");
            responder.reject(error.clone());
        }

        self.stats
            .total_rejected
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Drop every stored responder without resolving it and close the store.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.responders.drain().collect()
        };
        drained.len()
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.state.lock().responders.len()
    }

    /// Check if a request id is awaiting a response
    pub fn is_pending(&self, request_id: u64) -> bool {
        self.state.lock().responders.contains_key(&request_id)
    }

    /// Pending request ids in ascending order.
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.lock().responders.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}
