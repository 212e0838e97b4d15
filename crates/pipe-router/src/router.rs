//! # Router
//!
//! Demultiplexes one [`Connector`]'s message stream into one-way deliveries
//! and correlated request/response pairs.
//!
//! ## Outgoing Two-Way Calls
//!
//! ```text
//!   accept_with_responder ──→ ISSUED ──response──→ COMPLETED
//!                               │
//!                               └──connection error──→ REJECTED
//! ```
//!
//! There is no timeout: a call stays pending until its response is read or
//! the connection fails. `close()` drops pending responders unresolved.
//!
//! ## Inbound Dispatch
//!
//! | kind       | receiver registered                   | no receiver       |
//! |------------|---------------------------------------|-------------------|
//! | `Request`  | `accept_with_responder(msg, sink)`    | router closes     |
//! | `Response` | matched against pending responders    | (same)            |
//! | `OneWay`   | `accept(msg)`                         | dropped           |

use std::future::{ready, Ready};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pipe_types::{ConnectionError, Message, MessageKind, PipeError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{FailedSendPolicy, RouterConfig};
use crate::connector::{Connector, MessageReceiver};
use crate::pipe::MessagePipe;
use crate::responder::{PendingResponders, Responder, RouterStats};

/// Application-side sink for inbound traffic on a router.
pub trait IncomingReceiver: Send + Sync {
    /// A one-way message arrived.
    fn accept(&self, message: Message) -> bool;

    /// A request arrived; answer it through `responder`.
    fn accept_with_responder(&self, message: Message, responder: ResponseSink) -> bool;
}

/// Callback invoked after a connection error has rejected all pending calls.
pub type RouterErrorHandler = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

struct RouterInner {
    connector: Connector,
    config: RouterConfig,
    incoming_receiver: Mutex<Option<Arc<dyn IncomingReceiver>>>,
    error_handler: Mutex<Option<RouterErrorHandler>>,
    responders: PendingResponders,
}

impl RouterInner {
    fn handle_incoming_message(self: &Arc<Self>, message: Message) -> bool {
        let kind = match message.kind() {
            Ok(kind) => kind,
            Err(error) => {
                warn!(name = message.name(), error = %error, "Dropping malformed message");
                return false;
            }
        };

        match kind {
            MessageKind::Request { id } => match self.receiver() {
                Some(receiver) => {
                    let sink = ResponseSink {
                        router: Arc::downgrade(self),
                        request_id: id,
                    };
                    receiver.accept_with_responder(message, sink)
                }
                None => {
                    warn!(
                        request_id = id,
                        "Request with no incoming receiver, closing router"
                    );
                    self.close();
                    false
                }
            },
            MessageKind::Response { id } => self.responders.complete(id, message),
            MessageKind::OneWay => match self.receiver() {
                Some(receiver) => receiver.accept(message),
                None => {
                    debug!(name = message.name(), "No incoming receiver, message dropped");
                    false
                }
            },
        }
    }

    fn handle_connection_error(&self, error: PipeError) {
        let error = ConnectionError::from(error);
        let rejected = self.responders.reject_all(&error);
        warn!(error = %error, rejected, "Connection error, closing router");

        let handler = self.error_handler.lock().clone();
        self.close();
        if let Some(handler) = handler {
            handler(&error);
        }
    }

    fn receiver(&self) -> Option<Arc<dyn IncomingReceiver>> {
        self.incoming_receiver.lock().clone()
    }

    fn close(&self) {
        let dropped = self.responders.clear();
        if dropped > 0 {
            debug!(dropped, "Router closed with requests still pending");
        }
        self.connector.close();
    }
}

/// Bridges the connector's callbacks to the router without owning it.
struct RouterDispatch {
    router: Weak<RouterInner>,
}

impl MessageReceiver for RouterDispatch {
    fn accept(&self, message: Message) -> bool {
        match self.router.upgrade() {
            Some(router) => router.handle_incoming_message(message),
            None => false,
        }
    }
}

/// Answers one inbound request through the router that received it.
///
/// Consumed by [`ResponseSink::respond`], so a request gets at most one
/// response.
pub struct ResponseSink {
    router: Weak<RouterInner>,
    request_id: u64,
}

impl ResponseSink {
    /// Request id the response will carry.
    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Stamp `response` as the answer to this request and send it.
    ///
    /// Returns false if the router is gone or the write was refused.
    pub fn respond(self, mut response: Message) -> bool {
        let Some(router) = self.router.upgrade() else {
            debug!(request_id = self.request_id, "Router gone, response dropped");
            return false;
        };
        response.set_kind(MessageKind::Response {
            id: self.request_id,
        });
        router.connector.accept(&mut response)
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Request/response router over a message pipe.
///
/// Must be created inside a tokio runtime. Dropping the router closes the
/// pipe and drops pending responders unresolved.
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Take ownership of `pipe` with default configuration.
    ///
    /// Reading starts immediately. Until a receiver is set, inbound traffic
    /// follows the no-receiver rules: one-way messages are dropped and a
    /// request closes the router. Use [`Router::with_receiver`] when the peer
    /// may already have written.
    pub fn new(pipe: impl MessagePipe + 'static) -> Self {
        Self::with_config(pipe, RouterConfig::default())
    }

    /// Take ownership of `pipe`. Reading starts immediately.
    pub fn with_config(pipe: impl MessagePipe + 'static, config: RouterConfig) -> Self {
        Self::build(pipe, config, None)
    }

    /// Take ownership of `pipe` with `receiver` installed before the first read.
    pub fn with_receiver(
        pipe: impl MessagePipe + 'static,
        config: RouterConfig,
        receiver: impl IncomingReceiver + 'static,
    ) -> Self {
        Self::build(pipe, config, Some(Arc::new(receiver)))
    }

    fn build(
        pipe: impl MessagePipe + 'static,
        config: RouterConfig,
        receiver: Option<Arc<dyn IncomingReceiver>>,
    ) -> Self {
        let inner = Arc::new(RouterInner {
            connector: Connector::idle(pipe),
            config,
            incoming_receiver: Mutex::new(receiver),
            error_handler: Mutex::new(None),
            responders: PendingResponders::new(),
        });

        inner.connector.set_incoming_receiver(RouterDispatch {
            router: Arc::downgrade(&inner),
        });
        let weak = Arc::downgrade(&inner);
        inner.connector.set_error_handler(move |error| {
            if let Some(router) = weak.upgrade() {
                router.handle_connection_error(error);
            }
        });
        inner.connector.start();

        Self { inner }
    }

    /// Send a one-way message.
    pub fn accept(&self, mut message: Message) -> bool {
        self.inner.connector.accept(&mut message)
    }

    /// Send `message` as a request and store `responder` for its response.
    ///
    /// The returned future is already resolved: `Ok` once the request was
    /// written, `Err` if it could not be. It says nothing about the response,
    /// which goes to `responder`. On a closed router `responder` is rejected
    /// with [`ConnectionError::Closed`] regardless of the failed-send policy.
    pub fn accept_with_responder(
        &self,
        mut message: Message,
        responder: impl Responder + 'static,
    ) -> Ready<Result<(), ConnectionError>> {
        let Some(request_id) = self.inner.responders.register(Box::new(responder)) else {
            return ready(Err(ConnectionError::Closed));
        };
        message.set_kind(MessageKind::Request { id: request_id });

        if self.inner.connector.accept(&mut message) {
            return ready(Ok(()));
        }

        // A closed connector never reads again, whatever the policy.
        if self.inner.connector.is_closed() {
            debug!(request_id, "Router closed during request write");
            self.inner
                .responders
                .reject(request_id, ConnectionError::Closed);
            return ready(Err(ConnectionError::Closed));
        }

        match self.inner.config.failed_send_policy {
            FailedSendPolicy::RejectImmediately => {
                debug!(request_id, "Request write failed, rejecting responder");
                self.inner
                    .responders
                    .reject(request_id, ConnectionError::SendFailed);
            }
            FailedSendPolicy::KeepPending => {
                debug!(request_id, "Request write failed, responder kept pending");
            }
        }
        ready(Err(ConnectionError::SendFailed))
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, message: Message) -> Result<Message, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.accept_with_responder(message, tx).await?;

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectionError::Closed),
        }
    }

    /// Replace the application-side receiver.
    ///
    /// Messages read before this call are not replayed.
    pub fn set_incoming_receiver(&self, receiver: impl IncomingReceiver + 'static) {
        *self.inner.incoming_receiver.lock() = Some(Arc::new(receiver));
    }

    /// Replace the connection-error callback.
    pub fn set_error_handler(&self, handler: impl Fn(&ConnectionError) + Send + Sync + 'static) {
        *self.inner.error_handler.lock() = Some(Arc::new(handler));
    }

    /// Drop pending responders and close the connector.
    pub fn close(&self) {
        self.inner.close();
    }

    #[must_use]
    pub fn encountered_error(&self) -> bool {
        self.inner.connector.encountered_error()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.connector.is_closed()
    }

    /// Number of requests awaiting a response
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.responders.pending_count()
    }

    #[must_use]
    pub fn is_pending(&self, request_id: u64) -> bool {
        self.inner.responders.is_pending(request_id)
    }

    /// Pending request ids in ascending order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<u64> {
        self.inner.responders.pending_ids()
    }

    #[must_use]
    pub fn stats(&self) -> &RouterStats {
        self.inner.responders.stats()
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }
}
