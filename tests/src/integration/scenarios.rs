//! # Router Scenarios
//!
//! End-to-end exchanges between a router and its peer. The peer is either a
//! second router or a bare `MemoryPipe` endpoint, when the test needs to see
//! exactly what crossed the pipe.
//!
//! ## Flows Tested:
//!
//! 1. **Ping/pong**: request gets id 1, the response resolves the responder
//! 2. **Concurrent calls**: ids 1 and 2 pending at once, answered out of order
//! 3. **Abrupt close**: every pending responder rejected once, handler fires once
//! 4. **No receiver**: one-way dropped, request closes the router
//! 5. **Peer gone**: backlog drained first, writes absorbed meanwhile
//! 6. **Early traffic**: a receiver given at construction sees what the peer
//!    wrote before the router existed

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};
    use std::time::Duration;
    use tokio::time::timeout;

    use pipe_router::test_utils::{wait_until, Outcome, RecordingReceiver, RecordingResponder};
    use pipe_router::{
        Connector, IncomingReceiver, MemoryPipe, MessagePipe, ResponseSink, Router, RouterConfig,
    };
    use pipe_types::{ConnectionError, HandleId, Message, MessageFlags, MessageKind, PipeError};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const PING: u32 = 1;
    const NOTE: u32 = 2;

    fn ping() -> Message {
        Message::new(PING, b"ping".to_vec())
    }

    fn pong(request_id: u64) -> Message {
        Message::new(PING, b"pong".to_vec()).with_kind(MessageKind::Response { id: request_id })
    }

    /// Answers a request, then pushes a one-way note back through the same router.
    struct AnswerThenNotify {
        router: Weak<Router>,
    }

    impl IncomingReceiver for AnswerThenNotify {
        fn accept(&self, _message: Message) -> bool {
            true
        }

        fn accept_with_responder(&self, message: Message, responder: ResponseSink) -> bool {
            let answered = responder.respond(Message::new(message.name(), b"pong".to_vec()));
            if let Some(router) = self.router.upgrade() {
                router.accept(Message::new(NOTE, b"after".to_vec()));
            }
            answered
        }
    }

    // =============================================================================
    // PING / PONG
    // =============================================================================

    #[tokio::test]
    async fn test_ping_pong_against_raw_peer() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let responder = RecordingResponder::new();

        router
            .accept_with_responder(ping(), responder.clone())
            .await
            .unwrap();

        let request = b.read().unwrap();
        assert_eq!(request.flags(), MessageFlags::EXPECTS_RESPONSE);
        assert_eq!(request.request_id(), Some(1));
        assert_eq!(request.payload(), b"ping");

        b.write(&mut pong(1)).unwrap();
        wait_until(|| !responder.outcomes().is_empty()).await;

        assert_eq!(responder.outcomes(), vec![Outcome::Accepted(b"pong".to_vec())]);
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ping_pong_between_routers() {
        let (a, b) = MemoryPipe::pair();
        let client = Router::new(a);
        let server = Router::new(b);
        let receiver = RecordingReceiver::new();
        server.set_incoming_receiver(receiver.clone());

        let call = tokio::spawn(async move {
            let response = client.call(ping()).await;
            (client, response)
        });

        wait_until(|| receiver.sink_count() == 1).await;
        assert_eq!(receiver.kinds(), vec![MessageKind::Request { id: 1 }]);
        let sink = receiver.take_sinks().remove(0);
        assert!(sink.respond(Message::new(PING, b"pong".to_vec())));

        let (client, response) = timeout(Duration::from_secs(1), call)
            .await
            .expect("timeout")
            .expect("join");
        let response = response.unwrap();
        assert_eq!(response.payload(), b"pong");
        assert!(response.is_response());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_receiver_can_reenter_its_router() {
        let (a, b) = MemoryPipe::pair();
        let client = Router::new(a);
        let notes = RecordingReceiver::new();
        client.set_incoming_receiver(notes.clone());

        let server = Arc::new_cyclic(|router| {
            Router::with_receiver(
                b,
                RouterConfig::default(),
                AnswerThenNotify {
                    router: router.clone(),
                },
            )
        });

        let response = timeout(Duration::from_secs(1), client.call(ping()))
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(response.payload(), b"pong");

        wait_until(|| notes.len() == 1).await;
        assert_eq!(notes.names(), vec![NOTE]);
        assert!(!server.is_closed());
    }

    // =============================================================================
    // CONCURRENT CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_two_calls_pending_then_answered_out_of_order() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let first = RecordingResponder::new();
        let second = RecordingResponder::new();

        router
            .accept_with_responder(ping(), first.clone())
            .await
            .unwrap();
        router
            .accept_with_responder(ping(), second.clone())
            .await
            .unwrap();
        assert_eq!(router.pending_ids(), vec![1, 2]);
        assert_eq!(b.read().unwrap().request_id(), Some(1));
        assert_eq!(b.read().unwrap().request_id(), Some(2));

        b.write(&mut Message::new(PING, b"two".to_vec()).with_kind(MessageKind::Response { id: 2 }))
            .unwrap();
        wait_until(|| router.pending_ids() == vec![1]).await;
        assert!(first.outcomes().is_empty());
        assert_eq!(second.outcomes(), vec![Outcome::Accepted(b"two".to_vec())]);

        b.write(&mut Message::new(PING, b"one".to_vec()).with_kind(MessageKind::Response { id: 1 }))
            .unwrap();
        wait_until(|| router.pending_count() == 0).await;
        assert_eq!(first.outcomes(), vec![Outcome::Accepted(b"one".to_vec())]);
    }

    // =============================================================================
    // ABRUPT CLOSE
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abrupt_close_rejects_every_pending_call_once() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            router.set_error_handler(move |error| {
                assert_eq!(error, &ConnectionError::Pipe(PipeError::FailedPrecondition));
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let responders: Vec<_> = (0..3).map(|_| RecordingResponder::new()).collect();
        for responder in &responders {
            router
                .accept_with_responder(ping(), responder.clone())
                .await
                .unwrap();
        }
        assert_eq!(router.pending_count(), 3);

        drop(b);
        wait_until(|| fired.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        for responder in &responders {
            assert_eq!(
                responder.outcomes(),
                vec![Outcome::Rejected(ConnectionError::Pipe(
                    PipeError::FailedPrecondition
                ))]
            );
        }
        assert_eq!(router.pending_count(), 0);
        assert!(router.is_closed());
        assert!(router.encountered_error());
    }

    #[tokio::test]
    async fn test_close_is_not_an_error() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            router.set_error_handler(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        let responder = RecordingResponder::new();
        router
            .accept_with_responder(ping(), responder.clone())
            .await
            .unwrap();

        router.close();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(b.is_peer_closed());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(responder.outcomes().is_empty());
        assert!(!router.encountered_error());
    }

    // =============================================================================
    // NO RECEIVER
    // =============================================================================

    #[tokio::test]
    async fn test_one_way_without_receiver_is_dropped() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);

        b.write(&mut Message::new(NOTE, b"ignored".to_vec())).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!router.is_closed());
        assert!(!router.encountered_error());
        assert_eq!(router.pending_count(), 0);
        assert!(!b.is_peer_closed());
    }

    #[tokio::test]
    async fn test_request_without_receiver_closes_router() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);

        b.write(&mut ping().with_kind(MessageKind::Request { id: 9 }))
            .unwrap();
        wait_until(|| router.is_closed()).await;

        assert!(b.is_peer_closed());
        assert!(!router.encountered_error());
        assert!(!router.accept(Message::new(NOTE, Vec::new())));
    }

    // =============================================================================
    // PEER GONE
    // =============================================================================

    #[tokio::test]
    async fn test_backlog_delivered_before_error_handler() {
        let (a, b) = MemoryPipe::pair();
        for name in 1..=3 {
            b.write(&mut Message::new(name, Vec::new())).unwrap();
        }
        drop(b);

        let receiver = RecordingReceiver::new();
        let router = Router::with_receiver(a, RouterConfig::default(), receiver.clone());
        let seen_at_error = Arc::new(AtomicUsize::new(usize::MAX));
        {
            let receiver = receiver.clone();
            let seen_at_error = Arc::clone(&seen_at_error);
            router.set_error_handler(move |_| {
                seen_at_error.store(receiver.len(), Ordering::SeqCst);
            });
        }

        wait_until(|| seen_at_error.load(Ordering::SeqCst) != usize::MAX).await;
        assert_eq!(seen_at_error.load(Ordering::SeqCst), 3);
        assert_eq!(receiver.names(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_writes_absorbed_until_read_side_notices() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        drop(b);

        // The read loop has not run yet: the write side only sees a vanished peer.
        assert!(router.accept(Message::new(NOTE, Vec::new())));
        let responder = RecordingResponder::new();
        router
            .accept_with_responder(ping(), responder.clone())
            .await
            .unwrap();
        assert_eq!(router.pending_count(), 1);

        wait_until(|| router.encountered_error()).await;
        assert_eq!(
            responder.outcomes(),
            vec![Outcome::Rejected(ConnectionError::Pipe(
                PipeError::FailedPrecondition
            ))]
        );
        assert!(!router.accept(Message::new(NOTE, Vec::new())));
    }

    #[tokio::test]
    async fn test_connector_drop_writes_keeps_handles() {
        let (a, b) = MemoryPipe::pair();
        let connector = Connector::new(a);
        drop(b);

        let mut message = Message::new(NOTE, Vec::new()).with_handles(vec![HandleId(8)]);
        assert!(connector.accept(&mut message));
        assert!(connector.drops_writes());
        assert_eq!(message.handles(), &[HandleId(8)]);
    }

    #[tokio::test]
    async fn test_one_way_writes_reach_transport() {
        let (a, b) = MemoryPipe::pair();
        let connector = Connector::new(a);

        for name in 0..5 {
            assert!(connector.accept(&mut Message::new(name, Vec::new())));
        }

        assert!(!connector.drops_writes());
        assert_eq!(b.queued(), 5);
    }

    // =============================================================================
    // EARLY TRAFFIC
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_written_before_server_exists_is_answered() {
        for _ in 0..50 {
            let (a, b) = MemoryPipe::pair();
            b.write(&mut Message::new(NOTE, b"hello".to_vec())).unwrap();
            b.write(&mut ping().with_kind(MessageKind::Request { id: 1 }))
                .unwrap();

            let receiver = RecordingReceiver::new();
            assert!(receiver.is_empty());
            let server = Router::with_receiver(a, RouterConfig::default(), receiver.clone());

            wait_until(|| receiver.sink_count() == 1).await;
            assert_eq!(receiver.names(), vec![NOTE, PING]);
            assert_eq!(receiver.payloads(), vec![b"hello".to_vec(), b"ping".to_vec()]);

            let sink = receiver.take_sinks().remove(0);
            assert!(sink.respond(Message::new(PING, b"pong".to_vec())));
            wait_until(|| b.queued() == 1).await;
            assert_eq!(b.read().unwrap().kind(), Ok(MessageKind::Response { id: 1 }));
            assert!(!server.is_closed());
        }
    }
}
