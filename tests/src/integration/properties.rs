//! # Router Invariants
//!
//! Properties that must hold across many calls rather than one exchange:
//! request id allocation, single resolution of every call and isolation of
//! unknown responses.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::timeout;

    use pipe_router::test_utils::{wait_until, Outcome, RecordingResponder};
    use pipe_router::{
        IncomingReceiver, MemoryPipe, MessagePipe, PendingResponders, ResponseSink, Router,
        RouterConfig,
    };
    use pipe_types::{ConnectionError, Message, MessageKind, PipeError};

    /// Echo server that remembers every request id it answered.
    #[derive(Clone, Default)]
    struct IdRecordingEcho {
        ids: Arc<Mutex<Vec<u64>>>,
    }

    impl IncomingReceiver for IdRecordingEcho {
        fn accept(&self, _message: Message) -> bool {
            true
        }

        fn accept_with_responder(&self, message: Message, responder: ResponseSink) -> bool {
            self.ids.lock().push(responder.request_id());
            responder.respond(Message::new(message.name(), message.payload().to_vec()))
        }
    }

    #[tokio::test]
    async fn test_request_ids_strictly_increase_from_one() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);

        for _ in 0..100 {
            router
                .accept_with_responder(Message::new(1, Vec::new()), RecordingResponder::new())
                .await
                .unwrap();
        }

        let ids: Vec<u64> = (0..100)
            .map(|_| b.read().unwrap().request_id().unwrap())
            .collect();
        assert_eq!(ids.first(), Some(&1));
        assert!(ids.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert_eq!(router.stats().total_issued.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_request_ids_never_zero_across_wraparound() {
        let store = PendingResponders::starting_at(u64::MAX - 2);
        let ids: Vec<u64> = (0..5)
            .map(|_| store.register(Box::new(RecordingResponder::new())).unwrap())
            .collect();

        assert_eq!(ids, vec![u64::MAX - 2, u64::MAX - 1, u64::MAX, 1, 2]);
        assert!(!ids.contains(&0));
    }

    #[tokio::test]
    async fn test_every_call_resolves_exactly_once() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let responders: Vec<_> = (0..10).map(|_| RecordingResponder::new()).collect();
        for responder in &responders {
            router
                .accept_with_responder(Message::new(1, Vec::new()), responder.clone())
                .await
                .unwrap();
        }

        // Answer the even ids, then vanish.
        for _ in 0..10 {
            let id = b.read().unwrap().request_id().unwrap();
            if id % 2 == 0 {
                b.write(&mut Message::new(1, id.to_le_bytes().to_vec()).with_kind(
                    MessageKind::Response { id },
                ))
                .unwrap();
            }
        }
        drop(b);

        wait_until(|| router.encountered_error()).await;
        for (index, responder) in responders.iter().enumerate() {
            let id = index as u64 + 1;
            let expected = if id % 2 == 0 {
                Outcome::Accepted(id.to_le_bytes().to_vec())
            } else {
                Outcome::Rejected(ConnectionError::Pipe(PipeError::FailedPrecondition))
            };
            assert_eq!(responder.outcomes(), vec![expected], "request {id}");
        }

        let stats = router.stats();
        assert_eq!(stats.total_completed.load(Ordering::Relaxed), 5);
        assert_eq!(stats.total_rejected.load(Ordering::Relaxed), 5);
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_distinct_ids() {
        let (a, b) = MemoryPipe::pair();
        let client = Arc::new(Router::new(a));
        let echo = IdRecordingEcho::default();
        let _server = Router::with_receiver(b, RouterConfig::default(), echo.clone());

        let mut tasks = Vec::new();
        for worker in 0u32..4 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                for seq in 0u32..25 {
                    let payload = [worker.to_le_bytes(), seq.to_le_bytes()].concat();
                    let response = client.call(Message::new(1, payload.clone())).await?;
                    assert_eq!(response.payload(), payload.as_slice());
                }
                Ok::<_, ConnectionError>(())
            }));
        }
        for task in tasks {
            timeout(Duration::from_secs(5), task)
                .await
                .expect("timeout")
                .expect("join")
                .unwrap();
        }

        let ids = echo.ids.lock().clone();
        assert_eq!(ids.len(), 100);
        assert!(!ids.contains(&0));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 100);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_response_leaves_pending_untouched() {
        let (a, b) = MemoryPipe::pair();
        let router = Router::new(a);
        let responder = RecordingResponder::new();
        router
            .accept_with_responder(Message::new(1, Vec::new()), responder.clone())
            .await
            .unwrap();

        b.write(&mut Message::new(1, Vec::new()).with_kind(MessageKind::Response { id: 77 }))
            .unwrap();
        wait_until(|| router.stats().total_unmatched.load(Ordering::Relaxed) == 1).await;

        assert_eq!(router.pending_ids(), vec![1]);
        assert!(responder.outcomes().is_empty());
        assert!(!router.is_closed());
    }
}
