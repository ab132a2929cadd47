//! Event queue — the per-invocation event bus between the executor
//! (producer) and the request handler (consumer).
//!
//! Built on a `tokio::sync::broadcast` channel: the executor publishes
//! [`StreamResponse`] events synchronously, the server side delivers them to
//! SSE streams or collects them for synchronous responses. Closing the queue
//! marks the bus finished; further publishes are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::StreamResponse;

/// Default channel capacity for the event queue.
const DEFAULT_CAPACITY: usize = 256;

/// How long the consumer waits per poll before re-checking for closure.
const CONSUMER_POLL: Duration = Duration::from_millis(500);

/// Per-invocation broadcast bus for A2A streaming events.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: broadcast::Sender<StreamResponse>,
    closed: Arc<AtomicBool>,
}

impl EventQueue {
    /// Create a queue with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a queue with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamResponse> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers. Synchronous; events published
    /// after the queue is closed are dropped with a warning.
    pub fn publish(&self, event: StreamResponse) {
        if self.closed.load(Ordering::Acquire) {
            warn!("event queue is closed; dropping event");
            return;
        }
        if self.tx.send(event).is_err() {
            // No live subscriber — the request side may have disconnected.
            debug!("published event had no subscribers");
        }
    }

    /// Mark the bus finished. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the bus has been marked finished.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Consumer that reads one invocation's events off the queue.
pub struct EventConsumer {
    rx: broadcast::Receiver<StreamResponse>,
    queue: EventQueue,
}

impl EventConsumer {
    /// Subscribe a new consumer to the queue.
    pub fn new(queue: EventQueue) -> Self {
        let rx = queue.subscribe();
        Self { rx, queue }
    }

    /// Collect every event up to and including the final one.
    ///
    /// Returns early when the queue closes without a final event (the
    /// producer finished the bus).
    pub async fn collect_until_final(&mut self) -> Vec<StreamResponse> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            let is_final = event.is_final();
            events.push(event);
            if is_final {
                break;
            }
        }
        events
    }

    /// Next event, or `None` once the stream is finished.
    pub async fn next_event(&mut self) -> Option<StreamResponse> {
        loop {
            match tokio::time::timeout(CONSUMER_POLL, self.rx.recv()).await {
                Ok(Ok(event)) => return Some(event),
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!(missed, "event consumer lagged");
                    continue;
                }
                Err(_timeout) => {
                    if self.queue.is_closed() {
                        // Drain anything still buffered, then stop.
                        match self.rx.try_recv() {
                            Ok(event) => return Some(event),
                            Err(_) => return None,
                        }
                    }
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskState, TaskStatus, TaskStatusUpdateEvent};

    fn status_event(state: TaskState, r#final: bool) -> StreamResponse {
        StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
            task_id: "t1".to_string(),
            context_id: "c1".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus {
                state,
                message: None,
                timestamp: None,
            },
            r#final,
            metadata: None,
        })
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let queue = EventQueue::new(16);
        let mut rx = queue.subscribe();
        queue.publish(status_event(TaskState::Working, false));

        match rx.try_recv().unwrap() {
            StreamResponse::StatusUpdate(update) => {
                assert_eq!(update.status.state, TaskState::Working)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_queue_drops_events() {
        let queue = EventQueue::new(16);
        let mut rx = queue.subscribe();
        queue.close();
        queue.publish(status_event(TaskState::Working, false));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn collect_stops_at_final_event() {
        let queue = EventQueue::new(16);
        let mut consumer = EventConsumer::new(queue.clone());

        queue.publish(status_event(TaskState::Working, false));
        queue.publish(status_event(TaskState::Completed, true));
        queue.publish(status_event(TaskState::Working, false));

        let events = consumer.collect_until_final().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_final());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn zero_capacity_panics() {
        let _ = EventQueue::new(0);
    }
}
