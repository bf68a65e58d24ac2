//! Best-effort fan-out of progress events
//!
//! Each subscriber owns a bounded mailbox. Publishing never waits: a full
//! mailbox drops the event and an execution without subscribers is a no-op.
//! Events are not buffered for subscribers that arrive late.

use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::trace;

use crate::models::{ExecutionId, LogEvent};

/// Default number of events a mailbox holds before dropping
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

struct Mailbox {
    id: u64,
    sender: mpsc::Sender<LogEvent>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    mailboxes: HashMap<ExecutionId, Vec<Mailbox>>,
}

struct BusInner {
    subscribers: Mutex<Subscribers>,
    capacity: usize,
    dropped: AtomicU64,
}

impl BusInner {
    fn remove(&self, execution_id: &ExecutionId, mailbox_id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(mailboxes) = subscribers.mailboxes.get_mut(execution_id) else {
            return false;
        };

        let before = mailboxes.len();
        mailboxes.retain(|m| m.id != mailbox_id);
        let removed = mailboxes.len() != before;
        if mailboxes.is_empty() {
            subscribers.mailboxes.remove(execution_id);
        }
        removed
    }
}

/// Per-execution, many-subscriber event bus
#[derive(Clone)]
pub struct LogBus {
    inner: Arc<BusInner>,
}

impl LogBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Subscribers::default()),
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a mailbox for an execution; events published from now on
    /// are delivered to it
    pub fn subscribe(&self, execution_id: &ExecutionId) -> LogSubscription {
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let mut subscribers = self.inner.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers
            .mailboxes
            .entry(execution_id.clone())
            .or_default()
            .push(Mailbox { id, sender });

        LogSubscription {
            execution_id: execution_id.clone(),
            id,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription's mailbox
    ///
    /// Takes the subscription by value, so it cannot be released twice.
    pub fn unsubscribe(&self, subscription: LogSubscription) {
        drop(subscription);
    }

    /// Deliver an event to every current subscriber of the execution
    pub fn publish(&self, execution_id: &ExecutionId, event: LogEvent) {
        let mut subscribers = self.inner.subscribers.lock();
        let Some(mailboxes) = subscribers.mailboxes.get_mut(execution_id) else {
            return;
        };

        mailboxes.retain(|mailbox| match mailbox.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Mailbox {} for {} is full, event dropped", mailbox.id, execution_id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if mailboxes.is_empty() {
            subscribers.mailboxes.remove(execution_id);
        }
    }

    /// Producer teardown: remove every mailbox of the execution so that the
    /// subscribers' streams end once drained
    pub fn close(&self, execution_id: &ExecutionId) {
        self.inner.subscribers.lock().mailboxes.remove(execution_id);
    }

    pub fn subscriber_count(&self, execution_id: &ExecutionId) -> usize {
        self.inner
            .subscribers
            .lock()
            .mailboxes
            .get(execution_id)
            .map_or(0, Vec::len)
    }

    /// Number of events dropped because a mailbox was full
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live stream of events for one execution
///
/// Ends when the producer closes the execution. Dropping it unsubscribes.
pub struct LogSubscription {
    execution_id: ExecutionId,
    id: u64,
    receiver: mpsc::Receiver<LogEvent>,
    bus: Weak<BusInner>,
}

impl LogSubscription {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Wait for the next event; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Remove this subscription's mailbox so the stream ends once drained,
    /// leaving other subscribers of the execution untouched
    pub fn close(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.execution_id, self.id);
        }
        self.receiver.close();
    }

    /// Whether the producer side has been torn down and the buffer drained
    pub fn is_finished(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

impl Stream for LogSubscription {
    type Item = LogEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogEvent>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.execution_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::{Duration, Instant};

    fn id(s: &str) -> ExecutionId {
        ExecutionId::from(s)
    }

    #[test]
    fn test_subscribe_without_run_yields_nothing() {
        let bus = LogBus::new();
        let mut subscription = bus.subscribe(&id("idle"));
        assert!(subscription.try_recv().is_none());
        assert_eq!(bus.subscriber_count(&id("idle")), 1);

        bus.unsubscribe(subscription);
        assert_eq!(bus.subscriber_count(&id("idle")), 0);
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = LogBus::new();
        let mut a = bus.subscribe(&id("exec"));
        let mut b = bus.subscribe(&id("exec"));
        let mut other = bus.subscribe(&id("other"));

        bus.publish(&id("exec"), LogEvent::info("hello"));

        assert_eq!(a.try_recv().unwrap().message, "hello");
        assert_eq!(b.try_recv().unwrap().message, "hello");
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = LogBus::new();
        bus.publish(&id("exec"), LogEvent::info("early"));
        let mut late = bus.subscribe(&id("exec"));
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_flood_without_subscribers_is_bounded() {
        let bus = LogBus::new();
        let start = Instant::now();
        for i in 0..100_000 {
            bus.publish(&id("nobody"), LogEvent::info(format!("event {i}")));
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(bus.dropped_events(), 0);
    }

    #[test]
    fn test_full_mailbox_drops_instead_of_blocking() {
        let bus = LogBus::with_capacity(4);
        let mut slow = bus.subscribe(&id("exec"));

        for i in 0..10 {
            bus.publish(&id("exec"), LogEvent::info(format!("event {i}")));
        }

        assert_eq!(bus.dropped_events(), 6);
        let received: Vec<_> = std::iter::from_fn(|| slow.try_recv()).collect();
        assert_eq!(received.len(), 4);
        assert_eq!(received[0].message, "event 0");
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let bus = LogBus::new();
        {
            let _subscription = bus.subscribe(&id("exec"));
            assert_eq!(bus.subscriber_count(&id("exec")), 1);
        }
        assert_eq!(bus.subscriber_count(&id("exec")), 0);
        bus.publish(&id("exec"), LogEvent::info("nobody listening"));
    }

    #[test]
    fn test_unsubscribe_after_close() {
        let bus = LogBus::new();
        let subscription = bus.subscribe(&id("exec"));
        bus.close(&id("exec"));
        assert_eq!(bus.subscriber_count(&id("exec")), 0);
        bus.unsubscribe(subscription);
        assert_eq!(bus.subscriber_count(&id("exec")), 0);
    }

    #[tokio::test]
    async fn test_closing_one_subscription_keeps_the_others() {
        let bus = LogBus::new();
        let mut kept = bus.subscribe(&id("exec"));
        let mut closed = bus.subscribe(&id("exec"));

        closed.close();
        assert!(closed.recv().await.is_none());
        assert_eq!(bus.subscriber_count(&id("exec")), 1);

        bus.publish(&id("exec"), LogEvent::info("still here"));
        assert_eq!(kept.try_recv().unwrap().message, "still here");
    }

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let bus = LogBus::new();
        let mut subscription = bus.subscribe(&id("exec"));

        bus.publish(&id("exec"), LogEvent::info("one"));
        bus.publish(&id("exec"), LogEvent::success("two"));
        bus.close(&id("exec"));

        let events: Vec<_> = (&mut subscription).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].message, "two");
        assert!(subscription.is_finished());
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_unsubscribe() {
        let bus = LogBus::with_capacity(8);
        let producer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..2_000 {
                    bus.publish(&id("exec"), LogEvent::info(format!("{i}")));
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        for _ in 0..50 {
            let subscription = bus.subscribe(&id("exec"));
            tokio::task::yield_now().await;
            bus.unsubscribe(subscription);
        }

        producer.await.unwrap();
        assert_eq!(bus.subscriber_count(&id("exec")), 0);
    }
}
