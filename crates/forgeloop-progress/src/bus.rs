use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::event::ProgressEvent;

/// Per-subscriber buffer size used by [`ProgressBus::new`].
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Fan-out bus for progress events.
///
/// Publishing never waits on subscribers. Each subscriber owns a bounded
/// window over the stream; one that falls behind loses its oldest buffered
/// events while the publisher and the other subscribers are unaffected.
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
    last: Arc<Mutex<Option<ProgressEvent>>>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Publish an event to every live subscriber.
    pub fn publish(&self, event: ProgressEvent) {
        tracing::trace!(
            job_id = %event.job_id,
            phase = %event.phase,
            status = event.status.as_str(),
            "Publishing progress event"
        );
        *self.last.lock() = Some(event.clone());
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Most recently published event, if any.
    pub fn last_event(&self) -> Option<ProgressEvent> {
        self.last.lock().clone()
    }
}

/// Receiving side of a [`ProgressBus`].
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressEvent>,
    dropped: u64,
}

impl ProgressSubscription {
    /// Wait for the next event. Returns `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Number of events this subscriber lost to lagging.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        tracing::warn!(
            skipped,
            total_dropped = self.dropped,
            "Progress subscriber lagged; oldest events dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProgressStatus;

    fn event(phase: &str) -> ProgressEvent {
        ProgressEvent::new("job-1", phase, ProgressStatus::Running)
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event_in_order() {
        let bus = ProgressBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let mut third = bus.subscribe();

        for i in 0..10 {
            bus.publish(event(&format!("step-{i}")));
        }

        for sub in [&mut first, &mut second, &mut third] {
            for i in 0..10 {
                let received = sub.recv().await.unwrap();
                assert_eq!(received.phase, format!("step-{i}"));
            }
            assert!(sub.try_recv().is_none());
            assert_eq!(sub.dropped(), 0);
        }
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_only_its_oldest_events() {
        let bus = ProgressBus::with_capacity(4);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        let mut fast_seen = Vec::new();
        for i in 0..6 {
            bus.publish(event(&format!("e{i}")));
            fast_seen.push(fast.recv().await.unwrap().phase);
        }

        let slow_seen: Vec<String> = std::iter::from_fn(|| slow.try_recv())
            .map(|e| e.phase)
            .collect();

        assert_eq!(slow_seen, vec!["e2", "e3", "e4", "e5"]);
        assert_eq!(slow.dropped(), 2);
        assert_eq!(fast_seen, vec!["e0", "e1", "e2", "e3", "e4", "e5"]);
        assert_eq!(fast.dropped(), 0);
    }

    #[test]
    fn test_publish_never_blocks_without_readers() {
        let bus = ProgressBus::with_capacity(8);
        let _idle = bus.subscribe();

        for i in 0..10_000 {
            bus.publish(event(&format!("e{i}")));
        }

        assert_eq!(bus.last_event().unwrap().phase, "e9999");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = ProgressBus::new();
        bus.publish(event("lonely"));
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.last_event().unwrap().phase, "lonely");
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_bus_dropped() {
        let bus = ProgressBus::new();
        let mut sub = bus.subscribe();
        bus.publish(event("last"));
        drop(bus);

        assert_eq!(sub.recv().await.unwrap().phase, "last");
        assert!(sub.recv().await.is_none());
    }
}
