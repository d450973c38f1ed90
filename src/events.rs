//! Event Publisher (spec §4.8): durable append-only stream of `HealthEvent`s
//! for UI/subscriber consumption, with a best-effort direct-push fallback.
//! Grounded in the teacher's `sse.rs` `EventBroadcaster` (a
//! `tokio::sync::broadcast` channel fanned out to SSE streams) —
//! generalized with a bounded ring buffer so late subscribers can replay
//! recent history instead of only seeing events emitted after they connect.

use crate::model::HealthEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Seam for publishing events. The default `BroadcastEventTransport` below
/// is an in-process implementation; a host application backed by a real
/// durable stream (Kafka, Redis streams, ...) would implement this instead.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Append `event` to the durable stream. Delivery is at-least-once;
    /// consumers must be idempotent by `(monitorId, check.id)` (spec §4.8).
    async fn publish(&self, event: HealthEvent);

    /// Best-effort direct push to a single session, used when the append
    /// itself fails (spec §4.8 fallback). Never required to succeed.
    async fn push_to_session(&self, _session_id: &str, _event: HealthEvent) {}
}

/// Reference implementation: a `tokio::sync::broadcast` channel (for live
/// subscribers, mirroring the teacher's `EventBroadcaster::send`) backed by
/// a bounded ring buffer (capacity ~10 000) so a subscriber that reconnects
/// can replay what it missed.
pub struct BroadcastEventTransport {
    sender: broadcast::Sender<HealthEvent>,
    history: Mutex<VecDeque<HealthEvent>>,
    capacity: usize,
}

impl BroadcastEventTransport {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.min(4096).max(16));
        BroadcastEventTransport { sender, history: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.sender.subscribe()
    }

    /// Events retained for replay, oldest first.
    pub fn recent(&self) -> Vec<HealthEvent> {
        self.history.lock().expect("event history poisoned").iter().cloned().collect()
    }
}

impl Default for BroadcastEventTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventTransport for BroadcastEventTransport {
    async fn publish(&self, event: HealthEvent) {
        {
            let mut history = self.history.lock().expect("event history poisoned");
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        // No subscribers is not an error — the append above already
        // happened, satisfying the durability contract independent of
        // whether anyone is listening live.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HealthState;
    use chrono::Utc;

    fn event(monitor_id: &str) -> HealthEvent {
        HealthEvent {
            user_id: Some("u1".to_string()),
            monitor_id: monitor_id.to_string(),
            status: HealthState::Down,
            check_id: Some("c1".to_string()),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_appends_to_history_even_without_subscribers() {
        let transport = BroadcastEventTransport::new(100);
        transport.publish(event("m1")).await;
        assert_eq!(transport.recent().len(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let transport = BroadcastEventTransport::new(100);
        let mut rx = transport.subscribe();
        transport.publish(event("m1")).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.monitor_id, "m1");
    }

    #[tokio::test]
    async fn history_is_bounded_by_capacity() {
        let transport = BroadcastEventTransport::new(3);
        for i in 0..5 {
            transport.publish(event(&format!("m{i}"))).await;
        }
        let recent = transport.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].monitor_id, "m2");
        assert_eq!(recent[2].monitor_id, "m4");
    }
}
