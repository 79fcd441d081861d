//! Event types for the FaceUp event system
//!
//! Scan pipeline transitions and subscription updates are broadcast on an
//! in-process [`EventBus`]. Delivery is best-effort: persisted state is the
//! source of truth and clients that miss an event recover by polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// FaceUp event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FaceUpEvent {
    /// Scan session created and continuation spawned
    ScanSessionStarted {
        session_id: Uuid,
        user_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Scan session moved to a new status and/or progress value
    ScanProgressUpdate {
        session_id: Uuid,
        status: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Scan session reached `completed`
    ScanSessionCompleted {
        session_id: Uuid,
        suggestion_count: usize,
        used_fallback_analysis: bool,
        timestamp: DateTime<Utc>,
    },

    /// Scan session reached `failed`
    ScanSessionFailed {
        session_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Local subscription record overwritten from a billing event
    SubscriptionUpdated {
        user_id: String,
        status: String,
        plan_type: String,
        timestamp: DateTime<Utc>,
    },
}

impl FaceUpEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            FaceUpEvent::ScanSessionStarted { .. } => "ScanSessionStarted",
            FaceUpEvent::ScanProgressUpdate { .. } => "ScanProgressUpdate",
            FaceUpEvent::ScanSessionCompleted { .. } => "ScanSessionCompleted",
            FaceUpEvent::ScanSessionFailed { .. } => "ScanSessionFailed",
            FaceUpEvent::SubscriptionUpdated { .. } => "SubscriptionUpdated",
        }
    }

    /// Scan session this event belongs to, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            FaceUpEvent::ScanSessionStarted { session_id, .. }
            | FaceUpEvent::ScanProgressUpdate { session_id, .. }
            | FaceUpEvent::ScanSessionCompleted { session_id, .. }
            | FaceUpEvent::ScanSessionFailed { session_id, .. } => Some(*session_id),
            FaceUpEvent::SubscriptionUpdated { .. } => None,
        }
    }
}

/// Broadcast bus shared by the pipeline, the webhook dispatcher and SSE clients
///
/// Cloning is cheap; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FaceUpEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FaceUpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FaceUpEvent,
    ) -> Result<usize, broadcast::error::SendError<FaceUpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FaceUpEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(FaceUpEvent::ScanSessionStarted {
            session_id: Uuid::new_v4(),
            user_id: None,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 10);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        for progress in [25u8, 50, 75] {
            bus.emit_lossy(FaceUpEvent::ScanProgressUpdate {
                session_id,
                status: "analyzing".to_string(),
                progress,
                timestamp: Utc::now(),
            });
        }

        for expected in [25u8, 50, 75] {
            match rx.recv().await.unwrap() {
                FaceUpEvent::ScanProgressUpdate { progress, .. } => assert_eq!(progress, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_serialized_event_carries_type_tag() {
        let event = FaceUpEvent::ScanSessionFailed {
            session_id: Uuid::new_v4(),
            error: "generator unavailable".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ScanSessionFailed");
        assert_eq!(json["error"], "generator unavailable");
        assert_eq!(event.event_type(), "ScanSessionFailed");
        assert!(event.session_id().is_some());
    }

    #[test]
    fn test_subscription_event_has_no_session() {
        let event = FaceUpEvent::SubscriptionUpdated {
            user_id: "user-1".to_string(),
            status: "active".to_string(),
            plan_type: "monthly".to_string(),
            timestamp: Utc::now(),
        };
        assert!(event.session_id().is_none());
    }
}
