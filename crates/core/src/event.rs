//! Orchestration event system: observe the per-request state machine.
//!
//! The controller publishes every state transition, dispatch and terminal
//! outcome. Subscribers (the gateway's status counters, tests, log sinks)
//! filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All orchestration events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// The request moved between states
    StateChanged {
        request_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// A validated invocation was sent to a tool
    ToolDispatched {
        request_id: String,
        tool_id: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// The tool answered
    ToolCompleted {
        request_id: String,
        tool_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Clarification was requested instead of dispatching
    ClarificationRequested {
        request_id: String,
        tool_id: String,
        missing: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The request reached a terminal outcome
    Completed {
        request_id: String,
        outcome: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestrationEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::StateChanged { request_id, .. }
            | Self::ToolDispatched { request_id, .. }
            | Self::ToolCompleted { request_id, .. }
            | Self::ClarificationRequested { request_id, .. }
            | Self::Completed { request_id, .. } => request_id,
        }
    }
}

/// A broadcast-based event bus for orchestration events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<OrchestrationEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: OrchestrationEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OrchestrationEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(OrchestrationEvent::ToolDispatched {
            request_id: "req-1".into(),
            tool_id: "quiz_generator".into(),
            confidence: 0.8,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), "req-1");
        match event.as_ref() {
            OrchestrationEvent::ToolDispatched { tool_id, .. } => assert_eq!(tool_id, "quiz_generator"),
            other => panic!("Expected ToolDispatched, got {other:?}"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(4);
        bus.publish(OrchestrationEvent::Completed {
            request_id: "r".into(),
            outcome: "no_intent".into(),
            duration_ms: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
