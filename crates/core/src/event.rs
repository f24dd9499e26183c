//! Domain event system: decoupled observation of quiz runs.
//!
//! The agent loop publishes an event at every state transition. The gateway
//! and CLI subscribe to log progress without reaching into the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run was seeded with its first quiz URL
    RunStarted {
        run_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// The oracle answered one step
    OracleInvoked {
        run_id: String,
        step: u32,
        tool_calls: usize,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The grader answered a submission
    SubmissionEvaluated {
        run_id: String,
        correct: bool,
        next_url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal state
    RunFinished {
        run_id: String,
        status: String,
        steps: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
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

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "run_code".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "run_code");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RunFinished {
            run_id: "r1".into(),
            status: "failed".into(),
            steps: 3,
            timestamp: Utc::now(),
        });
    }
}
