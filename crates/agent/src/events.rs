//! Live feed for operator consoles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use agroquote_core::domain::session::{MemoryEntry, Role};

const CAPACITY: usize = 256;

/// One change an observer should hear about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Message { id: String, role: Role, content: String, at: DateTime<Utc> },
    Conversations { id: Option<String> },
    Handoff { id: String, human: bool, until: Option<DateTime<Utc>> },
    Read { id: String },
    Ping { at: DateTime<Utc> },
}

impl LiveEvent {
    pub fn message(id: &str, entry: &MemoryEntry) -> Self {
        Self::Message { id: id.to_string(), role: entry.role, content: entry.content.clone(), at: entry.at }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "msg",
            Self::Conversations { .. } => "convos",
            Self::Handoff { .. } => "handoff",
            Self::Read { .. } => "read",
            Self::Ping { .. } => "ping",
        }
    }

    /// SSE data payload.
    pub fn payload(&self) -> Value {
        match self {
            Self::Message { id, role, content, at } => {
                json!({ "id": id, "role": role, "content": content, "at": at })
            }
            Self::Conversations { id } => json!({ "id": id }),
            Self::Handoff { id, human, until } => json!({ "id": id, "human": human, "until": until }),
            Self::Read { id } => json!({ "id": id }),
            Self::Ping { at } => json!({ "t": at.timestamp_millis() }),
        }
    }
}

/// Fan-out of [`LiveEvent`]s. A dropped receiver leaves the registry with it.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LiveEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    /// Sends to every observer; returns how many received it.
    pub fn publish(&self, event: LiveEvent) -> usize {
        match self.sender.send(event) {
            Ok(observers) => observers,
            Err(broadcast::error::SendError(event)) => {
                debug!(event_name = "events.no_observers", kind = event.name(), "no observer connected");
                0
            }
        }
    }

    pub fn observers(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{EventBus, LiveEvent};

    #[tokio::test]
    async fn every_observer_gets_each_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let delivered = bus.publish(LiveEvent::Read { id: "59170000001".to_string() });

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.expect("first observer").name(), "read");
        assert_eq!(second.recv().await.expect("second observer").name(), "read");
    }

    #[test]
    fn closed_observer_is_removed() {
        let bus = EventBus::new();
        let observer = bus.subscribe();
        assert_eq!(bus.observers(), 1);

        drop(observer);
        assert_eq!(bus.observers(), 0);
        assert_eq!(bus.publish(LiveEvent::Ping { at: Utc::now() }), 0);
    }

    #[test]
    fn payloads_carry_conversation_ids() {
        let event = LiveEvent::Handoff { id: "59170000002".to_string(), human: true, until: None };
        assert_eq!(event.payload()["id"], "59170000002");
        assert_eq!(event.payload()["human"], true);
        assert_eq!(LiveEvent::Conversations { id: None }.name(), "convos");
    }
}
