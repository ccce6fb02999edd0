use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aies_core::{DeviceId, ScheduleDocument};
use aies_validate::ValidationReport;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Updated,
    Error,
    CommandActivated,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Topic::Updated => "updated",
            Topic::Error => "error",
            Topic::CommandActivated => "command_activated",
        };
        write!(f, "{s}")
    }
}

/// Something observers of the schedule may care about.
#[derive(Debug, Clone)]
pub enum ScheduleEvent {
    /// A new document is in effect.
    Updated {
        seq: u64,
        document: Arc<ScheduleDocument>,
        /// Devices added, removed, or whose intervals changed.
        changed: Vec<DeviceId>,
    },
    /// A candidate was rejected; the previous document stays in effect.
    Error { seq: u64, report: ValidationReport },
    /// A device's active command changed (`None` means nothing is active).
    CommandActivated {
        seq: u64,
        device_id: DeviceId,
        command: Option<String>,
    },
}

impl ScheduleEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ScheduleEvent::Updated { .. } => Topic::Updated,
            ScheduleEvent::Error { .. } => Topic::Error,
            ScheduleEvent::CommandActivated { .. } => Topic::CommandActivated,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            ScheduleEvent::Updated { seq, .. }
            | ScheduleEvent::Error { seq, .. }
            | ScheduleEvent::CommandActivated { seq, .. } => *seq,
        }
    }

    /// JSON rendering for logs and transports.
    pub fn to_json(&self) -> Value {
        match self {
            ScheduleEvent::Updated {
                seq,
                document,
                changed,
            } => json!({
                "event": "updated",
                "seq": seq,
                "devices": document.device_count(),
                "changed": changed,
            }),
            ScheduleEvent::Error { seq, report } => json!({
                "event": "error",
                "seq": seq,
                "error": report.to_string(),
                "issues": report.issues,
            }),
            ScheduleEvent::CommandActivated {
                seq,
                device_id,
                command,
            } => json!({
                "event": "command_activated",
                "seq": seq,
                "device_id": device_id,
                "command": command,
            }),
        }
    }
}

/// Fan-out of schedule events via a tokio broadcast channel.
///
/// Publishing never waits on subscribers: each one has a bounded buffer and
/// a subscriber that falls behind loses its oldest events.
pub struct NotificationBus {
    tx: broadcast::Sender<ScheduleEvent>,
    seq: AtomicU64,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to one topic.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: Some(topic),
        }
    }

    /// Subscribe to every topic.
    pub fn subscribe_all(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish_updated(&self, document: Arc<ScheduleDocument>, changed: Vec<DeviceId>) {
        let seq = self.next_seq();
        self.send(ScheduleEvent::Updated {
            seq,
            document,
            changed,
        });
    }

    pub fn publish_error(&self, report: ValidationReport) {
        let seq = self.next_seq();
        self.send(ScheduleEvent::Error { seq, report });
    }

    pub fn publish_command(&self, device_id: DeviceId, command: Option<String>) {
        let seq = self.next_seq();
        self.send(ScheduleEvent::CommandActivated {
            seq,
            device_id,
            command,
        });
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Silently drops if no subscribers exist.
    fn send(&self, event: ScheduleEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(aies_core::config::DEFAULT_BUS_CAPACITY)
    }
}

/// Receiving end of a bus subscription, optionally filtered to one topic.
pub struct Subscription {
    rx: broadcast::Receiver<ScheduleEvent>,
    topic: Option<Topic>,
}

impl Subscription {
    fn wants(&self, event: &ScheduleEvent) -> bool {
        self.topic.map_or(true, |t| t == event.topic())
    }

    /// Next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ScheduleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, topic = ?self.topic, "subscriber lagging; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<ScheduleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, topic = ?self.topic, "subscriber lagging; events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a `Stream` of matching events.
    pub fn into_stream(self) -> impl Stream<Item = ScheduleEvent> + Send + Unpin {
        let topic = self.topic;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(event) if topic.map_or(true, |t| t == event.topic()) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(skipped = n, ?topic, "event stream lagging; events dropped");
                None
            }
        })
    }
}
