//! Coordinator event system.
//!
//! Events describe what the coordinator did (connected, polled, backed off,
//! published) so hosts can log or react without polling the snapshot.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::snapshot::Field;

/// Why a poll attempt did not read anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollSkipReason {
    /// A live session is delivering notifications.
    LiveSessionActive,
    /// The snapshot changed more recently than the poll interval.
    RecentData,
    /// A live attempt holds the connection lease.
    LeaseBusy,
    /// No recent advertisement from the device.
    NotObservable,
}

/// Why a live session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The remote side dropped the link.
    Remote,
    /// A keep-alive read failed.
    KeepAliveFailed(String),
    /// The coordinator is shutting down.
    Shutdown,
}

/// Events emitted by a coordinator.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A live session is established and subscribed.
    LiveConnected { address: String },
    /// A live session ended.
    LiveDisconnected {
        address: String,
        reason: DisconnectReason,
    },
    /// Opening a session failed.
    ConnectFailed { address: String, error: String },
    /// The live loop is waiting before its next attempt.
    BackoffScheduled {
        address: String,
        #[serde(with = "duration_secs")]
        delay: Duration,
    },
    /// A poll attempt finished reading.
    PollCompleted { address: String, fields: usize },
    /// A poll attempt was skipped.
    PollSkipped {
        address: String,
        reason: PollSkipReason,
    },
    /// The snapshot was republished.
    SnapshotUpdated { address: String, changed: Vec<Field> },
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_to_subscribers() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(DeviceEvent::LiveConnected {
            address: "AA:BB".into(),
        });
        match rx.recv().await.unwrap() {
            DeviceEvent::LiveConnected { address } => assert_eq!(address, "AA:BB"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(DeviceEvent::PollCompleted {
            address: "AA:BB".into(),
            fields: 3,
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = DeviceEvent::BackoffScheduled {
            address: "AA:BB".into(),
            delay: Duration::from_secs(10),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"backoff_scheduled""#));
        assert!(json.contains(r#""delay":10.0"#));

        let event = DeviceEvent::PollSkipped {
            address: "AA:BB".into(),
            reason: PollSkipReason::LeaseBusy,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""reason":"lease_busy""#));
    }
}
