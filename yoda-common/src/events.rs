//! Event types for the yoda event system
//!
//! The session controller emits a [`YodaEvent`] for every transition it makes;
//! the HTTP layer relays them to SSE clients. Events are observational only.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why a playback session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// No renewing scan arrived within the inactivity timeout
    Inactivity,
    /// A different tag was scanned
    Displaced,
    /// The configured stop tag was scanned
    StopTag,
    /// Cooldown expiry found a session that outlived its inactivity deadline
    Defensive,
    /// Process shutdown
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Inactivity => "inactivity",
            StopReason::Displaced => "displaced",
            StopReason::StopTag => "stop-tag",
            StopReason::Defensive => "defensive",
            StopReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a scan did not start playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Identifier missing from the catalog (or its entry is malformed)
    UnknownId,
    /// A stop happened less than the cooldown delay ago
    Cooldown,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnknownId => "unknown-id",
            RejectReason::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// yoda event types
///
/// Broadcast via [`EventBus`] and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum YodaEvent {
    /// A tag started a new playback session
    PlaybackStarted {
        session_id: Uuid,
        track_id: String,
        file: String,
        offset_seconds: f64,
        /// Tag whose session was interrupted by this start, if any
        displaced: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active tag was scanned again and its session extended
    PlaybackContinued {
        session_id: Uuid,
        track_id: String,
        /// Seconds credited to the track by this re-scan
        seconds_flushed: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback session ended
    PlaybackStopped {
        session_id: Uuid,
        track_id: String,
        reason: StopReason,
        /// Total seconds played across the whole session
        seconds_played: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A scan was rejected without any state change
    ScanRejected {
        track_id: String,
        reason: RejectReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The post-stop cooldown expired; new starts are allowed again
    CooldownLifted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The player backend failed to execute a command
    BackendFailed {
        /// "start" or "stop"
        command: String,
        message: String,
        session_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl YodaEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            YodaEvent::PlaybackStarted { .. } => "PlaybackStarted",
            YodaEvent::PlaybackContinued { .. } => "PlaybackContinued",
            YodaEvent::PlaybackStopped { .. } => "PlaybackStopped",
            YodaEvent::ScanRejected { .. } => "ScanRejected",
            YodaEvent::CooldownLifted { .. } => "CooldownLifted",
            YodaEvent::BackendFailed { .. } => "BackendFailed",
        }
    }
}

/// Broadcast channel for [`YodaEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<YodaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<YodaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: YodaEvent) {
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

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_event_serializes_with_type_tag() {
        let event = YodaEvent::PlaybackStopped {
            session_id: Uuid::new_v4(),
            track_id: "A".to_string(),
            reason: StopReason::StopTag,
            seconds_played: 1.5,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlaybackStopped");
        assert_eq!(json["reason"], "stop-tag");
        assert_eq!(json["track_id"], "A");
        assert_eq!(event.event_type(), "PlaybackStopped");
    }

    #[test]
    fn test_reject_reason_strings() {
        assert_eq!(RejectReason::UnknownId.as_str(), "unknown-id");
        assert_eq!(RejectReason::Cooldown.to_string(), "cooldown");
        let json = serde_json::to_string(&RejectReason::UnknownId).unwrap();
        assert_eq!(json, "\"unknown-id\"");
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(YodaEvent::CooldownLifted {
            timestamp: chrono::Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "CooldownLifted");
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit_lossy(YodaEvent::CooldownLifted {
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }
}
