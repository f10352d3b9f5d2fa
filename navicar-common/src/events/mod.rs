//! Event types for the navicar event system
//!
//! Provides discrete player events and the `EventBus` that fans them out to
//! the control API, the playback host and the car bridge.
//!
//! Continuous playback state is NOT sent through the bus: the engine
//! publishes `PlaybackSnapshot`s through a `tokio::sync::watch` channel that
//! keeps only the latest value. The bus carries the one-off facts that a
//! snapshot cannot express.

mod playback_types;

pub use playback_types::{PlaybackAction, PlaybackSnapshot, PlaybackStatus, RejectReason};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// navicar event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Track accepted by the player and ready to play
    ///
    /// Informational; emitted alongside the last-played save, which the
    /// engine performs itself.
    TrackLoaded {
        media_id: String,
        title: String,
        /// 0 when the stream is unbounded
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audio focus request was denied; playback stays paused
    FocusDenied {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Player reported an error; engine entered the Error state
    PlaybackFailed {
        media_id: Option<String>,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport command refused by the state machine
    CommandRejected {
        command: String,
        reason: RejectReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active account switched (or cleared)
    ActiveAccountChanged {
        account_id: Option<i64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Album catalog re-fetched and stored in the session
    CatalogRefreshed {
        album_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::TrackLoaded { .. } => "TrackLoaded",
            PlayerEvent::FocusDenied { .. } => "FocusDenied",
            PlayerEvent::PlaybackFailed { .. } => "PlaybackFailed",
            PlayerEvent::CommandRejected { .. } => "CommandRejected",
            PlayerEvent::ActiveAccountChanged { .. } => "ActiveAccountChanged",
            PlayerEvent::CatalogRefreshed { .. } => "CatalogRefreshed",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use navicar_common::events::{EventBus, PlayerEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::FocusDenied {
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
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
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let result = bus.emit(PlayerEvent::FocusDenied {
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(PlayerEvent::CatalogRefreshed {
            album_count: 3,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PlayerEvent::CatalogRefreshed { album_count, .. } => assert_eq!(album_count, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlayerEvent::CommandRejected {
            command: "seek".to_string(),
            reason: RejectReason::UnboundedStream,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CommandRejected");
        assert_eq!(json["reason"], "unbounded_stream");
        assert_eq!(event.event_type(), "CommandRejected");
    }

    #[test]
    fn test_idle_snapshot_offers_play_only() {
        let snapshot = PlaybackSnapshot::idle();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert!(snapshot.allows(PlaybackAction::Play));
        assert!(!snapshot.allows(PlaybackAction::SeekTo));
        assert!(snapshot.is_stream());
    }
}
