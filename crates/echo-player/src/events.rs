//! In-process event bus for engine updates.
//!
//! Provides a lightweight broadcast channel for UI subscriptions.

use tokio::sync::broadcast;

use echo_types::TrackId;

/// Event payloads published by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    QueueChanged,
    StatusChanged,
    TrackChanged { track_id: Option<TrackId> },
    PlaybackFailed { track_id: TrackId, reason: String },
    QueueEnded,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Notify subscribers that the queue has changed.
    pub fn queue_changed(&self) {
        let _ = self.sender.send(EngineEvent::QueueChanged);
    }

    /// Notify subscribers that playback status has changed.
    pub fn status_changed(&self) {
        let _ = self.sender.send(EngineEvent::StatusChanged);
    }

    pub fn track_changed(&self, track_id: Option<TrackId>) {
        let _ = self.sender.send(EngineEvent::TrackChanged { track_id });
    }

    pub fn playback_failed(&self, track_id: TrackId, reason: String) {
        let _ = self
            .sender
            .send(EngineEvent::PlaybackFailed { track_id, reason });
    }

    /// Notify subscribers that playback stopped at the end of the queue.
    pub fn queue_ended(&self) {
        let _ = self.sender.send(EngineEvent::QueueEnded);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
