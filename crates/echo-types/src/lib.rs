use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a track, unique within a collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where the playable media for a track lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MediaRef {
    /// A location the transport can load directly (URL or file path).
    Ready(String),
    /// A storage reference that must be resolved before loading.
    Resolvable(String),
}

/// Immutable track record handed to the engine by the library layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Stable id used for de-duplication and lookups.
    pub id: TrackId,
    /// Display title.
    pub title: String,
    /// Display artist, if known.
    pub artist: Option<String>,
    /// Artwork URL pushed to the OS media session, if any.
    #[serde(default)]
    pub artwork: Option<String>,
    /// Duration from library metadata, used as the preferred seek bound.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Playable media reference.
    pub media: MediaRef,
}

impl Track {
    /// Build a track whose media is directly playable.
    pub fn ready(id: impl Into<String>, title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(id),
            title: title.into(),
            artist: None,
            artwork: None,
            duration_ms: None,
            media: MediaRef::Ready(location.into()),
        }
    }

    /// Build a track whose media must be resolved from storage first.
    pub fn resolvable(
        id: impl Into<String>,
        title: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Self {
        Self {
            media: MediaRef::Resolvable(storage_path.into()),
            ..Self::ready(id, title, String::new())
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Lifecycle of the current track as seen by the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No current track.
    #[default]
    Idle,
    /// Media location is being resolved or loaded.
    Loading,
    /// Loaded and playing.
    Playing,
    /// Loaded and paused.
    Paused,
    /// The queue ran out; the last track stays current.
    Ended,
}

/// Events reported by the media output back to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Periodic position report.
    Progress {
        elapsed_ms: u64,
        duration_ms: Option<u64>,
    },
    /// Native end-of-media signal.
    Ended,
    /// The output refused or failed to load the active source.
    LoadFailed { reason: String },
}

/// Actions an OS-level media session can invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
    SeekTo,
    SeekForward,
    SeekBackward,
}

impl SessionAction {
    pub const ALL: [SessionAction; 7] = [
        SessionAction::Play,
        SessionAction::Pause,
        SessionAction::NextTrack,
        SessionAction::PreviousTrack,
        SessionAction::SeekTo,
        SessionAction::SeekForward,
        SessionAction::SeekBackward,
    ];
}

/// Point-in-time view of the player for rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Track loaded in the transport.
    pub current: Option<Track>,
    /// User insertions, played before the context.
    pub manual_queue: Vec<Track>,
    /// Upcoming context entries after the cursor, capped to the configured window.
    pub upcoming: Vec<Track>,
    /// Previously current tracks, most recent last.
    pub history: Vec<Track>,
    /// Index of the last consumed context entry.
    pub context_cursor: usize,
    /// Length of the context sequence.
    pub context_len: usize,
    /// `true` while the context sequence is a shuffled permutation.
    pub shuffle: bool,
    /// Remaining immediate replays of the current track.
    pub repeat_pending: u32,
    /// Play intent flag.
    pub is_playing: bool,
    /// Current phase.
    pub phase: PlaybackPhase,
    /// Elapsed time on the current track in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Best known duration of the current track in milliseconds.
    pub duration_ms: Option<u64>,
}
