//! OS media-session bridge.
//!
//! Mirrors the current track and play state to a platform media session and relays
//! hardware/OS control intents back into the player. The bridge is an observer; it never
//! owns queue state.

use std::sync::Arc;

use echo_types::{SessionAction, Track, TrackId};

/// Extra data delivered with a hardware intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionDetails {
    /// Absolute target for `SeekTo`.
    pub seek_time_ms: Option<u64>,
    /// Offset for `SeekForward` / `SeekBackward`.
    pub seek_offset_ms: Option<u64>,
}

pub type ActionHandler = Arc<dyn Fn(ActionDetails) + Send + Sync>;

/// Receives every intent the bridge relays.
pub type IntentDispatch = Arc<dyn Fn(SessionAction, ActionDetails) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub artwork: Option<String>,
}

impl From<&Track> for SessionMetadata {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork: track.artwork.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPlaybackState {
    None,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionState {
    pub duration_ms: u64,
    pub position_ms: u64,
    pub rate: f32,
}

/// Platform media session (lock screen, media keys, notification controls).
pub trait MediaSession: Send {
    fn set_metadata(&mut self, metadata: Option<SessionMetadata>);
    fn set_playback_state(&mut self, state: SessionPlaybackState);
    fn set_position_state(&mut self, position: Option<PositionState>);
    /// `None` removes the handler for `action`.
    fn set_action_handler(&mut self, action: SessionAction, handler: Option<ActionHandler>);
}

pub struct SessionBridge {
    session: Box<dyn MediaSession>,
    attached: bool,
    track_id: Option<TrackId>,
    metadata: Option<SessionMetadata>,
    state: SessionPlaybackState,
    position: Option<PositionState>,
}

impl SessionBridge {
    pub fn new(session: Box<dyn MediaSession>) -> Self {
        Self {
            session,
            attached: false,
            track_id: None,
            metadata: None,
            state: SessionPlaybackState::None,
            position: None,
        }
    }

    /// Register one handler per action, replacing whatever was registered before.
    pub fn attach(&mut self, dispatch: IntentDispatch) {
        self.clear_handlers();
        for action in SessionAction::ALL {
            let dispatch = dispatch.clone();
            let handler: ActionHandler = Arc::new(move |details| dispatch(action, details));
            self.session.set_action_handler(action, Some(handler));
        }
        self.attached = true;
        tracing::debug!("media session attached");
    }

    /// Remove all handlers and blank the session.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.clear_handlers();
        self.session.set_metadata(None);
        self.session.set_position_state(None);
        self.session.set_playback_state(SessionPlaybackState::None);
        self.track_id = None;
        self.metadata = None;
        self.position = None;
        self.state = SessionPlaybackState::None;
        self.attached = false;
        tracing::debug!("media session detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Push metadata and play state; unchanged values are not re-sent.
    pub fn sync(&mut self, current: Option<&Track>, playing: bool) {
        if !self.attached {
            return;
        }
        let track_id = current.map(|track| track.id.clone());
        let metadata = current.map(SessionMetadata::from);
        if track_id != self.track_id || metadata != self.metadata {
            self.session.set_metadata(metadata.clone());
            self.track_id = track_id;
            self.metadata = metadata;
            self.position = None;
        }
        let state = match (current, playing) {
            (None, _) => SessionPlaybackState::None,
            (Some(_), true) => SessionPlaybackState::Playing,
            (Some(_), false) => SessionPlaybackState::Paused,
        };
        if state != self.state {
            self.session.set_playback_state(state);
            self.state = state;
        }
    }

    pub fn push_position(&mut self, position_ms: u64, duration_ms: Option<u64>) {
        if !self.attached {
            return;
        }
        let Some(duration_ms) = duration_ms.filter(|duration| *duration > 0) else {
            return;
        };
        let position = PositionState {
            duration_ms,
            position_ms: position_ms.min(duration_ms),
            rate: 1.0,
        };
        if self.position != Some(position) {
            self.session.set_position_state(Some(position));
            self.position = Some(position);
        }
    }

    fn clear_handlers(&mut self) {
        for action in SessionAction::ALL {
            self.session.set_action_handler(action, None);
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.detach();
    }
}
