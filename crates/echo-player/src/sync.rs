//! Transport synchronization.
//!
//! Keeps the output's active source consistent with the engine's current track, tracks
//! progress, owns the end-of-track watchdog, and discards resolutions that finish after
//! the current track has moved on.

use tokio::time::Instant;

use echo_types::{Track, TrackId};

use crate::config::EngineConfig;
use crate::error::ResolveError;
use crate::resolver::ready_location;
use crate::transport::PlaybackTransport;
use crate::watchdog::EndWatchdog;

/// Result of a synchronization step, for the player to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing loaded (no current track).
    Idle,
    /// The current track's source is active.
    Loaded,
    /// A resolution must run; report back with the same generation.
    Resolving { generation: u64, track: Track },
    /// A resolution finished for a track that is no longer current.
    Stale,
    /// The track could not be resolved or loaded.
    Failed { track_id: TrackId, reason: String },
    /// The source is loaded but the output refused to start.
    PlayRejected { reason: String },
}

#[derive(Debug, Clone)]
struct LoadedSource {
    track_id: TrackId,
    location: String,
}

#[derive(Debug, Clone)]
struct PendingResolve {
    generation: u64,
    track_id: TrackId,
}

pub struct TransportSync {
    transport: Box<dyn PlaybackTransport>,
    loaded: Option<LoadedSource>,
    pending: Option<PendingResolve>,
    generation: u64,
    elapsed_ms: Option<u64>,
    reported_duration_ms: Option<u64>,
    track_duration_ms: Option<u64>,
    watchdog: EndWatchdog,
    suppress_next_ended: bool,
}

impl TransportSync {
    pub fn new(transport: Box<dyn PlaybackTransport>, config: &EngineConfig) -> Self {
        Self {
            transport,
            loaded: None,
            pending: None,
            generation: 0,
            elapsed_ms: None,
            reported_duration_ms: None,
            track_duration_ms: None,
            watchdog: EndWatchdog::new(config.watchdog_epsilon_ms, config.watchdog_grace()),
            suppress_next_ended: false,
        }
    }

    /// The engine's current track changed. Any in-flight resolution becomes stale.
    pub fn on_track_changed(&mut self, track: Option<&Track>, playing: bool) -> SyncOutcome {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
        self.elapsed_ms = None;
        self.reported_duration_ms = None;
        self.watchdog.cancel();

        let Some(track) = track else {
            self.track_duration_ms = None;
            if self.loaded.take().is_some() {
                if let Err(err) = self.transport.stop() {
                    tracing::warn!(error = %err, "transport stop failed");
                }
            }
            return SyncOutcome::Idle;
        };
        self.track_duration_ms = track.duration_ms;

        match ready_location(track) {
            Some(location) => {
                let location = location.to_string();
                self.assign(&track.id, location, playing)
            }
            None => {
                tracing::debug!(track_id = %track.id, generation = self.generation, "resolving media");
                self.pending = Some(PendingResolve {
                    generation: self.generation,
                    track_id: track.id.clone(),
                });
                SyncOutcome::Resolving {
                    generation: self.generation,
                    track: track.clone(),
                }
            }
        }
    }

    /// A resolution started by [`Self::on_track_changed`] finished.
    pub fn complete_resolution(
        &mut self,
        generation: u64,
        result: Result<String, ResolveError>,
        playing: bool,
    ) -> SyncOutcome {
        let pending = match self.pending.take() {
            Some(pending) if pending.generation == generation => pending,
            other => {
                self.pending = other;
                tracing::debug!(generation, current = self.generation, "discarding stale resolution");
                return SyncOutcome::Stale;
            }
        };
        match result {
            Ok(location) => self.assign(&pending.track_id, location, playing),
            Err(err) => {
                tracing::warn!(track_id = %pending.track_id, error = %err, "media resolution failed");
                SyncOutcome::Failed {
                    track_id: pending.track_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Replay the current source from zero.
    pub fn restart(&mut self, playing: bool) -> SyncOutcome {
        self.watchdog.cancel();
        if self.loaded.is_none() {
            return if self.pending.is_some() {
                SyncOutcome::Loaded
            } else {
                SyncOutcome::Idle
            };
        }
        if let Err(err) = self.transport.seek(0) {
            tracing::warn!(error = %err, "restart seek failed");
        }
        self.elapsed_ms = Some(0);
        if playing {
            return self.start();
        }
        SyncOutcome::Loaded
    }

    /// Apply the play intent to a loaded source. Before the source is loaded the intent
    /// is applied once loading finishes.
    pub fn set_playing(&mut self, playing: bool) -> SyncOutcome {
        if self.loaded.is_none() {
            return SyncOutcome::Idle;
        }
        if playing {
            return self.start();
        }
        self.watchdog.cancel();
        if let Err(err) = self.transport.pause() {
            tracing::warn!(error = %err, "transport pause failed");
        }
        SyncOutcome::Loaded
    }

    /// Seek within the current source, clamped to `[0, duration]`. Returns the position
    /// actually requested.
    pub fn seek(&mut self, position_ms: i64) -> Option<u64> {
        self.loaded.as_ref()?;
        let mut target = position_ms.max(0) as u64;
        if let Some(duration) = self.best_duration_ms() {
            target = target.min(duration);
        }
        self.watchdog.cancel();
        if let Err(err) = self.transport.seek(target) {
            tracing::warn!(error = %err, "transport seek failed");
            return None;
        }
        self.elapsed_ms = Some(target);
        Some(target)
    }

    /// Progress from the output. Reports that arrive while nothing is loaded or a new
    /// track is still resolving belong to an older source and are dropped; returns
    /// whether the report was applied.
    pub fn on_progress(
        &mut self,
        elapsed_ms: u64,
        duration_ms: Option<u64>,
        playing: bool,
        now: Instant,
    ) -> bool {
        if !self.is_settled() {
            self.watchdog.cancel();
            tracing::debug!(elapsed_ms, "ignoring progress while loading");
            return false;
        }
        self.elapsed_ms = Some(elapsed_ms);
        if duration_ms.is_some_and(|duration| duration > 0) {
            self.reported_duration_ms = duration_ms;
        }
        self.suppress_next_ended = false;
        self.watchdog
            .on_progress(elapsed_ms, self.best_duration_ms(), playing, now);
        true
    }

    /// Native end-of-media. Returns `true` when the player should advance.
    pub fn on_ended(&mut self) -> bool {
        self.watchdog.cancel();
        if self.suppress_next_ended {
            self.suppress_next_ended = false;
            tracing::debug!("ignoring ended already handled by watchdog");
            return false;
        }
        self.is_settled()
    }

    /// The output failed to load the active source.
    pub fn on_load_failed(&mut self, reason: String) -> Option<SyncOutcome> {
        self.watchdog.cancel();
        let loaded = self.loaded.take()?;
        Some(SyncOutcome::Failed {
            track_id: loaded.track_id,
            reason,
        })
    }

    /// Check the watchdog deadline. Returns `true` when end-of-track should be declared.
    pub fn poll_watchdog(&mut self, now: Instant, playing: bool) -> bool {
        if !playing || !self.is_settled() {
            self.watchdog.cancel();
            return false;
        }
        if !self.watchdog.poll(now) {
            return false;
        }
        tracing::info!(elapsed_ms = ?self.elapsed_ms, "watchdog declared end of track");
        self.suppress_next_ended = true;
        true
    }

    /// Stop the output after the queue ran out, keeping the source loaded.
    pub fn stop_at_end(&mut self) {
        self.watchdog.cancel();
        if self.loaded.is_some() {
            if let Err(err) = self.transport.pause() {
                tracing::warn!(error = %err, "transport pause failed");
            }
        }
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog.deadline()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn loaded_location(&self) -> Option<&str> {
        self.loaded.as_ref().map(|loaded| loaded.location.as_str())
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed_ms
    }

    /// Duration reported by the output, falling back to library metadata.
    pub fn best_duration_ms(&self) -> Option<u64> {
        self.reported_duration_ms
            .or(self.track_duration_ms)
            .filter(|duration| *duration > 0)
    }

    /// The current track's source is loaded and no resolution is outstanding.
    fn is_settled(&self) -> bool {
        self.loaded.is_some() && self.pending.is_none()
    }

    fn assign(&mut self, track_id: &TrackId, location: String, playing: bool) -> SyncOutcome {
        let same_source = self
            .loaded
            .as_ref()
            .is_some_and(|loaded| loaded.location == location);
        if same_source {
            if let Err(err) = self.transport.seek(0) {
                tracing::warn!(error = %err, "transport seek failed");
            }
        } else {
            tracing::info!(track_id = %track_id, location = %location, "loading source");
            if let Err(err) = self.transport.load(&location) {
                tracing::warn!(track_id = %track_id, error = %err, "transport load failed");
                self.loaded = None;
                return SyncOutcome::Failed {
                    track_id: track_id.clone(),
                    reason: err.to_string(),
                };
            }
        }
        self.loaded = Some(LoadedSource {
            track_id: track_id.clone(),
            location,
        });
        self.elapsed_ms = Some(0);
        if playing {
            return self.start();
        }
        SyncOutcome::Loaded
    }

    fn start(&mut self) -> SyncOutcome {
        match self.transport.play() {
            Ok(()) => SyncOutcome::Loaded,
            Err(err) => {
                tracing::warn!(error = %err, "transport refused to start");
                SyncOutcome::PlayRejected {
                    reason: err.to_string(),
                }
            }
        }
    }
}
