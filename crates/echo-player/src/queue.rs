//! Queue engine: ordering state for manual insertions, the playing context, shuffle,
//! repeat and history.
//!
//! Every operation is synchronous and settles before returning. Operations that change
//! what the transport should be doing return a [`Transition`]; the caller (the player
//! actor) turns that into transport work.
//!
//! Positions used by [`QueueEngine::play_at`] and [`QueueEngine::reorder`] address the
//! unified view `[current, manual.., context after cursor..]`, so position 0 is always
//! the current track.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;

use echo_types::{QueueSnapshot, Track, TrackId};

use crate::config::EngineConfig;
use crate::history::History;
use crate::shuffle;

/// What the transport has to do after an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed for the transport.
    Unchanged,
    /// The current track changed and must be loaded.
    Changed,
    /// The current track must restart from zero.
    Restart,
    /// The queue is exhausted; playback stops on the current track.
    Stopped,
}

pub struct QueueEngine {
    history_cap: usize,
    refill_low_water: usize,
    previous_restart_ms: u64,
    current: Option<Track>,
    manual: VecDeque<Track>,
    context: Vec<Track>,
    cursor: usize,
    original: Vec<Track>,
    history: History,
    shuffle: bool,
    playing: bool,
    ended: bool,
    repeat_pending: u32,
    rng: StdRng,
}

impl QueueEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Build an engine with a fixed random source (deterministic shuffles).
    pub fn with_rng(config: &EngineConfig, rng: StdRng) -> Self {
        Self {
            history_cap: config.history_cap,
            refill_low_water: config.refill_low_water,
            previous_restart_ms: config.previous_restart_ms,
            current: None,
            manual: VecDeque::new(),
            context: Vec::new(),
            cursor: 0,
            original: Vec::new(),
            history: History::new(config.history_cap),
            shuffle: config.default_shuffle,
            playing: false,
            ended: false,
            repeat_pending: 0,
            rng,
        }
    }

    /// Replace the whole queue with a new collection.
    ///
    /// The shuffle mode in effect (initially `default_shuffle`) decides whether the
    /// context is the original order or a permutation that starts with the chosen track.
    pub fn start_context(&mut self, tracks: Vec<Track>, start_index: usize, auto_play: bool) -> Transition {
        if tracks.is_empty() {
            return Transition::Unchanged;
        }
        let start = start_index.min(tracks.len() - 1);
        if self.shuffle {
            self.context = shuffle::shuffled_from(&tracks, start, &mut self.rng);
            self.cursor = 0;
        } else {
            self.context = tracks.clone();
            self.cursor = start;
        }
        self.original = tracks;
        self.current = Some(self.context[self.cursor].clone());
        self.manual.clear();
        self.history.clear();
        self.playing = auto_play;
        self.ended = false;
        self.repeat_pending = 0;
        tracing::info!(
            tracks = self.original.len(),
            start,
            shuffle = self.shuffle,
            auto_play,
            "context started"
        );
        Transition::Changed
    }

    /// Move to the next track: manual queue first, then pending repeats, then context.
    pub fn advance(&mut self) -> Transition {
        if let Some(next) = self.manual.pop_front() {
            tracing::debug!(track_id = %next.id, "advance from manual queue");
            self.replace_current(next);
            return Transition::Changed;
        }
        if self.current.is_none() {
            return Transition::Unchanged;
        }
        if self.repeat_pending > 0 {
            self.repeat_pending -= 1;
            self.ended = false;
            tracing::debug!(remaining = self.repeat_pending, "advance consumed a repeat");
            return Transition::Restart;
        }

        self.maybe_refill();
        let next_index = self.cursor + 1;
        if next_index < self.context.len() {
            self.cursor = next_index;
            let next = self.context[next_index].clone();
            tracing::debug!(track_id = %next.id, cursor = self.cursor, "advance in context");
            self.replace_current(next);
            self.compact_context();
            return Transition::Changed;
        }

        tracing::debug!(cursor = self.cursor, "end of queue");
        self.playing = false;
        self.ended = true;
        Transition::Stopped
    }

    /// Step back within the context, or restart the current track.
    ///
    /// Restarts when `elapsed_ms` is past the restart threshold or when the cursor is
    /// already at the start. The manual queue and history are not consulted, also when
    /// the current track came from the manual queue.
    pub fn previous(&mut self, elapsed_ms: Option<u64>) -> Transition {
        if self.current.is_none() {
            return Transition::Unchanged;
        }
        if elapsed_ms.is_some_and(|elapsed| elapsed > self.previous_restart_ms) {
            return Transition::Restart;
        }
        if self.cursor == 0 {
            return Transition::Restart;
        }
        self.cursor -= 1;
        let track = self.context[self.cursor].clone();
        tracing::debug!(track_id = %track.id, cursor = self.cursor, "previous in context");
        self.set_current_without_history(track);
        Transition::Changed
    }

    /// Jump to a position of the unified upcoming view, discarding what was skipped.
    pub fn play_at(&mut self, position: usize) -> Transition {
        if position == 0 || (self.current.is_none() && self.manual.is_empty()) {
            return Transition::Unchanged;
        }
        let index = position - 1;
        if index < self.manual.len() {
            self.manual.drain(..index);
            let Some(track) = self.manual.pop_front() else {
                return Transition::Unchanged;
            };
            self.replace_current(track);
        } else {
            let context_index = self.cursor + 1 + (index - self.manual.len());
            let Some(track) = self.context.get(context_index).cloned() else {
                return Transition::Unchanged;
            };
            self.manual.clear();
            self.cursor = context_index;
            self.replace_current(track);
            self.compact_context();
        }
        self.playing = true;
        Transition::Changed
    }

    /// "Play next": put a track at the head of the manual queue.
    ///
    /// An id already queued is moved rather than duplicated; the current track's id is
    /// never queued.
    pub fn insert_at_head(&mut self, track: Track) -> bool {
        if self.is_current(&track.id) {
            return false;
        }
        self.remove_manual(&track.id);
        self.manual.push_front(track);
        true
    }

    /// "Add to queue": put a track at the tail of the manual queue (same de-duplication
    /// as [`Self::insert_at_head`]).
    pub fn append_to_tail(&mut self, track: Track) -> bool {
        if self.is_current(&track.id) {
            return false;
        }
        self.remove_manual(&track.id);
        self.manual.push_back(track);
        true
    }

    /// Make a track current right away and start playing it.
    pub fn play_now(&mut self, track: Track) -> Transition {
        self.playing = true;
        if self.is_current(&track.id) {
            self.ended = false;
            return Transition::Restart;
        }
        self.remove_manual(&track.id);
        self.replace_current(track);
        Transition::Changed
    }

    /// Remove the first manual-queue entry with this id.
    pub fn remove_by_id(&mut self, id: &TrackId) -> bool {
        self.remove_manual(id)
    }

    pub fn clear_manual_queue(&mut self) -> bool {
        if self.manual.is_empty() {
            return false;
        }
        self.manual.clear();
        true
    }

    /// Move an upcoming entry. Rejected when either end is the current slot, out of range,
    /// crosses between the manual queue and the context, or targets the context while it
    /// is in original order.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from == 0 || to == 0 || from == to {
            return false;
        }
        let manual_len = self.manual.len();
        let total = manual_len + self.upcoming_context_len();
        if from > total || to > total {
            return false;
        }
        let from_manual = from <= manual_len;
        let to_manual = to <= manual_len;
        match (from_manual, to_manual) {
            (true, true) => {
                let Some(track) = self.manual.remove(from - 1) else {
                    return false;
                };
                self.manual.insert(to - 1, track);
                true
            }
            (false, false) if self.shuffle => {
                let base = self.cursor + 1;
                let a = base + (from - 1 - manual_len);
                let b = base + (to - 1 - manual_len);
                let track = self.context.remove(a);
                self.context.insert(b, track);
                true
            }
            _ => false,
        }
    }

    /// Flip shuffle. On: permute the context after the cursor. Off: restore the original
    /// order and re-anchor the cursor on the current track (0 when it is not there).
    /// Without a context this is a no-op.
    pub fn toggle_shuffle(&mut self) -> bool {
        if self.context.is_empty() {
            return self.shuffle;
        }
        if self.shuffle {
            self.context = self.original.clone();
            let position = self.current.as_ref().and_then(|current| {
                self.original.iter().position(|track| track.id == current.id)
            });
            self.cursor = position.unwrap_or(0);
            self.shuffle = false;
        } else {
            let start = (self.cursor + 1).min(self.context.len());
            shuffle::fisher_yates(&mut self.context[start..], &mut self.rng);
            self.shuffle = true;
        }
        tracing::debug!(shuffle = self.shuffle, cursor = self.cursor, "shuffle toggled");
        self.shuffle
    }

    /// Schedule `count` immediate replays of the current track.
    pub fn set_repeat(&mut self, count: u32) {
        if self.current.is_some() {
            self.repeat_pending = count;
        }
    }

    pub fn increment_repeat(&mut self) {
        if self.current.is_some() {
            self.repeat_pending = self.repeat_pending.saturating_add(1);
        }
    }

    /// Update the play intent. Returns `true` when the flag changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        let playing = playing && self.current.is_some();
        if self.playing == playing {
            return false;
        }
        self.playing = playing;
        if playing {
            self.ended = false;
        }
        true
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn manual_queue(&self) -> impl Iterator<Item = &Track> {
        self.manual.iter()
    }

    pub fn context(&self) -> &[Track] {
        &self.context
    }

    pub fn original_order(&self) -> &[Track] {
        &self.original
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// `true` after the queue ran out, until the next track change or play.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn repeat_pending(&self) -> u32 {
        self.repeat_pending
    }

    /// Context entries after the cursor.
    pub fn upcoming_context(&self) -> &[Track] {
        let start = (self.cursor + 1).min(self.context.len());
        &self.context[start..]
    }

    /// Queue-side fields of a snapshot; timing and phase are filled by the player.
    pub fn snapshot(&self, upcoming_window: usize) -> QueueSnapshot {
        let upcoming = self.upcoming_context();
        QueueSnapshot {
            current: self.current.clone(),
            manual_queue: self.manual.iter().cloned().collect(),
            upcoming: upcoming[..upcoming.len().min(upcoming_window)].to_vec(),
            history: self.history.to_vec(),
            context_cursor: self.cursor,
            context_len: self.context.len(),
            shuffle: self.shuffle,
            repeat_pending: self.repeat_pending,
            is_playing: self.playing,
            ..QueueSnapshot::default()
        }
    }

    fn is_current(&self, id: &TrackId) -> bool {
        self.current.as_ref().is_some_and(|current| &current.id == id)
    }

    fn remove_manual(&mut self, id: &TrackId) -> bool {
        match self.manual.iter().position(|track| &track.id == id) {
            Some(index) => self.manual.remove(index).is_some(),
            None => false,
        }
    }

    fn upcoming_context_len(&self) -> usize {
        self.context.len().saturating_sub(self.cursor + 1)
    }

    fn replace_current(&mut self, track: Track) {
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        self.set_current_without_history(track);
    }

    fn set_current_without_history(&mut self, track: Track) {
        // A queued copy of a track reached through the context is already consumed.
        self.remove_manual(&track.id);
        self.current = Some(track);
        self.ended = false;
        self.repeat_pending = 0;
    }

    /// Append a fresh permutation of the original order when a shuffled context runs low.
    fn maybe_refill(&mut self) {
        if !self.shuffle || self.refill_low_water == 0 || self.original.is_empty() {
            return;
        }
        if self.upcoming_context_len() >= self.refill_low_water {
            return;
        }
        let batch = shuffle::refill_batch(&self.original, self.context.last(), &mut self.rng);
        tracing::debug!(added = batch.len(), "refilled shuffled context");
        self.context.extend(batch);
    }

    /// Drop consumed context entries of a refilled context beyond the history window so
    /// continuous shuffle playback does not grow without bound.
    fn compact_context(&mut self) {
        if self.context.len() <= self.original.len() || self.cursor <= self.history_cap {
            return;
        }
        let drop = self.cursor - self.history_cap;
        self.context.drain(..drop);
        self.cursor -= drop;
    }
}
