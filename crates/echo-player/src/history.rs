use std::collections::VecDeque;

use echo_types::Track;

/// Previously current tracks, most recent last, capped at a fixed size.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Track>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a track, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, track: Track) {
        self.entries.push_back(track);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Track> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }
}
