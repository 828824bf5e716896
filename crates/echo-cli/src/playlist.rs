//! Playlist files.
//!
//! A playlist is a TOML document with an optional `base_url` and a `[[tracks]]` array.
//! Entries with `url` are directly playable; entries with `path` are resolved against
//! `base_url` when they become current.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use echo_types::{MediaRef, Track, TrackId};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaylistFile {
    base_url: Option<String>,
    #[serde(default)]
    tracks: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaylistEntry {
    id: String,
    title: String,
    artist: Option<String>,
    artwork: Option<String>,
    duration_ms: Option<u64>,
    url: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub base_url: Option<String>,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read playlist {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse playlist {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: PlaylistFile = toml::from_str(raw)?;
        let mut tracks = Vec::with_capacity(file.tracks.len());
        for entry in file.tracks {
            let media = match (entry.url, entry.path) {
                (Some(url), None) => MediaRef::Ready(url),
                (None, Some(path)) => MediaRef::Resolvable(path),
                _ => {
                    return Err(anyhow!(
                        "track {} needs exactly one of url or path",
                        entry.id
                    ));
                }
            };
            tracks.push(Track {
                id: TrackId::new(entry.id),
                title: entry.title,
                artist: entry.artist,
                artwork: entry.artwork,
                duration_ms: entry.duration_ms,
                media,
            });
        }
        if tracks.is_empty() {
            return Err(anyhow!("playlist has no tracks"));
        }
        Ok(Self {
            base_url: file.base_url,
            tracks,
        })
    }

    pub fn find(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id.as_str() == id)
    }
}
