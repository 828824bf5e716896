//! Track media resolution.
//!
//! The library layer owns storage and signing; the engine only asks for a playable
//! location when a track becomes current.

use async_trait::async_trait;

use echo_types::{MediaRef, Track};

use crate::error::ResolveError;

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Produce a location the transport can load for `track`.
    async fn resolve(&self, track: &Track) -> Result<String, ResolveError>;
}

/// Resolver for tracks whose media is always directly playable.
///
/// Resolvable references are joined onto `base` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    base: Option<String>,
}

impl StaticResolver {
    pub fn new(base: Option<String>) -> Self {
        Self { base }
    }
}

#[async_trait]
impl TrackResolver for StaticResolver {
    async fn resolve(&self, track: &Track) -> Result<String, ResolveError> {
        match &track.media {
            MediaRef::Ready(location) => Ok(location.clone()),
            MediaRef::Resolvable(path) => match self.base.as_deref() {
                Some(base) => Ok(format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    path.trim_start_matches('/')
                )),
                None => Err(ResolveError::NotFound),
            },
        }
    }
}

/// Location for a track that needs no resolution round-trip.
pub fn ready_location(track: &Track) -> Option<&str> {
    match &track.media {
        MediaRef::Ready(location) => Some(location.as_str()),
        MediaRef::Resolvable(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_media_passes_through() {
        let resolver = StaticResolver::default();
        let track = Track::ready("a", "A", "http://cdn/a.mp3");
        assert_eq!(resolver.resolve(&track).await.unwrap(), "http://cdn/a.mp3");
    }

    #[tokio::test]
    async fn resolvable_media_is_joined_to_base() {
        let resolver = StaticResolver::new(Some("http://cdn/".to_string()));
        let track = Track::resolvable("a", "A", "/songs/a.mp3");
        assert_eq!(resolver.resolve(&track).await.unwrap(), "http://cdn/songs/a.mp3");
    }

    #[tokio::test]
    async fn resolvable_media_without_base_fails() {
        let resolver = StaticResolver::default();
        let track = Track::resolvable("a", "A", "songs/a.mp3");
        assert_eq!(resolver.resolve(&track).await, Err(ResolveError::NotFound));
    }

    #[test]
    fn ready_location_skips_resolvable() {
        assert_eq!(ready_location(&Track::ready("a", "A", "x")), Some("x"));
        assert_eq!(ready_location(&Track::resolvable("a", "A", "x")), None);
    }
}
