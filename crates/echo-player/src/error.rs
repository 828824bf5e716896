//! Error types for the player.
//!
//! Empty-state operations and rejected edits are not errors; these only cover the
//! collaborator boundaries and the command channel.

use thiserror::Error;

/// Failure reported by a media output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The output is gone (device thread exited, channel closed).
    #[error("transport offline")]
    Offline,
    /// The output refused the request (e.g. autoplay restrictions).
    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Failure to obtain a playable location for a track.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("media not found")]
    NotFound,
    #[error("media location expired")]
    Expired,
    #[error("resolution failed: {0}")]
    Failed(String),
}

/// Errors returned by [`crate::player::PlayerHandle`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// The player task has shut down.
    #[error("player closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
