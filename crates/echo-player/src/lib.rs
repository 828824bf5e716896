//! Playback queue and transport engine.
//!
//! [`queue::QueueEngine`] holds the ordering state (manual queue, context, shuffle,
//! repeat, history). [`player::Player`] runs it as a single-owner task wired to a
//! [`transport::PlaybackTransport`], a [`resolver::TrackResolver`] and an optional
//! [`session::MediaSession`].

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod player;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod shuffle;
pub mod sync;
pub mod transport;
pub mod watchdog;

pub use config::EngineConfig;
pub use error::{PlayerError, ResolveError, TransportError};
pub use events::{EngineEvent, EventBus};
pub use player::{Player, PlayerHandle};
pub use queue::{QueueEngine, Transition};
pub use resolver::{StaticResolver, TrackResolver};
pub use session::{ActionDetails, MediaSession, SessionBridge};
pub use transport::{ChannelTransport, PlaybackTransport, TransportCommand};
