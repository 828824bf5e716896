//! Media output abstraction.
//!
//! The engine drives exactly one output through [`PlaybackTransport`]; implementations
//! translate the calls into device commands. Progress and completion flow back as
//! [`echo_types::TransportEvent`]s through the player handle.

use crossbeam_channel::Sender;

use crate::error::TransportError;

pub trait PlaybackTransport: Send {
    /// Make `location` the active source, positioned at zero and paused.
    fn load(&self, location: &str) -> Result<(), TransportError>;
    fn play(&self) -> Result<(), TransportError>;
    fn pause(&self) -> Result<(), TransportError>;
    fn seek(&self, position_ms: u64) -> Result<(), TransportError>;
    /// Drop the active source.
    fn stop(&self) -> Result<(), TransportError>;
}

/// Commands understood by a channel-driven output device.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Load { location: String },
    Play,
    Pause,
    Seek { position_ms: u64 },
    Stop,
}

/// Transport that forwards commands to a device thread.
pub struct ChannelTransport {
    cmd_tx: Sender<TransportCommand>,
}

impl ChannelTransport {
    pub fn new(cmd_tx: Sender<TransportCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: TransportCommand) -> Result<(), TransportError> {
        self.cmd_tx.send(cmd).map_err(|_| TransportError::Offline)
    }
}

impl PlaybackTransport for ChannelTransport {
    fn load(&self, location: &str) -> Result<(), TransportError> {
        self.send(TransportCommand::Load {
            location: location.to_string(),
        })
    }

    fn play(&self) -> Result<(), TransportError> {
        self.send(TransportCommand::Play)
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.send(TransportCommand::Pause)
    }

    fn seek(&self, position_ms: u64) -> Result<(), TransportError> {
        self.send(TransportCommand::Seek { position_ms })
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.send(TransportCommand::Stop)
    }
}
