//! `echo-cli`: headless driver for the playback engine.
//!
//! Loads a TOML playlist, plays it on a simulated output device and reads line
//! commands from stdin (`status` prints the queue, `quit` exits).

mod commands;
mod device;
mod playlist;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use echo_player::{
    ChannelTransport, EngineConfig, EngineEvent, Player, StaticResolver, TrackResolver,
};

use crate::commands::CliCommand;
use crate::playlist::Playlist;

#[derive(Parser, Debug)]
#[command(name = "echo-cli", version)]
struct Args {
    /// Playlist file (TOML)
    #[arg(long)]
    playlist: PathBuf,

    /// Optional engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Index of the first track to play
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Shuffle the playlist on start
    #[arg(long)]
    shuffle: bool,

    /// Load the first track without starting playback
    #[arg(long)]
    paused: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,echo_player=info,echo_cli=info")
        }))
        .init();

    let mut config = match args.config.as_ref() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.shuffle {
        config.default_shuffle = true;
    }
    let playlist = Playlist::load(&args.playlist)?;
    tracing::info!(
        playlist = %args.playlist.display(),
        tracks = playlist.tracks.len(),
        shuffle = config.default_shuffle,
        "starting echo-cli"
    );

    let resolver = Arc::new(StaticResolver::new(playlist.base_url.clone()));
    let durations = source_durations(&playlist, resolver.as_ref()).await;

    // The device reports back through the player handle, which only exists once the
    // player is spawned around the device's transport.
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let device = device::spawn_simulated_device(durations, move |event| {
        let _ = event_tx.send(event);
    });
    let player = Player::spawn(
        config,
        Box::new(ChannelTransport::new(device.cmd_tx.clone())),
        resolver,
        None,
    );
    let handle = player.handle();

    let forward = handle.clone();
    std::thread::spawn(move || {
        while let Ok(event) = event_rx.recv() {
            if forward.transport_event(event).is_err() {
                break;
            }
        }
    });

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    handle.start_context(playlist.tracks.clone(), args.start, !args.paused)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = match CliCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "bad command");
                continue;
            }
        };
        match commands::apply(&handle, &playlist, cmd).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => tracing::warn!(error = %err, "command failed"),
        }
    }

    drop(device);
    player.shutdown().await;
    Ok(())
}

/// Length of every loadable location, keyed the way the resolver will produce it.
async fn source_durations(playlist: &Playlist, resolver: &dyn TrackResolver) -> HashMap<String, u64> {
    let mut durations = HashMap::new();
    for track in &playlist.tracks {
        match resolver.resolve(track).await {
            Ok(location) => {
                durations.insert(location, track.duration_ms.unwrap_or(DEFAULT_DURATION_MS));
            }
            Err(err) => {
                tracing::warn!(track_id = %track.id, error = %err, "track will not be playable");
            }
        }
    }
    durations
}

const DEFAULT_DURATION_MS: u64 = 180_000;

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::TrackChanged { track_id } => {
            tracing::info!(track_id = ?track_id.as_ref().map(|id| id.as_str()), "now playing");
        }
        EngineEvent::PlaybackFailed { track_id, reason } => {
            tracing::warn!(track_id = %track_id, reason = %reason, "playback failed");
        }
        EngineEvent::QueueEnded => tracing::info!("queue ended"),
        EngineEvent::QueueChanged | EngineEvent::StatusChanged => {
            tracing::debug!(?event, "engine event");
        }
    }
}
