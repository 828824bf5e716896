//! Simulated output device.
//!
//! Stands in for a real audio sink: accepts [`TransportCommand`]s on a crossbeam channel,
//! advances a clock while playing and reports progress and completion back through a
//! callback.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use echo_player::TransportCommand;
use echo_types::TransportEvent;

pub const TICK: Duration = Duration::from_millis(250);

/// Handle for sending commands to the device thread.
#[derive(Clone)]
pub struct DeviceHandle {
    pub cmd_tx: Sender<TransportCommand>,
}

struct Source {
    duration_ms: u64,
    position_ms: u64,
    finished: bool,
}

/// Spawn the device thread. `durations` maps loadable locations to their length; any
/// other location fails to load.
pub fn spawn_simulated_device<F>(durations: HashMap<String, u64>, on_event: F) -> DeviceHandle
where
    F: Fn(TransportEvent) + Send + 'static,
{
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || device_thread_main(durations, cmd_rx, on_event));
    DeviceHandle { cmd_tx }
}

fn device_thread_main<F>(durations: HashMap<String, u64>, cmd_rx: Receiver<TransportCommand>, on_event: F)
where
    F: Fn(TransportEvent),
{
    let mut source: Option<Source> = None;
    let mut playing = false;
    let mut last_tick = Instant::now();

    loop {
        match cmd_rx.recv_timeout(TICK) {
            Ok(cmd) => {
                tick(&mut source, playing, &mut last_tick, &on_event);
                match cmd {
                    TransportCommand::Load { location } => {
                        playing = false;
                        source = match durations.get(&location) {
                            Some(duration_ms) => {
                                tracing::debug!(location = %location, "device loaded source");
                                Some(Source {
                                    duration_ms: *duration_ms,
                                    position_ms: 0,
                                    finished: false,
                                })
                            }
                            None => {
                                on_event(TransportEvent::LoadFailed {
                                    reason: format!("unknown source {location}"),
                                });
                                None
                            }
                        };
                    }
                    TransportCommand::Play => playing = source.is_some(),
                    TransportCommand::Pause => playing = false,
                    TransportCommand::Seek { position_ms } => {
                        if let Some(src) = source.as_mut() {
                            src.position_ms = position_ms.min(src.duration_ms);
                            src.finished = false;
                        }
                    }
                    TransportCommand::Stop => {
                        source = None;
                        playing = false;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tick(&mut source, playing, &mut last_tick, &on_event);
                if let Some(src) = source.as_ref() {
                    if playing && !src.finished {
                        on_event(TransportEvent::Progress {
                            elapsed_ms: src.position_ms,
                            duration_ms: Some(src.duration_ms),
                        });
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("device thread stopped");
}

fn tick<F>(source: &mut Option<Source>, playing: bool, last_tick: &mut Instant, on_event: &F)
where
    F: Fn(TransportEvent),
{
    let now = Instant::now();
    let delta = now.duration_since(*last_tick).as_millis() as u64;
    *last_tick = now;
    let Some(src) = source.as_mut() else {
        return;
    };
    if !playing || src.finished {
        return;
    }
    src.position_ms = src.position_ms.saturating_add(delta).min(src.duration_ms);
    if src.position_ms >= src.duration_ms {
        src.finished = true;
        on_event(TransportEvent::Ended);
    }
}
