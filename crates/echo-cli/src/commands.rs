//! Line commands read from stdin.

use anyhow::{Context, Result, anyhow, bail};

use echo_player::PlayerHandle;
use echo_types::{QueueSnapshot, TrackId};

use crate::playlist::Playlist;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Play,
    Pause,
    Toggle,
    Next,
    Prev,
    Seek(u64),
    Forward,
    Rewind,
    Shuffle,
    Repeat(u32),
    Add(String),
    NextUp(String),
    Now(String),
    Remove(String),
    Move { from: usize, to: usize },
    Jump(usize),
    Clear,
    Status,
    Quit,
}

impl CliCommand {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };
        let mut arg = || parts.next().ok_or_else(|| anyhow!("{word} needs an argument"));
        let cmd = match word {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "toggle" => Self::Toggle,
            "next" => Self::Next,
            "prev" => Self::Prev,
            "seek" => {
                let seconds: u64 = arg()?.parse().context("seek takes seconds")?;
                Self::Seek(seconds.saturating_mul(1_000))
            }
            "ff" => Self::Forward,
            "rw" => Self::Rewind,
            "shuffle" => Self::Shuffle,
            "repeat" => Self::Repeat(arg()?.parse().context("repeat takes a count")?),
            "add" => Self::Add(arg()?.to_string()),
            "next-up" => Self::NextUp(arg()?.to_string()),
            "now" => Self::Now(arg()?.to_string()),
            "rm" => Self::Remove(arg()?.to_string()),
            "mv" => {
                let from = arg()?.parse().context("mv takes two positions")?;
                let to = arg()?.parse().context("mv takes two positions")?;
                Self::Move { from, to }
            }
            "jump" => Self::Jump(arg()?.parse().context("jump takes a position")?),
            "clear" => Self::Clear,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command {other:?}"),
        };
        Ok(Some(cmd))
    }
}

/// Apply a command. Returns `false` when the loop should stop.
pub async fn apply(handle: &PlayerHandle, playlist: &Playlist, cmd: CliCommand) -> Result<bool> {
    let lookup = |id: &str| {
        playlist
            .find(id)
            .cloned()
            .ok_or_else(|| anyhow!("no track {id:?} in playlist"))
    };
    match cmd {
        CliCommand::Play => handle.play()?,
        CliCommand::Pause => handle.pause()?,
        CliCommand::Toggle => handle.toggle()?,
        CliCommand::Next => handle.advance()?,
        CliCommand::Prev => handle.previous()?,
        CliCommand::Seek(position_ms) => handle.seek(position_ms)?,
        CliCommand::Forward => handle.fast_forward(None)?,
        CliCommand::Rewind => handle.rewind(None)?,
        CliCommand::Shuffle => handle.toggle_shuffle()?,
        CliCommand::Repeat(count) => handle.set_repeat(count)?,
        CliCommand::Add(id) => handle.append_to_tail(lookup(&id)?)?,
        CliCommand::NextUp(id) => handle.insert_at_head(lookup(&id)?)?,
        CliCommand::Now(id) => handle.play_now(lookup(&id)?)?,
        CliCommand::Remove(id) => handle.remove_by_id(TrackId::new(id))?,
        CliCommand::Move { from, to } => handle.reorder(from, to)?,
        CliCommand::Jump(position) => handle.play_at(position)?,
        CliCommand::Clear => handle.clear_manual_queue()?,
        CliCommand::Status => println!("{}", render_status(&handle.snapshot().await?)),
        CliCommand::Quit => return Ok(false),
    }
    Ok(true)
}

pub fn render_status(snapshot: &QueueSnapshot) -> String {
    let mut out = String::new();
    let current = snapshot
        .current
        .as_ref()
        .map(|track| format!("{} ({})", track.title, track.id))
        .unwrap_or_else(|| "-".to_string());
    let elapsed = snapshot.elapsed_ms.unwrap_or(0) / 1_000;
    let duration = snapshot
        .duration_ms
        .map(|ms| format!("{}s", ms / 1_000))
        .unwrap_or_else(|| "?".to_string());
    out.push_str(&format!(
        "{:?} {current} {elapsed}s/{duration} shuffle={} repeat={}\n",
        snapshot.phase, snapshot.shuffle, snapshot.repeat_pending
    ));
    let mut position = 1;
    for track in &snapshot.manual_queue {
        out.push_str(&format!("  {position:>2} * {} ({})\n", track.title, track.id));
        position += 1;
    }
    for track in &snapshot.upcoming {
        out.push_str(&format!("  {position:>2}   {} ({})\n", track.title, track.id));
        position += 1;
    }
    out.push_str(&format!(
        "  history: {}",
        snapshot
            .history
            .iter()
            .map(|track| track.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out
}
