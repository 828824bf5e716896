//! Player actor.
//!
//! One task owns the queue engine, transport synchronization and the session bridge.
//! Every public operation, transport event, hardware intent and resolution completion is
//! a [`Command`] applied in arrival order, so a navigation always acts on the settled
//! result of the previous one.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use echo_types::{PlaybackPhase, QueueSnapshot, SessionAction, Track, TrackId, TransportEvent};

use crate::config::EngineConfig;
use crate::error::{PlayerError, ResolveError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::queue::{QueueEngine, Transition};
use crate::resolver::TrackResolver;
use crate::session::{ActionDetails, IntentDispatch, MediaSession, SessionBridge};
use crate::sync::{SyncOutcome, TransportSync};
use crate::transport::PlaybackTransport;

#[derive(Debug)]
enum Command {
    StartContext {
        tracks: Vec<Track>,
        start_index: usize,
        auto_play: bool,
    },
    Advance,
    Previous,
    PlayAt(usize),
    InsertAtHead(Track),
    AppendToTail(Track),
    PlayNow(Track),
    RemoveById(TrackId),
    Reorder { from: usize, to: usize },
    ToggleShuffle,
    SetRepeat(u32),
    IncrementRepeat,
    ClearManualQueue,
    Play,
    Pause,
    Toggle,
    Seek(u64),
    SeekBy(i64),
    Transport(TransportEvent),
    Intent {
        action: SessionAction,
        details: ActionDetails,
    },
    Resolved {
        generation: u64,
        result: std::result::Result<String, ResolveError>,
    },
    Snapshot(oneshot::Sender<QueueSnapshot>),
    Shutdown,
}

/// Cloneable front door to a running player.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl PlayerHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| PlayerError::Closed)
    }

    /// Replace the whole queue with `tracks`, starting at `start_index`.
    pub fn start_context(&self, tracks: Vec<Track>, start_index: usize, auto_play: bool) -> Result<()> {
        self.send(Command::StartContext {
            tracks,
            start_index,
            auto_play,
        })
    }

    pub fn advance(&self) -> Result<()> {
        self.send(Command::Advance)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(Command::Previous)
    }

    /// Jump to a position of the upcoming view (`1` is the next track).
    pub fn play_at(&self, position: usize) -> Result<()> {
        self.send(Command::PlayAt(position))
    }

    pub fn insert_at_head(&self, track: Track) -> Result<()> {
        self.send(Command::InsertAtHead(track))
    }

    pub fn append_to_tail(&self, track: Track) -> Result<()> {
        self.send(Command::AppendToTail(track))
    }

    pub fn play_now(&self, track: Track) -> Result<()> {
        self.send(Command::PlayNow(track))
    }

    pub fn remove_by_id(&self, id: TrackId) -> Result<()> {
        self.send(Command::RemoveById(id))
    }

    pub fn reorder(&self, from: usize, to: usize) -> Result<()> {
        self.send(Command::Reorder { from, to })
    }

    pub fn toggle_shuffle(&self) -> Result<()> {
        self.send(Command::ToggleShuffle)
    }

    pub fn set_repeat(&self, count: u32) -> Result<()> {
        self.send(Command::SetRepeat(count))
    }

    pub fn increment_repeat(&self) -> Result<()> {
        self.send(Command::IncrementRepeat)
    }

    pub fn clear_manual_queue(&self) -> Result<()> {
        self.send(Command::ClearManualQueue)
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn toggle(&self) -> Result<()> {
        self.send(Command::Toggle)
    }

    /// Seek to an absolute position, clamped to the track duration.
    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.send(Command::Seek(position_ms))
    }

    /// Seek relative to the current position.
    pub fn seek_by(&self, delta_ms: i64) -> Result<()> {
        self.send(Command::SeekBy(delta_ms))
    }

    /// Jump back `seconds`, or the configured seek step when `None`.
    pub fn rewind(&self, seconds: Option<u64>) -> Result<()> {
        match seconds {
            Some(seconds) => {
                let delta = i64::try_from(seconds.saturating_mul(1_000)).unwrap_or(i64::MAX);
                self.seek_by(-delta)
            }
            None => self.send(Command::Intent {
                action: SessionAction::SeekBackward,
                details: ActionDetails::default(),
            }),
        }
    }

    /// Jump ahead `seconds`, or the configured seek step when `None`.
    pub fn fast_forward(&self, seconds: Option<u64>) -> Result<()> {
        match seconds {
            Some(seconds) => {
                self.seek_by(i64::try_from(seconds.saturating_mul(1_000)).unwrap_or(i64::MAX))
            }
            None => self.send(Command::Intent {
                action: SessionAction::SeekForward,
                details: ActionDetails::default(),
            }),
        }
    }

    /// Feed an event reported by the media output.
    pub fn transport_event(&self, event: TransportEvent) -> Result<()> {
        self.send(Command::Transport(event))
    }

    /// Relay a hardware/OS control intent.
    pub fn session_intent(&self, action: SessionAction, details: ActionDetails) -> Result<()> {
        self.send(Command::Intent { action, details })
    }

    /// Current state, after every command sent before this call has been applied.
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| PlayerError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Ask the player task to stop.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// A running player task.
pub struct Player {
    handle: PlayerHandle,
    task: JoinHandle<()>,
}

impl Player {
    /// Spawn the player task on the current tokio runtime.
    pub fn spawn(
        config: EngineConfig,
        transport: Box<dyn PlaybackTransport>,
        resolver: Arc<dyn TrackResolver>,
        session: Option<Box<dyn MediaSession>>,
    ) -> Self {
        let queue = QueueEngine::new(&config);
        Self::spawn_with_queue(config, queue, transport, resolver, session)
    }

    /// Spawn around a prepared queue engine (fixed shuffle seed, for instance).
    pub fn spawn_with_queue(
        config: EngineConfig,
        queue: QueueEngine,
        transport: Box<dyn PlaybackTransport>,
        resolver: Arc<dyn TrackResolver>,
        session: Option<Box<dyn MediaSession>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new();

        let session = session.map(|session| {
            let mut bridge = SessionBridge::new(session);
            let weak = tx.downgrade();
            let dispatch: IntentDispatch = Arc::new(move |action, details| {
                if let Some(tx) = weak.upgrade() {
                    let _ = tx.send(Command::Intent { action, details });
                }
            });
            bridge.attach(dispatch);
            bridge
        });

        let actor = PlayerActor {
            sync: TransportSync::new(transport, &config),
            config,
            queue,
            session,
            resolver,
            events: events.clone(),
            tx: tx.downgrade(),
            failures: 0,
        };
        let task = tokio::spawn(actor.run(rx));
        Self {
            handle: PlayerHandle { tx, events },
            task,
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.handle.shutdown();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "player task failed");
        }
    }
}

struct PlayerActor {
    config: EngineConfig,
    queue: QueueEngine,
    sync: TransportSync,
    session: Option<SessionBridge>,
    resolver: Arc<dyn TrackResolver>,
    events: EventBus,
    tx: mpsc::WeakUnboundedSender<Command>,
    failures: u32,
}

impl PlayerActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("player started");
        loop {
            let deadline = self.sync.watchdog_deadline();
            tokio::select! {
                biased;
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = wait_until(deadline) => self.on_watchdog(),
            }
        }
        self.sync.stop_at_end();
        if let Some(session) = self.session.as_mut() {
            session.detach();
        }
        tracing::debug!("player stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::StartContext {
                tracks,
                start_index,
                auto_play,
            } => {
                self.failures = 0;
                let transition = self.queue.start_context(tracks, start_index, auto_play);
                self.apply(transition);
            }
            Command::Advance => {
                let transition = self.queue.advance();
                self.apply(transition);
            }
            Command::Previous => {
                let transition = self.queue.previous(self.sync.elapsed_ms());
                self.apply(transition);
            }
            Command::PlayAt(position) => {
                let transition = self.queue.play_at(position);
                self.apply(transition);
            }
            Command::InsertAtHead(track) => {
                if self.queue.insert_at_head(track) {
                    self.events.queue_changed();
                }
            }
            Command::AppendToTail(track) => {
                if self.queue.append_to_tail(track) {
                    self.events.queue_changed();
                }
            }
            Command::PlayNow(track) => {
                let transition = self.queue.play_now(track);
                self.apply(transition);
            }
            Command::RemoveById(id) => {
                if self.queue.remove_by_id(&id) {
                    self.events.queue_changed();
                }
            }
            Command::Reorder { from, to } => {
                if self.queue.reorder(from, to) {
                    self.events.queue_changed();
                } else {
                    tracing::debug!(from, to, "reorder rejected");
                }
            }
            Command::ToggleShuffle => {
                self.queue.toggle_shuffle();
                self.events.queue_changed();
            }
            Command::SetRepeat(count) => {
                self.queue.set_repeat(count);
                self.events.status_changed();
            }
            Command::IncrementRepeat => {
                self.queue.increment_repeat();
                self.events.status_changed();
            }
            Command::ClearManualQueue => {
                if self.queue.clear_manual_queue() {
                    self.events.queue_changed();
                }
            }
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Toggle => {
                if self.queue.is_playing() {
                    self.pause();
                } else {
                    self.play();
                }
            }
            Command::Seek(position_ms) => {
                self.seek(i64::try_from(position_ms).unwrap_or(i64::MAX));
            }
            Command::SeekBy(delta_ms) => self.seek_by(delta_ms),
            Command::Transport(event) => self.on_transport_event(event),
            Command::Intent { action, details } => self.on_intent(action, details),
            Command::Resolved { generation, result } => {
                let outcome = self
                    .sync
                    .complete_resolution(generation, result, self.queue.is_playing());
                if outcome != SyncOutcome::Stale {
                    self.events.status_changed();
                }
                self.handle_outcome(outcome);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
        self.sync_session();
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Unchanged => {}
            Transition::Changed => {
                self.events
                    .track_changed(self.queue.current().map(|track| track.id.clone()));
                self.events.queue_changed();
                let outcome = self
                    .sync
                    .on_track_changed(self.queue.current(), self.queue.is_playing());
                self.handle_outcome(outcome);
            }
            Transition::Restart => {
                let outcome = self.sync.restart(self.queue.is_playing());
                self.events.status_changed();
                self.handle_outcome(outcome);
            }
            Transition::Stopped => {
                self.sync.stop_at_end();
                tracing::info!("queue ended");
                self.events.status_changed();
                self.events.queue_ended();
            }
        }
    }

    fn handle_outcome(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Idle | SyncOutcome::Loaded | SyncOutcome::Stale => {}
            SyncOutcome::Resolving { generation, track } => self.spawn_resolution(generation, track),
            SyncOutcome::Failed { track_id, reason } => self.on_failure(track_id, reason),
            SyncOutcome::PlayRejected { reason } => {
                tracing::warn!(reason = %reason, "playback did not start");
                if self.queue.set_playing(false) {
                    self.events.status_changed();
                }
            }
        }
    }

    fn spawn_resolution(&self, generation: u64, track: Track) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&track).await;
            let _ = tx.send(Command::Resolved { generation, result });
        });
    }

    fn on_failure(&mut self, track_id: TrackId, reason: String) {
        self.failures = self.failures.saturating_add(1);
        tracing::warn!(
            track_id = %track_id,
            reason = %reason,
            failures = self.failures,
            "track failed to play"
        );
        self.events.playback_failed(track_id, reason);

        if self.config.skip_on_failure && self.failures < self.config.max_consecutive_failures {
            self.queue.set_repeat(0);
            let transition = self.queue.advance();
            self.apply(transition);
        } else if self.queue.set_playing(false) {
            self.events.status_changed();
        }
    }

    fn play(&mut self) {
        if self.queue.current().is_none() {
            return;
        }
        let was_ended = self.queue.is_ended();
        if self.queue.set_playing(true) {
            self.events.status_changed();
        }
        let outcome = if was_ended {
            self.sync.restart(true)
        } else if !self.sync.is_loaded() && !self.sync.is_loading() {
            self.sync.on_track_changed(self.queue.current(), true)
        } else {
            self.sync.set_playing(true)
        };
        self.handle_outcome(outcome);
    }

    fn pause(&mut self) {
        if self.queue.set_playing(false) {
            self.events.status_changed();
        }
        let outcome = self.sync.set_playing(false);
        self.handle_outcome(outcome);
    }

    fn seek(&mut self, position_ms: i64) {
        if let Some(position) = self.sync.seek(position_ms) {
            if let Some(session) = self.session.as_mut() {
                session.push_position(position, self.sync.best_duration_ms());
            }
            self.events.status_changed();
        }
    }

    fn seek_by(&mut self, delta_ms: i64) {
        let elapsed = i64::try_from(self.sync.elapsed_ms().unwrap_or(0)).unwrap_or(i64::MAX);
        self.seek(elapsed.saturating_add(delta_ms));
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Progress {
                elapsed_ms,
                duration_ms,
            } => {
                let applied = self.sync.on_progress(
                    elapsed_ms,
                    duration_ms,
                    self.queue.is_playing(),
                    Instant::now(),
                );
                if !applied {
                    return;
                }
                self.failures = 0;
                if let Some(session) = self.session.as_mut() {
                    session.push_position(elapsed_ms, self.sync.best_duration_ms());
                }
            }
            TransportEvent::Ended => {
                if self.sync.on_ended() {
                    tracing::debug!("track ended");
                    let transition = self.queue.advance();
                    self.apply(transition);
                }
            }
            TransportEvent::LoadFailed { reason } => {
                if let Some(outcome) = self.sync.on_load_failed(reason) {
                    self.handle_outcome(outcome);
                }
            }
        }
    }

    fn on_intent(&mut self, action: SessionAction, details: ActionDetails) {
        tracing::debug!(?action, "session intent");
        let step = i64::try_from(details.seek_offset_ms.unwrap_or(self.config.seek_step_ms))
            .unwrap_or(i64::MAX);
        match action {
            SessionAction::Play => self.play(),
            SessionAction::Pause => self.pause(),
            SessionAction::NextTrack => {
                let transition = self.queue.advance();
                self.apply(transition);
            }
            SessionAction::PreviousTrack => {
                let transition = self.queue.previous(self.sync.elapsed_ms());
                self.apply(transition);
            }
            SessionAction::SeekTo => {
                if let Some(target) = details.seek_time_ms {
                    self.seek(i64::try_from(target).unwrap_or(i64::MAX));
                }
            }
            SessionAction::SeekForward => self.seek_by(step),
            SessionAction::SeekBackward => self.seek_by(-step),
        }
    }

    fn on_watchdog(&mut self) {
        if self.sync.poll_watchdog(Instant::now(), self.queue.is_playing()) {
            let transition = self.queue.advance();
            self.apply(transition);
            self.sync_session();
        }
    }

    fn sync_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.sync(self.queue.current(), self.queue.is_playing());
        }
    }

    fn phase(&self) -> PlaybackPhase {
        if self.queue.current().is_none() {
            PlaybackPhase::Idle
        } else if self.queue.is_ended() {
            PlaybackPhase::Ended
        } else if self.sync.is_loading() {
            PlaybackPhase::Loading
        } else if self.queue.is_playing() {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Paused
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            phase: self.phase(),
            elapsed_ms: self.sync.elapsed_ms(),
            duration_ms: self.sync.best_duration_ms(),
            ..self.queue.snapshot(self.config.upcoming_window)
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::RecordingSession;
    use crate::sync::tests::{Call, RecordingTransport};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Resolver with a per-track delay and result.
    #[derive(Default)]
    struct ScriptedResolver {
        routes: HashMap<String, (u64, std::result::Result<String, ResolveError>)>,
    }

    impl ScriptedResolver {
        fn route(mut self, id: &str, delay_ms: u64, result: std::result::Result<&str, ResolveError>) -> Self {
            self.routes
                .insert(id.to_string(), (delay_ms, result.map(str::to_string)));
            self
        }
    }

    #[async_trait]
    impl TrackResolver for ScriptedResolver {
        async fn resolve(&self, track: &Track) -> std::result::Result<String, ResolveError> {
            match self.routes.get(track.id.as_str()) {
                Some((delay_ms, result)) => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                    result.clone()
                }
                None => Err(ResolveError::NotFound),
            }
        }
    }

    fn ready(id: &str) -> Track {
        Track::ready(id, id.to_uppercase(), format!("mem://{id}")).with_duration_ms(10_000)
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|track| track.id.as_str()).collect()
    }

    fn spawn_player(config: EngineConfig, resolver: ScriptedResolver) -> (Player, RecordingTransport) {
        let transport = RecordingTransport::default();
        let player = Player::spawn(config, Box::new(transport.clone()), Arc::new(resolver), None);
        (player, transport)
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn manual_insert_plays_before_context() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b"), ready("c")], 0, true)
            .unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));
        assert!(snap.manual_queue.is_empty());
        assert_eq!(snap.context_cursor, 0);

        handle.insert_at_head(ready("x")).unwrap();
        assert_eq!(ids(&handle.snapshot().await.unwrap().manual_queue), vec!["x"]);

        handle.advance().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("x"));
        assert!(snap.manual_queue.is_empty());
        assert_eq!(snap.context_cursor, 0);
        assert_eq!(ids(&snap.history), vec!["a"]);

        handle.advance().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(snap.context_cursor, 1);
        assert_eq!(ids(&snap.history), vec!["a", "x"]);
        assert_eq!(snap.phase, PlaybackPhase::Playing);

        assert_eq!(
            transport.loads(),
            vec!["mem://a".to_string(), "mem://x".to_string(), "mem://b".to_string()]
        );
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resolution_never_becomes_the_source() {
        let resolver = ScriptedResolver::default()
            .route("a", 300, Ok("http://cdn/a"))
            .route("b", 50, Ok("http://cdn/b"));
        let (player, transport) = spawn_player(EngineConfig::default(), resolver);
        let handle = player.handle();

        let tracks = vec![
            Track::resolvable("a", "A", "songs/a"),
            Track::resolvable("b", "B", "songs/b"),
        ];
        handle.start_context(tracks, 0, true).unwrap();
        assert_eq!(handle.snapshot().await.unwrap().phase, PlaybackPhase::Loading);
        handle.advance().unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert_eq!(transport.loads(), vec!["http://cdn/b".to_string()]);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_advances_when_ended_never_arrives() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b")], 0, true)
            .unwrap();
        handle
            .transport_event(TransportEvent::Progress {
                elapsed_ms: 9_900,
                duration_ms: Some(10_000),
            })
            .unwrap();
        handle.snapshot().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));

        // The late native signal for "a" must not skip "b".
        handle.transport_event(TransportEvent::Ended).unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(transport.loads().len(), 2);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_stays_quiet_while_paused() {
        let (player, _transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b")], 0, true)
            .unwrap();
        handle
            .transport_event(TransportEvent::Progress {
                elapsed_ms: 9_900,
                duration_ms: Some(10_000),
            })
            .unwrap();
        handle.pause().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));
        assert_eq!(snap.phase, PlaybackPhase::Paused);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ended_and_user_next_apply_in_order() {
        let (player, _transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b"), ready("c")], 0, true)
            .unwrap();
        handle.transport_event(TransportEvent::Ended).unwrap();
        handle.advance().unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("c"));
        assert_eq!(ids(&snap.history), vec!["a", "b"]);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_queue_stops_on_last_track() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();
        let mut events = handle.subscribe();

        handle.start_context(vec![ready("a")], 0, true).unwrap();
        handle.transport_event(TransportEvent::Ended).unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));
        assert!(!snap.is_playing);
        assert_eq!(snap.phase, PlaybackPhase::Ended);
        assert_eq!(transport.calls().last(), Some(&Call::Pause));
        assert!(drain(&mut events).contains(&EngineEvent::QueueEnded));

        handle.play().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert_eq!(
            transport.calls()[transport.calls().len() - 2..],
            [Call::Seek(0), Call::Play]
        );
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_replays_then_advances() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b")], 0, true)
            .unwrap();
        handle.set_repeat(2).unwrap();
        for _ in 0..3 {
            handle.transport_event(TransportEvent::Ended).unwrap();
        }
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        let restarts = transport
            .calls()
            .iter()
            .filter(|call| **call == Call::Seek(0))
            .count();
        assert_eq!(restarts, 2);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolution_skips_ahead() {
        let resolver = ScriptedResolver::default()
            .route("a", 10, Err(ResolveError::Expired))
            .route("b", 10, Ok("http://cdn/b"));
        let (player, transport) = spawn_player(EngineConfig::default(), resolver);
        let handle = player.handle();
        let mut events = handle.subscribe();

        let tracks = vec![
            Track::resolvable("a", "A", "songs/a"),
            Track::resolvable("b", "B", "songs/b"),
        ];
        handle.start_context(tracks, 0, true).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert!(snap.is_playing);
        assert_eq!(transport.loads(), vec!["http://cdn/b".to_string()]);
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            EngineEvent::PlaybackFailed { track_id, .. } if track_id.as_str() == "a"
        )));
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_skipping_is_capped() {
        let config = EngineConfig {
            max_consecutive_failures: 2,
            ..EngineConfig::default()
        };
        let (player, transport) = spawn_player(config, ScriptedResolver::default());
        let handle = player.handle();

        let tracks = vec![
            Track::resolvable("a", "A", "songs/a"),
            Track::resolvable("b", "B", "songs/b"),
            Track::resolvable("c", "C", "songs/c"),
        ];
        handle.start_context(tracks, 0, true).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert!(!snap.is_playing);
        assert!(transport.loads().is_empty());
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refused_play_leaves_player_paused() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        *transport.refuse_play.lock().unwrap() = true;
        let handle = player.handle();

        handle.start_context(vec![ready("a")], 0, true).unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert!(!snap.is_playing);
        assert_eq!(snap.phase, PlaybackPhase::Paused);

        *transport.refuse_play.lock().unwrap() = false;
        handle.toggle().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert!(snap.is_playing);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_start_loads_without_playing() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle.start_context(vec![ready("a")], 0, false).unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(transport.calls(), vec![Call::Load("mem://a".into())]);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn seeks_are_clamped() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle.start_context(vec![ready("a")], 0, true).unwrap();
        handle.seek(60_000).unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(transport.calls().last(), Some(&Call::Seek(10_000)));

        handle.seek(4_000).unwrap();
        handle.rewind(None).unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(transport.calls().last(), Some(&Call::Seek(0)));

        handle.seek_by(2_500).unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.elapsed_ms, Some(2_500));
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn previous_restarts_late_in_track() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b")], 1, true)
            .unwrap();
        handle
            .transport_event(TransportEvent::Progress {
                elapsed_ms: 6_000,
                duration_ms: Some(10_000),
            })
            .unwrap();
        handle.previous().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(
            transport.calls()[transport.calls().len() - 2..],
            [Call::Seek(0), Call::Play]
        );

        handle.previous().unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn previous_after_manual_track_steps_back_in_context() {
        let (player, transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b"), ready("c")], 1, true)
            .unwrap();
        handle.insert_at_head(ready("x")).unwrap();
        handle.advance().unwrap();
        handle.previous().unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("a"));
        assert_eq!(snap.context_cursor, 0);
        assert_eq!(
            transport.loads(),
            vec!["mem://b".to_string(), "mem://x".to_string(), "mem://a".to_string()]
        );
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_progress_while_resolving_does_not_skip() {
        let resolver = ScriptedResolver::default().route("b", 2_000, Ok("http://cdn/b"));
        let (player, transport) = spawn_player(EngineConfig::default(), resolver);
        let handle = player.handle();

        let tracks = vec![
            ready("a"),
            Track::resolvable("b", "B", "songs/b"),
            ready("c"),
        ];
        handle.start_context(tracks, 0, true).unwrap();
        handle.advance().unwrap();
        handle
            .transport_event(TransportEvent::Progress {
                elapsed_ms: 9_900,
                duration_ms: Some(10_000),
            })
            .unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.phase, PlaybackPhase::Loading);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(snap.phase, PlaybackPhase::Loading);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert_eq!(
            transport.loads(),
            vec!["mem://a".to_string(), "http://cdn/b".to_string()]
        );
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn play_now_promotes_and_dedupes() {
        let (player, _transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();

        handle
            .start_context(vec![ready("a"), ready("b")], 0, false)
            .unwrap();
        handle.append_to_tail(ready("x")).unwrap();
        handle.append_to_tail(ready("y")).unwrap();
        handle.play_now(ready("y")).unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("y"));
        assert_eq!(ids(&snap.manual_queue), vec!["x"]);
        assert!(snap.is_playing);
        player.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_intents_drive_the_player() {
        let transport = RecordingTransport::default();
        let session = RecordingSession::default();
        let player = Player::spawn(
            EngineConfig::default(),
            Box::new(transport.clone()),
            Arc::new(ScriptedResolver::default()),
            Some(Box::new(session.clone())),
        );
        let handle = player.handle();
        assert_eq!(session.handler_count(), SessionAction::ALL.len());

        handle
            .start_context(vec![ready("a"), ready("b")], 0, true)
            .unwrap();
        handle.snapshot().await.unwrap();

        assert!(session.fire(SessionAction::NextTrack, ActionDetails::default()));
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.current.as_ref().map(|t| t.id.as_str()), Some("b"));

        assert!(session.fire(
            SessionAction::SeekTo,
            ActionDetails {
                seek_time_ms: Some(3_000),
                seek_offset_ms: None,
            }
        ));
        assert!(session.fire(SessionAction::Pause, ActionDetails::default()));
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.elapsed_ms, Some(3_000));
        assert!(!snap.is_playing);

        player.shutdown().await;
        assert_eq!(session.handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_player_reports_closed() {
        let (player, _transport) = spawn_player(EngineConfig::default(), ScriptedResolver::default());
        let handle = player.handle();
        player.shutdown().await;
        assert_eq!(handle.advance(), Err(PlayerError::Closed));
        assert_eq!(handle.snapshot().await, Err(PlayerError::Closed));
    }
}
