//! Playback engine
//!
//! Owns the `PlaybackMachine` on a single tokio task and executes the
//! commands it returns against the media player, the focus policy, the
//! position ticker and the last-track store.
//!
//! Inputs arrive on three channels: transport commands (from any number of
//! `PlaybackHandle`s), player signals and focus changes. Every transition
//! that changes observable state replaces the value in a `watch` channel;
//! discrete events go to the `EventBus`.

use crate::error::{Error, Result};
use crate::playback::focus::{AudioFocus, FocusChange};
use crate::playback::machine::{Command, Input, MachineSettings, PlaybackMachine};
use crate::playback::player::{MediaPlayer, PlayerSignal};
use crate::playback::store::LastTrackStore;
use navicar_common::events::{EventBus, PlaybackSnapshot, PlayerEvent, RejectReason};
use navicar_common::PlayableTrack;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default position sampling interval while playing
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_millis(1000);

/// Engine tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub machine: MachineSettings,
    /// Ticker period while playing
    pub position_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            machine: MachineSettings::default(),
            position_interval: DEFAULT_POSITION_INTERVAL,
        }
    }
}

/// Everything the engine task takes ownership of
pub struct EngineParts {
    pub player: Box<dyn MediaPlayer>,
    pub signals: mpsc::UnboundedReceiver<PlayerSignal>,
    pub focus: Box<dyn AudioFocus>,
    pub focus_changes: mpsc::UnboundedReceiver<FocusChange>,
    pub store: Arc<dyn LastTrackStore>,
    pub events: EventBus,
    pub settings: EngineSettings,
}

enum EngineMessage {
    Input(Input),
    Tick,
    Release(oneshot::Sender<()>),
}

/// Handle to a running playback engine
///
/// Cheap to clone. Transport methods only enqueue; observe the result
/// through `subscribe()` or the event bus.
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
    snapshot_rx: watch::Receiver<PlaybackSnapshot>,
    events: EventBus,
}

impl PlaybackHandle {
    /// Stop the current media and load `track`
    pub fn load(&self, track: PlayableTrack, autoplay: bool) -> Result<()> {
        self.send(Input::Load { track, autoplay })
    }

    pub fn play(&self) -> Result<()> {
        self.send(Input::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Input::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Input::Stop)
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.send(Input::Seek { position_ms })
    }

    pub fn skip_next(&self) -> Result<()> {
        self.send(Input::SkipNext)
    }

    pub fn skip_prev(&self) -> Result<()> {
        self.send(Input::SkipPrev)
    }

    /// Stop, abandon focus and release the player; waits for the engine task
    pub async fn release(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(EngineMessage::Release(done_tx)).is_err() {
            // Already gone
            return Ok(());
        }
        done_rx
            .await
            .map_err(|_| Error::Playback("engine stopped before release completed".to_string()))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Live snapshot stream; holds exactly one current value
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, input: Input) -> Result<()> {
        self.tx
            .send(EngineMessage::Input(input))
            .map_err(|_| Error::Playback("playback engine is not running".to_string()))
    }
}

/// The engine task state
pub struct PlaybackEngine {
    machine: PlaybackMachine,
    player: Box<dyn MediaPlayer>,
    focus: Box<dyn AudioFocus>,
    store: Arc<dyn LastTrackStore>,
    events: EventBus,
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    self_tx: mpsc::WeakUnboundedSender<EngineMessage>,
    signals: mpsc::UnboundedReceiver<PlayerSignal>,
    focus_changes: mpsc::UnboundedReceiver<FocusChange>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    position_interval: Duration,
    ticker: Option<JoinHandle<()>>,
    /// Generation of the track handed to the player last
    generation: u64,
}

impl PlaybackEngine {
    /// Start the engine task and return its handle
    pub fn spawn(parts: EngineParts) -> PlaybackHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = PlaybackMachine::new(parts.settings.machine);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let engine = Self {
            machine,
            player: parts.player,
            focus: parts.focus,
            store: parts.store,
            events: parts.events.clone(),
            rx,
            self_tx: tx.downgrade(),
            signals: parts.signals,
            focus_changes: parts.focus_changes,
            snapshot_tx,
            position_interval: parts.settings.position_interval,
            ticker: None,
            generation: 0,
        };

        tokio::spawn(engine.run());
        info!("Playback engine started");

        PlaybackHandle {
            tx,
            snapshot_rx,
            events: parts.events,
        }
    }

    async fn run(mut self) {
        while !self.machine.is_released() {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(EngineMessage::Input(input)) => self.dispatch(input).await,
                    Some(EngineMessage::Tick) => {
                        let input = Input::Tick {
                            position_ms: self.player.position_ms(),
                            buffered_ms: self.player.buffered_ms(),
                        };
                        self.dispatch(input).await;
                    }
                    Some(EngineMessage::Release(done)) => {
                        self.dispatch(Input::Release).await;
                        let _ = done.send(());
                    }
                    None => {
                        debug!("All playback handles dropped");
                        self.dispatch(Input::Release).await;
                    }
                },
                Some(signal) = self.signals.recv() => {
                    if let Some(input) = self.signal_input(signal) {
                        self.dispatch(input).await;
                    }
                }
                Some(change) = self.focus_changes.recv() => {
                    self.dispatch(Input::FocusChanged(change)).await;
                }
            }
        }

        self.stop_ticker();
        info!("Playback engine stopped");
    }

    /// Map a player signal to a machine input, dropping stale ones
    fn signal_input(&self, signal: PlayerSignal) -> Option<Input> {
        if signal.generation() != self.generation {
            debug!("Dropping stale player signal {:?}", signal);
            return None;
        }
        Some(match signal {
            PlayerSignal::Ready { duration_ms, .. } => Input::Ready { duration_ms },
            PlayerSignal::Ended { .. } => Input::Ended,
            PlayerSignal::Failed { message, .. } => Input::PlayerError { message },
        })
    }

    async fn dispatch(&mut self, input: Input) {
        if input.reads_position() {
            // The ticker sample can be a full interval old
            self.machine
                .sample(self.player.position_ms(), self.player.buffered_ms());
        }
        let mut queue: VecDeque<Command> = self.machine.handle(input).into();
        let mut publish = false;

        while let Some(command) = queue.pop_front() {
            match command {
                Command::PlayerLoad(track) => {
                    self.generation += 1;
                    debug!(media_id = %track.media_id, generation = self.generation, "Loading track");
                    self.player.load(&track, self.generation);
                }
                Command::PlayerPlay => self.player.play(),
                Command::PlayerPause => self.player.pause(),
                Command::PlayerStop => self.player.stop(),
                Command::PlayerSeek(position_ms) => self.player.seek(position_ms),
                Command::PlayerRelease => self.player.release(),
                Command::RequestFocus => {
                    let granted = self.focus.request().is_granted();
                    debug!("Audio focus request granted: {}", granted);
                    queue.extend(self.machine.handle(Input::FocusResult { granted }));
                }
                Command::AbandonFocus => self.focus.abandon(),
                Command::StartTicker => self.start_ticker(),
                Command::StopTicker => self.stop_ticker(),
                Command::PersistLastTrack(track) => {
                    if let Err(e) = self.store.save(&track).await {
                        warn!("Failed to persist last track: {}", e);
                    }
                }
                Command::ResumeLastTrack => match self.store.load().await {
                    Ok(Some(track)) => {
                        info!(media_id = %track.media_id, "Resuming last played track");
                        queue.extend(self.machine.handle(Input::Load {
                            track,
                            autoplay: true,
                        }));
                    }
                    Ok(None) => self.reject_play(),
                    Err(e) => {
                        warn!("Failed to read last track: {}", e);
                        self.reject_play();
                    }
                },
                Command::Publish => publish = true,
                Command::Emit(event) => self.events.emit_lossy(event),
            }
        }

        if publish {
            self.snapshot_tx.send_replace(self.machine.snapshot());
        }
    }

    fn reject_play(&self) {
        self.events.emit_lossy(PlayerEvent::CommandRejected {
            command: "play".to_string(),
            reason: RejectReason::NothingToPlay,
            timestamp: chrono::Utc::now(),
        });
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();
        let weak = self.self_tx.clone();
        let period = self.position_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = weak.upgrade() else {
                    break;
                };
                if tx.send(EngineMessage::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
