//! Playback state machine
//!
//! Pure transition logic: `PlaybackMachine::handle` consumes one `Input`
//! and returns the `Command`s the engine loop must execute. The machine
//! never touches the player, focus policy, clock or database itself, so
//! every transition is testable without audio hardware.

use crate::playback::focus::FocusChange;
use navicar_common::events::{
    PlaybackAction, PlaybackSnapshot, PlaybackStatus, PlayerEvent, RejectReason,
};
use navicar_common::PlayableTrack;
use std::collections::BTreeSet;
use tracing::debug;

/// Forward/backward skip distance
pub const DEFAULT_SKIP_INTERVAL_MS: u64 = 60_000;

/// Distance kept from the end when skipping past it
pub const DEFAULT_SKIP_MARGIN_MS: u64 = 1_000;

/// Tunables for the transition rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSettings {
    pub skip_interval_ms: u64,
    pub skip_margin_ms: u64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            skip_interval_ms: DEFAULT_SKIP_INTERVAL_MS,
            skip_margin_ms: DEFAULT_SKIP_MARGIN_MS,
        }
    }
}

/// Everything that can drive a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    // Transport commands
    Load { track: PlayableTrack, autoplay: bool },
    Play,
    Pause,
    Stop,
    Seek { position_ms: u64 },
    SkipNext,
    SkipPrev,
    Release,

    // Player signals
    Ready { duration_ms: u64 },
    Ended,
    PlayerError { message: String },

    // Focus
    FocusResult { granted: bool },
    FocusChanged(FocusChange),

    /// Periodic player sample while playing
    Tick { position_ms: u64, buffered_ms: u64 },
}

impl Input {
    fn name(&self) -> &'static str {
        match self {
            Input::Load { .. } => "load",
            Input::Play => "play",
            Input::Pause => "pause",
            Input::Stop => "stop",
            Input::Seek { .. } => "seek",
            Input::SkipNext => "skip_next",
            Input::SkipPrev => "skip_prev",
            Input::Release => "release",
            Input::Ready { .. } => "ready",
            Input::Ended => "ended",
            Input::PlayerError { .. } => "player_error",
            Input::FocusResult { .. } => "focus_result",
            Input::FocusChanged(_) => "focus_changed",
            Input::Tick { .. } => "tick",
        }
    }

    /// Whether the transition depends on where the player is right now
    pub fn reads_position(&self) -> bool {
        matches!(
            self,
            Input::Pause
                | Input::Seek { .. }
                | Input::SkipNext
                | Input::SkipPrev
                | Input::FocusChanged(_)
        )
    }
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stop the current media and prepare `track`
    PlayerLoad(PlayableTrack),
    PlayerPlay,
    PlayerPause,
    PlayerStop,
    PlayerSeek(u64),
    PlayerRelease,
    RequestFocus,
    AbandonFocus,
    StartTicker,
    StopTicker,
    PersistLastTrack(PlayableTrack),
    /// Look up the last persisted track and load it with autoplay
    ResumeLastTrack,
    /// Publish the current snapshot
    Publish,
    Emit(PlayerEvent),
}

/// The playback state machine
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    settings: MachineSettings,
    status: PlaybackStatus,
    track: Option<PlayableTrack>,
    position_ms: u64,
    duration_ms: u64,
    buffered_ms: u64,
    error_message: Option<String>,
    /// Play requested and not yet satisfied (autoplay or awaiting focus)
    pending_play: bool,
    /// Paused by a focus loss; resume on the next gain
    resume_on_gain: bool,
    focus_held: bool,
    released: bool,
}

impl PlaybackMachine {
    pub fn new(settings: MachineSettings) -> Self {
        Self {
            settings,
            status: PlaybackStatus::Idle,
            track: None,
            position_ms: 0,
            duration_ms: 0,
            buffered_ms: 0,
            error_message: None,
            pending_play: false,
            resume_on_gain: false,
            focus_held: false,
            released: false,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn track(&self) -> Option<&PlayableTrack> {
        self.track.as_ref()
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Transport actions valid in the current state
    pub fn available_actions(&self) -> BTreeSet<PlaybackAction> {
        let mut actions = BTreeSet::new();
        match self.status {
            PlaybackStatus::Idle => {
                actions.insert(PlaybackAction::Play);
            }
            PlaybackStatus::Buffering => {
                actions.insert(PlaybackAction::Pause);
                actions.insert(PlaybackAction::Stop);
            }
            PlaybackStatus::Playing => {
                actions.insert(PlaybackAction::Pause);
                actions.insert(PlaybackAction::Stop);
            }
            PlaybackStatus::Paused | PlaybackStatus::Stopped => {
                actions.insert(PlaybackAction::Play);
                actions.insert(PlaybackAction::Stop);
            }
            PlaybackStatus::Error => {}
        }
        if self.duration_ms > 0 && self.is_seekable_status() {
            actions.insert(PlaybackAction::SeekTo);
            actions.insert(PlaybackAction::SkipNext);
            actions.insert(PlaybackAction::SkipPrev);
        }
        actions
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            media_id: self.track.as_ref().map(|t| t.media_id.clone()),
            title: self.track.as_ref().map(|t| t.title.clone()),
            subtitle: self.track.as_ref().and_then(|t| t.subtitle.clone()),
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            buffered_position_ms: self.buffered_ms,
            available_actions: self.available_actions(),
            error_message: self.error_message.clone(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Apply one input
    pub fn handle(&mut self, input: Input) -> Vec<Command> {
        if self.released {
            debug!("Ignoring {} after release", input.name());
            return Vec::new();
        }

        let before = self.status;
        let commands = match input {
            Input::Load { track, autoplay } => self.on_load(track, autoplay),
            Input::Play => self.on_play(),
            Input::Pause => self.on_pause(),
            Input::Stop => self.on_stop(),
            Input::Seek { position_ms } => self.on_seek("seek", position_ms),
            Input::SkipNext => self.on_skip_next(),
            Input::SkipPrev => self.on_skip_prev(),
            Input::Release => self.on_release(),
            Input::Ready { duration_ms } => self.on_ready(duration_ms),
            Input::Ended => self.on_ended(),
            Input::PlayerError { message } => self.on_error(message),
            Input::FocusResult { granted } => self.on_focus_result(granted),
            Input::FocusChanged(change) => self.on_focus_changed(change),
            Input::Tick {
                position_ms,
                buffered_ms,
            } => self.on_tick(position_ms, buffered_ms),
        };

        if before != self.status {
            debug!("Playback {} -> {}", before, self.status);
        }
        commands
    }

    fn on_load(&mut self, track: PlayableTrack, autoplay: bool) -> Vec<Command> {
        self.status = PlaybackStatus::Buffering;
        self.position_ms = 0;
        self.buffered_ms = 0;
        self.duration_ms = track.duration_ms;
        self.error_message = None;
        self.pending_play = autoplay;
        self.resume_on_gain = false;
        self.track = Some(track.clone());

        vec![Command::StopTicker, Command::PlayerLoad(track), Command::Publish]
    }

    fn on_ready(&mut self, duration_ms: u64) -> Vec<Command> {
        if self.status != PlaybackStatus::Buffering {
            return Vec::new();
        }
        let Some(track) = self.track.clone() else {
            return Vec::new();
        };

        self.status = PlaybackStatus::Paused;
        self.duration_ms = duration_ms;

        let mut commands = vec![
            Command::PersistLastTrack(track.clone()),
            Command::Emit(PlayerEvent::TrackLoaded {
                media_id: track.media_id,
                title: track.title,
                duration_ms,
                timestamp: chrono::Utc::now(),
            }),
            Command::Publish,
        ];
        if self.pending_play {
            commands.extend(self.start_or_request_focus());
        }
        commands
    }

    fn on_play(&mut self) -> Vec<Command> {
        match self.status {
            PlaybackStatus::Playing => Vec::new(),
            PlaybackStatus::Paused => {
                self.pending_play = true;
                self.start_or_request_focus()
            }
            PlaybackStatus::Buffering => {
                self.pending_play = true;
                Vec::new()
            }
            PlaybackStatus::Idle | PlaybackStatus::Stopped => match self.track.clone() {
                Some(track) => self.on_load(track, true),
                None => vec![Command::ResumeLastTrack],
            },
            PlaybackStatus::Error => self.reject("play", RejectReason::InvalidState),
        }
    }

    /// Play now if focus is held, otherwise ask for it
    fn start_or_request_focus(&mut self) -> Vec<Command> {
        if self.focus_held {
            self.start_playing()
        } else {
            vec![Command::RequestFocus]
        }
    }

    fn start_playing(&mut self) -> Vec<Command> {
        self.pending_play = false;
        self.resume_on_gain = false;
        self.status = PlaybackStatus::Playing;
        vec![Command::PlayerPlay, Command::StartTicker, Command::Publish]
    }

    fn on_pause(&mut self) -> Vec<Command> {
        self.pending_play = false;
        self.resume_on_gain = false;
        match self.status {
            PlaybackStatus::Playing => {
                self.status = PlaybackStatus::Paused;
                vec![Command::PlayerPause, Command::StopTicker, Command::Publish]
            }
            _ => Vec::new(),
        }
    }

    fn on_stop(&mut self) -> Vec<Command> {
        self.status = PlaybackStatus::Stopped;
        self.position_ms = 0;
        self.buffered_ms = 0;
        self.pending_play = false;
        self.resume_on_gain = false;
        self.error_message = None;

        let mut commands = vec![Command::StopTicker, Command::PlayerStop];
        commands.extend(self.release_focus());
        commands.push(Command::Publish);
        commands
    }

    fn on_seek(&mut self, command: &str, position_ms: u64) -> Vec<Command> {
        if self.duration_ms == 0 {
            return self.reject(command, RejectReason::UnboundedStream);
        }
        if !self.is_seekable_status() {
            return self.reject(command, RejectReason::InvalidState);
        }

        self.position_ms = position_ms.min(self.duration_ms);
        vec![Command::PlayerSeek(self.position_ms), Command::Publish]
    }

    fn on_skip_next(&mut self) -> Vec<Command> {
        let target = self.position_ms.saturating_add(self.settings.skip_interval_ms);
        let target = if target > self.duration_ms {
            self.duration_ms.saturating_sub(self.settings.skip_margin_ms)
        } else {
            target
        };
        self.on_seek("skip_next", target)
    }

    fn on_skip_prev(&mut self) -> Vec<Command> {
        let target = self.position_ms.saturating_sub(self.settings.skip_interval_ms);
        self.on_seek("skip_prev", target)
    }

    fn on_ended(&mut self) -> Vec<Command> {
        if !matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused) {
            return Vec::new();
        }
        self.status = PlaybackStatus::Stopped;
        self.position_ms = self.duration_ms;
        self.pending_play = false;
        self.resume_on_gain = false;

        let mut commands = vec![Command::StopTicker];
        commands.extend(self.release_focus());
        commands.push(Command::Publish);
        commands
    }

    fn on_error(&mut self, message: String) -> Vec<Command> {
        if !matches!(
            self.status,
            PlaybackStatus::Buffering | PlaybackStatus::Playing | PlaybackStatus::Paused
        ) {
            return Vec::new();
        }
        self.status = PlaybackStatus::Error;
        self.error_message = Some(message.clone());
        self.pending_play = false;
        self.resume_on_gain = false;

        let mut commands = vec![Command::StopTicker];
        commands.extend(self.release_focus());
        commands.push(Command::Emit(PlayerEvent::PlaybackFailed {
            media_id: self.track.as_ref().map(|t| t.media_id.clone()),
            message,
            timestamp: chrono::Utc::now(),
        }));
        commands.push(Command::Publish);
        commands
    }

    fn on_focus_result(&mut self, granted: bool) -> Vec<Command> {
        if granted {
            self.focus_held = true;
        }

        if !self.pending_play || self.status != PlaybackStatus::Paused {
            // Nobody is waiting for this grant any more
            return if granted { self.release_focus() } else { Vec::new() };
        }

        if granted {
            self.start_playing()
        } else {
            self.pending_play = false;
            vec![Command::Emit(PlayerEvent::FocusDenied {
                timestamp: chrono::Utc::now(),
            })]
        }
    }

    fn on_focus_changed(&mut self, change: FocusChange) -> Vec<Command> {
        match change {
            FocusChange::Gain => {
                self.focus_held = true;
                if self.resume_on_gain && self.status == PlaybackStatus::Paused {
                    self.start_playing()
                } else {
                    Vec::new()
                }
            }
            FocusChange::Loss | FocusChange::LossTransient => {
                self.focus_held = false;
                if self.status == PlaybackStatus::Playing {
                    self.status = PlaybackStatus::Paused;
                    self.resume_on_gain = true;
                    vec![Command::PlayerPause, Command::StopTicker, Command::Publish]
                } else {
                    Vec::new()
                }
            }
            FocusChange::LossTransientCanDuck => Vec::new(),
        }
    }

    fn on_tick(&mut self, position_ms: u64, buffered_ms: u64) -> Vec<Command> {
        if self.sample(position_ms, buffered_ms) {
            vec![Command::Publish]
        } else {
            Vec::new()
        }
    }

    /// Take a player position sample without publishing it
    ///
    /// Only a playing track moves on its own; any other state keeps the
    /// position the last transition set. Returns whether the sample applied.
    pub fn sample(&mut self, position_ms: u64, buffered_ms: u64) -> bool {
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        self.position_ms = if self.duration_ms > 0 {
            position_ms.min(self.duration_ms)
        } else {
            position_ms
        };
        self.buffered_ms = buffered_ms;
        true
    }

    fn on_release(&mut self) -> Vec<Command> {
        self.status = PlaybackStatus::Stopped;
        self.pending_play = false;
        self.resume_on_gain = false;

        let mut commands = vec![Command::StopTicker, Command::PlayerStop];
        commands.extend(self.release_focus());
        commands.push(Command::PlayerRelease);
        commands.push(Command::Publish);
        self.released = true;
        commands
    }

    fn release_focus(&mut self) -> Vec<Command> {
        if self.focus_held {
            self.focus_held = false;
            vec![Command::AbandonFocus]
        } else {
            Vec::new()
        }
    }

    fn is_seekable_status(&self) -> bool {
        matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused)
    }

    fn reject(&self, command: &str, reason: RejectReason) -> Vec<Command> {
        debug!("Rejected {} in {}: {}", command, self.status, reason);
        vec![Command::Emit(PlayerEvent::CommandRejected {
            command: command.to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        })]
    }
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new(MachineSettings::default())
    }
}
