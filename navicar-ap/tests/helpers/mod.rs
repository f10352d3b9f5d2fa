//! Shared test infrastructure for navicar-ap integration tests
//!
//! - `MockPlayer`: records calls, optionally reports `Ready` on load
//! - `MemoryStore`: in-memory last-track store
//! - `Harness`: a running engine wired to both
//! - `mount_navidrome`: wiremock Navidrome with two albums

#![allow(dead_code)]

use async_trait::async_trait;
use navicar_ap::car::CarBridge;
use navicar_ap::catalog::{CatalogClient, CatalogCredentials};
use navicar_ap::coordinator::SessionCoordinator;
use navicar_ap::playback::{
    EngineParts, EngineSettings, FocusArbiter, LastTrackStore, MediaPlayer, PlaybackEngine, PlaybackHandle,
    PlayerSignal, SignalSender,
};
use navicar_common::db::{init_database, AccountStore};
use navicar_common::events::{EventBus, PlaybackSnapshot, PlayerEvent};
use navicar_common::{PlayableTrack, SessionManager};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TIMEOUT: Duration = Duration::from_secs(3);
pub const FALLBACK_STREAM: &str = "http://radio.example/stream";

/// One call made on the mock player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    Load { media_id: String, generation: u64 },
    Play,
    Pause,
    Stop,
    Seek(u64),
    Release,
}

pub struct MockPlayer {
    calls: Arc<Mutex<Vec<PlayerCall>>>,
    signals: SignalSender,
    position: Arc<AtomicU64>,
    auto_ready: bool,
}

impl MediaPlayer for MockPlayer {
    fn load(&mut self, track: &PlayableTrack, generation: u64) {
        self.record(PlayerCall::Load {
            media_id: track.media_id.clone(),
            generation,
        });
        if self.auto_ready {
            let _ = self.signals.send(PlayerSignal::Ready {
                generation,
                duration_ms: track.duration_ms,
            });
        }
    }

    fn play(&mut self) {
        self.record(PlayerCall::Play);
    }

    fn pause(&mut self) {
        self.record(PlayerCall::Pause);
    }

    fn stop(&mut self) {
        self.record(PlayerCall::Stop);
    }

    fn seek(&mut self, position_ms: u64) {
        self.position.store(position_ms, Ordering::SeqCst);
        self.record(PlayerCall::Seek(position_ms));
    }

    fn position_ms(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    fn buffered_ms(&self) -> u64 {
        self.position.load(Ordering::SeqCst) + 5_000
    }

    fn release(&mut self) {
        self.record(PlayerCall::Release);
    }
}

impl MockPlayer {
    fn record(&self, call: PlayerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    track: Mutex<Option<PlayableTrack>>,
}

impl MemoryStore {
    pub fn with_track(track: PlayableTrack) -> Self {
        Self {
            track: Mutex::new(Some(track)),
        }
    }

    pub fn current(&self) -> Option<PlayableTrack> {
        self.track.lock().unwrap().clone()
    }
}

#[async_trait]
impl LastTrackStore for MemoryStore {
    async fn save(&self, track: &PlayableTrack) -> navicar_common::Result<()> {
        *self.track.lock().unwrap() = Some(track.clone());
        Ok(())
    }

    async fn load(&self) -> navicar_common::Result<Option<PlayableTrack>> {
        Ok(self.current())
    }
}

/// A running engine and the handles to observe it
pub struct Harness {
    pub playback: PlaybackHandle,
    pub calls: Arc<Mutex<Vec<PlayerCall>>>,
    pub signals: SignalSender,
    pub position: Arc<AtomicU64>,
    pub arbiter: FocusArbiter,
    pub store: Arc<MemoryStore>,
    pub events: EventBus,
}

impl Harness {
    pub fn start(auto_ready: bool) -> Self {
        Self::with_store(auto_ready, MemoryStore::default())
    }

    pub fn with_store(auto_ready: bool, store: MemoryStore) -> Self {
        Self::build(auto_ready, store, Duration::from_millis(20))
    }

    /// Engine whose ticker never fires during a test
    pub fn with_slow_ticker(auto_ready: bool) -> Self {
        Self::build(auto_ready, MemoryStore::default(), Duration::from_secs(600))
    }

    fn build(auto_ready: bool, store: MemoryStore, position_interval: Duration) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let position = Arc::new(AtomicU64::new(0));
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let arbiter = FocusArbiter::new();
        let (focus, focus_changes) = arbiter.register("test-engine");
        let store = Arc::new(store);
        let events = EventBus::new(100);

        let player = MockPlayer {
            calls: Arc::clone(&calls),
            signals: signals.clone(),
            position: Arc::clone(&position),
            auto_ready,
        };

        let playback = PlaybackEngine::spawn(EngineParts {
            player: Box::new(player),
            signals: signal_rx,
            focus: Box::new(focus),
            focus_changes,
            store: Arc::clone(&store) as Arc<dyn LastTrackStore>,
            events: events.clone(),
            settings: EngineSettings {
                position_interval,
                ..EngineSettings::default()
            },
        });

        Self {
            playback,
            calls,
            signals,
            position,
            arbiter,
            store,
            events,
        }
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlayerCall::Load { media_id, .. } => Some(media_id),
                _ => None,
            })
            .collect()
    }

    pub async fn wait_for_call(&self, call: PlayerCall) {
        let calls = Arc::clone(&self.calls);
        wait_until(move || calls.lock().unwrap().contains(&call)).await;
    }
}

pub fn track(media_id: &str, duration_ms: u64) -> PlayableTrack {
    PlayableTrack::new(media_id, format!("Title {}", media_id), format!("http://nd/rest/stream?id={}", media_id))
        .with_duration_ms(duration_ms)
        .with_subtitle("Artist")
}

/// Wait until the latest snapshot satisfies `pred`
pub async fn wait_for_snapshot<F>(playback: &PlaybackHandle, pred: F) -> PlaybackSnapshot
where
    F: FnMut(&PlaybackSnapshot) -> bool,
{
    let mut rx = playback.subscribe();
    let snapshot = tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("engine stopped")
        .clone();
    snapshot
}

/// Receive events until one satisfies `pred`
pub async fn next_event<F>(rx: &mut broadcast::Receiver<PlayerEvent>, pred: F) -> PlayerEvent
where
    F: Fn(&PlayerEvent) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}

// ========================================
// Navidrome mock
// ========================================

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "secret";

/// Mount login, album and song endpoints for user `alice`/`secret`
///
/// Album `a2` is newer than `a1`; songs of `a1` are served out of order.
pub async fn mount_navidrome(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": USERNAME, "password": PASSWORD})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "jwt-alice",
            "subsonicSalt": "salt",
            "subsonicToken": "st",
            "username": USERNAME,
        })))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid username or password"})))
        .with_priority(2)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/album"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "a1", "name": "Old Album", "albumArtist": "Band", "createdAt": "2020-01-01T00:00:00Z"},
            {"id": "a2", "name": "New Album", "albumArtist": "Band", "createdAt": "2024-01-01T00:00:00Z"},
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/song"))
        .and(query_param("album_id", "a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "s12", "title": "Second", "trackNumber": 2, "duration": 200.0, "artist": "Band"},
            {"id": "s11", "title": "First", "trackNumber": 1, "duration": 180.5, "artist": "Band"},
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/song"))
        .and(query_param("album_id", "a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "s21", "title": "Opener", "trackNumber": 1, "duration": 240, "artist": "Band"},
        ])))
        .mount(server)
        .await;
}

/// Coordinator, car bridge and engine over a temp database
pub struct App {
    pub dir: TempDir,
    pub harness: Harness,
    pub car: Arc<CarBridge>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl App {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("navicar.db")).await.unwrap();
        let session = SessionManager::new(AccountStore::new(pool).await.unwrap());

        let harness = Harness::start(true);
        let catalog = CatalogClient::new(CatalogCredentials::default(), "navicar-test", Duration::from_secs(5)).unwrap();
        let car = Arc::new(CarBridge::new(
            harness.playback.clone(),
            Arc::clone(&harness.store) as Arc<dyn LastTrackStore>,
        ));
        let coordinator = Arc::new(SessionCoordinator::new(
            session,
            catalog,
            Arc::clone(&car),
            harness.events.clone(),
            FALLBACK_STREAM,
        ));

        Self {
            dir,
            harness,
            car,
            coordinator,
        }
    }
}
