//! Playback engine integration tests
//!
//! Drives a real engine task with a mock player, the in-process focus
//! arbiter and an in-memory last-track store.

mod helpers;

use helpers::{next_event, track, wait_for_snapshot, Harness, MemoryStore, PlayerCall};
use navicar_ap::playback::{Interruption, PlayerSignal};
use navicar_common::events::{PlaybackAction, PlaybackStatus, PlayerEvent, RejectReason};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn is_status(status: PlaybackStatus) -> impl FnMut(&navicar_common::events::PlaybackSnapshot) -> bool {
    move |s| s.status == status
}

#[tokio::test]
async fn test_autoplay_load_reaches_playing() {
    let h = Harness::start(true);
    let mut events = h.events.subscribe();

    h.playback.load(track("a1", 180_000), true).unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;
    assert_eq!(snapshot.media_id.as_deref(), Some("a1"));
    assert_eq!(snapshot.duration_ms, 180_000);
    assert!(snapshot.allows(PlaybackAction::SeekTo));

    let loaded = next_event(&mut events, |e| matches!(e, PlayerEvent::TrackLoaded { .. })).await;
    match loaded {
        PlayerEvent::TrackLoaded { media_id, duration_ms, .. } => {
            assert_eq!(media_id, "a1");
            assert_eq!(duration_ms, 180_000);
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(
        h.calls(),
        vec![
            PlayerCall::Load {
                media_id: "a1".to_string(),
                generation: 1
            },
            PlayerCall::Play,
        ]
    );
    assert_eq!(h.store.current().map(|t| t.media_id), Some("a1".to_string()));
}

#[tokio::test]
async fn test_load_without_autoplay_stays_paused() {
    let h = Harness::start(true);

    h.playback.load(track("a1", 1_000), false).unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;
    assert!(snapshot.allows(PlaybackAction::Play));
    assert!(!h.calls().contains(&PlayerCall::Play));
}

#[tokio::test]
async fn test_stale_ready_signal_is_ignored() {
    let h = Harness::start(false);

    h.playback.load(track("a1", 1_000), false).unwrap();
    h.playback.load(track("a2", 2_000), false).unwrap();
    h.wait_for_call(PlayerCall::Load {
        media_id: "a2".to_string(),
        generation: 2,
    })
    .await;

    h.signals
        .send(PlayerSignal::Ready {
            generation: 1,
            duration_ms: 1_000,
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = h.playback.snapshot();
    assert_eq!(snapshot.status, PlaybackStatus::Buffering);
    assert_eq!(snapshot.media_id.as_deref(), Some("a2"));

    h.signals
        .send(PlayerSignal::Ready {
            generation: 2,
            duration_ms: 2_500,
        })
        .unwrap();
    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;
    assert_eq!(snapshot.duration_ms, 2_500);
}

#[tokio::test]
async fn test_play_with_nothing_to_resume_is_rejected() {
    let h = Harness::start(true);
    let mut events = h.events.subscribe();

    h.playback.play().unwrap();

    let event = next_event(&mut events, |e| matches!(e, PlayerEvent::CommandRejected { .. })).await;
    assert!(matches!(
        event,
        PlayerEvent::CommandRejected {
            reason: RejectReason::NothingToPlay,
            ..
        }
    ));
    assert_eq!(h.playback.snapshot().status, PlaybackStatus::Idle);
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_play_from_idle_resumes_last_track() {
    let h = Harness::with_store(true, MemoryStore::with_track(track("a7", 90_000)));

    h.playback.play().unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;
    assert_eq!(snapshot.media_id.as_deref(), Some("a7"));
    assert_eq!(h.loads(), vec!["a7".to_string()]);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 60_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.playback.pause().unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;

    h.playback.play().unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    let calls = h.calls();
    assert_eq!(calls.iter().filter(|c| **c == PlayerCall::Play).count(), 2);
    assert!(calls.contains(&PlayerCall::Pause));
}

#[tokio::test]
async fn test_stop_resets_position() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 60_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;
    h.playback.seek(30_000).unwrap();
    wait_for_snapshot(&h.playback, |s| s.position_ms == 30_000).await;

    h.playback.stop().unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Stopped)).await;
    assert_eq!(snapshot.position_ms, 0);
    assert!(h.calls().contains(&PlayerCall::Stop));
}

#[tokio::test]
async fn test_transient_focus_loss_pauses_and_resumes() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 60_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.arbiter.interrupt(Interruption::Transient);
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;
    assert!(h.calls().contains(&PlayerCall::Pause));

    h.arbiter.end_interruption();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;
}

#[tokio::test]
async fn test_denied_focus_leaves_track_paused() {
    let h = Harness::start(true);
    let mut events = h.events.subscribe();
    h.arbiter.interrupt(Interruption::Exclusive);

    h.playback.load(track("a1", 60_000), true).unwrap();

    next_event(&mut events, |e| matches!(e, PlayerEvent::FocusDenied { .. })).await;
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;
    assert!(!h.calls().contains(&PlayerCall::Play));
}

#[tokio::test]
async fn test_seek_on_live_stream_is_rejected() {
    let h = Harness::start(true);
    let mut events = h.events.subscribe();
    h.playback.load(track("live", 0), true).unwrap();
    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;
    assert!(snapshot.is_stream());
    assert!(!snapshot.allows(PlaybackAction::SeekTo));
    assert!(!snapshot.allows(PlaybackAction::SkipNext));

    h.playback.seek(5_000).unwrap();

    let event = next_event(&mut events, |e| matches!(e, PlayerEvent::CommandRejected { .. })).await;
    match event {
        PlayerEvent::CommandRejected { command, reason, .. } => {
            assert_eq!(command, "seek");
            assert_eq!(reason, RejectReason::UnboundedStream);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!h.calls().iter().any(|c| matches!(c, PlayerCall::Seek(_))));
}

#[tokio::test]
async fn test_skip_moves_by_interval_and_stops_short_of_end() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 100_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.playback.skip_next().unwrap();
    wait_for_snapshot(&h.playback, |s| s.position_ms == 60_000).await;

    h.playback.skip_next().unwrap();
    wait_for_snapshot(&h.playback, |s| s.position_ms == 99_000).await;

    h.playback.skip_prev().unwrap();
    wait_for_snapshot(&h.playback, |s| s.position_ms == 39_000).await;

    let seeks: Vec<_> = h
        .calls()
        .into_iter()
        .filter(|c| matches!(c, PlayerCall::Seek(_)))
        .collect();
    assert_eq!(
        seeks,
        vec![PlayerCall::Seek(60_000), PlayerCall::Seek(99_000), PlayerCall::Seek(39_000)]
    );
}

#[tokio::test]
async fn test_skip_starts_from_live_player_position() {
    let h = Harness::with_slow_ticker(true);
    h.playback.load(track("a1", 600_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.position.store(30_900, Ordering::SeqCst);
    h.playback.skip_next().unwrap();
    h.wait_for_call(PlayerCall::Seek(90_900)).await;
    wait_for_snapshot(&h.playback, |s| s.position_ms == 90_900).await;
}

#[tokio::test]
async fn test_pause_publishes_live_player_position() {
    let h = Harness::with_slow_ticker(true);
    h.playback.load(track("a1", 600_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.position.store(700, Ordering::SeqCst);
    h.playback.pause().unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Paused)).await;
    assert_eq!(snapshot.position_ms, 700);
    assert_eq!(snapshot.buffered_position_ms, 5_700);
}

#[tokio::test]
async fn test_ticker_publishes_player_position() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 60_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.position.store(12_345, Ordering::SeqCst);

    let snapshot = wait_for_snapshot(&h.playback, |s| s.position_ms == 12_345).await;
    assert_eq!(snapshot.buffered_position_ms, 17_345);
}

#[tokio::test]
async fn test_player_failure_enters_error_until_next_load() {
    let h = Harness::start(false);
    let mut events = h.events.subscribe();
    h.playback.load(track("a1", 60_000), true).unwrap();
    h.wait_for_call(PlayerCall::Load {
        media_id: "a1".to_string(),
        generation: 1,
    })
    .await;

    h.signals
        .send(PlayerSignal::Failed {
            generation: 1,
            message: "HTTP 404".to_string(),
        })
        .unwrap();

    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Error)).await;
    assert_eq!(snapshot.error_message.as_deref(), Some("HTTP 404"));
    next_event(&mut events, |e| matches!(e, PlayerEvent::PlaybackFailed { .. })).await;

    h.playback.play().unwrap();
    let event = next_event(&mut events, |e| matches!(e, PlayerEvent::CommandRejected { .. })).await;
    assert!(matches!(
        event,
        PlayerEvent::CommandRejected {
            reason: RejectReason::InvalidState,
            ..
        }
    ));

    h.playback.load(track("a2", 60_000), false).unwrap();
    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Buffering)).await;
    assert!(snapshot.error_message.is_none());
}

#[tokio::test]
async fn test_end_of_track_stops_and_play_restarts_it() {
    let h = Harness::start(false);
    h.playback.load(track("a1", 5_000), true).unwrap();
    h.wait_for_call(PlayerCall::Load {
        media_id: "a1".to_string(),
        generation: 1,
    })
    .await;
    h.signals
        .send(PlayerSignal::Ready {
            generation: 1,
            duration_ms: 5_000,
        })
        .unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.signals.send(PlayerSignal::Ended { generation: 1 }).unwrap();
    let snapshot = wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Stopped)).await;
    assert_eq!(snapshot.position_ms, 5_000);

    h.playback.play().unwrap();
    h.wait_for_call(PlayerCall::Load {
        media_id: "a1".to_string(),
        generation: 2,
    })
    .await;
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Buffering)).await;
}

#[tokio::test]
async fn test_release_stops_engine() {
    let h = Harness::start(true);
    h.playback.load(track("a1", 60_000), true).unwrap();
    wait_for_snapshot(&h.playback, is_status(PlaybackStatus::Playing)).await;

    h.playback.release().await.unwrap();

    let calls = h.calls();
    assert!(calls.contains(&PlayerCall::Stop));
    assert_eq!(calls.last(), Some(&PlayerCall::Release));

    let playback = h.playback.clone();
    helpers::wait_until(move || !playback.is_running()).await;
    assert!(h.playback.play().is_err());
    // Releasing twice is harmless
    h.playback.release().await.unwrap();
}
