//! Session coordinator and car bridge tests
//!
//! Each test runs against a temp database, a mocked Navidrome server and an
//! engine driving the mock player.

mod helpers;

use helpers::{
    mount_navidrome, next_event, track, wait_for_snapshot, App, Harness, MemoryStore, PlayerCall, FALLBACK_STREAM,
    PASSWORD, USERNAME,
};
use navicar_ap::car::{CarBridge, MediaItem, BROWSE_ROOT_ID, DEFAULT_ITEM_ID};
use navicar_ap::catalog::CatalogError;
use navicar_ap::playback::LastTrackStore;
use navicar_ap::Error;
use navicar_common::events::{PlaybackStatus, PlayerEvent};
use std::sync::Arc;
use wiremock::MockServer;

async fn navidrome() -> MockServer {
    let server = MockServer::start().await;
    mount_navidrome(&server).await;
    server
}

#[tokio::test]
async fn test_add_account_activates_and_loads_catalog() {
    let server = navidrome().await;
    let app = App::start().await;
    let mut events = app.harness.events.subscribe();

    let account = app
        .coordinator
        .add_account(&format!("{}/", server.uri()), USERNAME, PASSWORD)
        .await
        .unwrap();

    assert!(account.is_active);
    assert_eq!(account.server_url, server.uri());
    assert_eq!(account.auth_token.as_deref(), Some("jwt-alice"));

    let session = app.coordinator.session().get().await.unwrap();
    assert_eq!(session.username.as_deref(), Some(USERNAME));
    let ids: Vec<_> = session.sorted_albums.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a1"]);

    let items = app.car.load_children(BROWSE_ROOT_ID).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].media_id, "a2");
    assert!(items[0].media_uri.as_deref().unwrap().ends_with("id=s21"));
    assert_eq!(items[1].duration_ms, 180_500);

    let changed = next_event(&mut events, |e| matches!(e, PlayerEvent::ActiveAccountChanged { .. })).await;
    assert!(matches!(
        changed,
        PlayerEvent::ActiveAccountChanged {
            account_id: Some(id),
            ..
        } if id == account.id
    ));
    let refreshed = next_event(&mut events, |e| matches!(e, PlayerEvent::CatalogRefreshed { .. })).await;
    assert!(matches!(refreshed, PlayerEvent::CatalogRefreshed { album_count: 2, .. }));
}

#[tokio::test]
async fn test_second_login_updates_existing_account() {
    let server = navidrome().await;
    let app = App::start().await;

    let first = app.coordinator.add_account(&server.uri(), USERNAME, PASSWORD).await.unwrap();
    let second = app
        .coordinator
        .add_account(&format!(" {} ", server.uri()), USERNAME, PASSWORD)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(app.coordinator.accounts().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_login_stores_nothing() {
    let server = navidrome().await;
    let app = App::start().await;

    let err = app
        .coordinator
        .add_account(&server.uri(), USERNAME, "wrong")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Catalog(CatalogError::Auth(401, _))));
    assert!(app.coordinator.accounts().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_fields_are_bad_request() {
    let app = App::start().await;
    let err = app.coordinator.add_account("  ", USERNAME, PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_logout_clears_session_and_shows_placeholder() {
    let server = navidrome().await;
    let app = App::start().await;
    app.coordinator.add_account(&server.uri(), USERNAME, PASSWORD).await.unwrap();

    app.coordinator.logout().await.unwrap();

    let session = app.coordinator.session().get().await.unwrap();
    assert!(session.server_url.is_none());
    assert!(session.sorted_albums.is_empty());
    assert!(app.coordinator.accounts().get_active().await.unwrap().is_none());
    // The account itself is kept
    assert_eq!(app.coordinator.accounts().list().await.unwrap().len(), 1);

    let items = app.car.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].media_id, DEFAULT_ITEM_ID);
    assert_eq!(items[0].media_uri.as_deref(), Some(FALLBACK_STREAM));
}

#[tokio::test]
async fn test_removing_active_account_logs_out() {
    let server = navidrome().await;
    let app = App::start().await;
    let account = app.coordinator.add_account(&server.uri(), USERNAME, PASSWORD).await.unwrap();

    app.coordinator.remove_account(account.id).await.unwrap();

    assert!(app.coordinator.accounts().list().await.unwrap().is_empty());
    assert!(app.coordinator.session().sorted_albums().await.is_empty());
    assert_eq!(app.car.items()[0].media_id, DEFAULT_ITEM_ID);

    let err = app.coordinator.remove_account(account.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_switch_between_servers() {
    let first = navidrome().await;
    let second = MockServer::start().await;
    helpers::mount_navidrome(&second).await;
    let app = App::start().await;

    let a = app.coordinator.add_account(&first.uri(), USERNAME, PASSWORD).await.unwrap();
    let b = app.coordinator.add_account(&second.uri(), USERNAME, PASSWORD).await.unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(
        app.coordinator.session().get().await.unwrap().server_url,
        Some(second.uri())
    );

    let snapshot = app.coordinator.switch_account(a.id).await.unwrap();
    assert_eq!(snapshot.server_url, Some(first.uri()));
    let active = app.coordinator.accounts().get_active().await.unwrap().unwrap();
    assert_eq!(active.id, a.id);
    assert!(app.car.items()[0].media_uri.as_deref().unwrap().starts_with(&first.uri()));

    app.coordinator.set_default_account(b.id).await.unwrap();
    let default = app.coordinator.accounts().get_default().await.unwrap().unwrap();
    assert_eq!(default.id, b.id);
    assert!(default.is_active);
}

#[tokio::test]
async fn test_refresh_without_account_uses_placeholder() {
    let app = App::start().await;
    assert_eq!(app.coordinator.refresh_albums().await.unwrap(), 0);
    assert_eq!(app.car.items()[0].media_id, DEFAULT_ITEM_ID);
}

// ========================================
// Car bridge
// ========================================

fn bridge_with(harness: &Harness, items: Vec<MediaItem>) -> CarBridge {
    let bridge = CarBridge::new(
        harness.playback.clone(),
        Arc::clone(&harness.store) as Arc<dyn LastTrackStore>,
    );
    bridge.replace_items(items);
    bridge
}

fn item(media_id: &str, duration_ms: u64) -> MediaItem {
    MediaItem {
        media_id: media_id.to_string(),
        title: format!("Album {}", media_id),
        subtitle: Some("Band".to_string()),
        icon_url: None,
        media_uri: Some(format!("http://nd/rest/stream?id={}", media_id)),
        duration_ms,
        browsable: false,
        playable: true,
    }
}

#[tokio::test]
async fn test_only_root_has_children() {
    let harness = Harness::start(true);
    let bridge = bridge_with(&harness, vec![item("a1", 1_000)]);

    assert!(bridge.root().browsable);
    assert_eq!(bridge.load_children(BROWSE_ROOT_ID).unwrap().len(), 1);
    assert!(bridge.load_children("a1").is_none());
}

#[tokio::test]
async fn test_play_from_media_id_autoplays() {
    let harness = Harness::start(true);
    let bridge = bridge_with(&harness, vec![item("a1", 1_000), item("a2", 2_000)]);

    bridge.play_from_media_id("a2").unwrap();

    let snapshot = wait_for_snapshot(&harness.playback, |s| s.status == PlaybackStatus::Playing).await;
    assert_eq!(snapshot.media_id.as_deref(), Some("a2"));
    assert!(matches!(bridge.play_from_media_id("zz"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_restore_prefers_last_played_item() {
    let harness = Harness::with_store(true, MemoryStore::with_track(track("a2", 2_000)));
    let bridge = bridge_with(&harness, vec![item("a1", 1_000), item("a2", 2_000)]);

    let restored = bridge.restore_last_or_default(false).await.unwrap();

    assert_eq!(restored.as_deref(), Some("a2"));
    let snapshot = wait_for_snapshot(&harness.playback, |s| s.status == PlaybackStatus::Paused).await;
    assert_eq!(snapshot.media_id.as_deref(), Some("a2"));
    assert!(!harness.calls().contains(&PlayerCall::Play));
}

#[tokio::test]
async fn test_restore_falls_back_to_first_item() {
    let harness = Harness::with_store(true, MemoryStore::with_track(track("gone", 2_000)));
    let bridge = bridge_with(&harness, vec![item("a1", 1_000), item("a2", 2_000)]);

    let restored = bridge.restore_last_or_default(true).await.unwrap();

    assert_eq!(restored.as_deref(), Some("a1"));
    wait_for_snapshot(&harness.playback, |s| s.status == PlaybackStatus::Playing).await;
}

#[tokio::test]
async fn test_restore_with_empty_tree_does_nothing() {
    let harness = Harness::start(true);
    let bridge = bridge_with(&harness, Vec::new());

    assert!(bridge.restore_last_or_default(true).await.unwrap().is_none());
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn test_live_item_disables_seek_and_skip() {
    let harness = Harness::start(true);
    let bridge = bridge_with(&harness, vec![MediaItem::default_item(FALLBACK_STREAM)]);

    bridge.play_from_media_id(DEFAULT_ITEM_ID).unwrap();
    wait_for_snapshot(&harness.playback, |s| s.status == PlaybackStatus::Playing).await;

    assert!(matches!(bridge.seek(1_000), Err(Error::InvalidState(_))));
    assert!(matches!(bridge.skip_next(), Err(Error::InvalidState(_))));
    assert!(matches!(bridge.skip_prev(), Err(Error::InvalidState(_))));

    bridge.pause().unwrap();
    wait_for_snapshot(&harness.playback, |s| s.status == PlaybackStatus::Paused).await;
}
