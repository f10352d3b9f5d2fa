//! Foreground playback host
//!
//! Thin lifecycle adapter around the engine: `start` loads a track with
//! autoplay and immediately shows a persistent "now playing" notification,
//! which then follows the engine's snapshots. `destroy` releases the player
//! and removes the notification. All playback state stays in the engine.

use crate::error::Result;
use crate::playback::PlaybackHandle;
use navicar_common::events::{PlaybackSnapshot, PlaybackStatus};
use navicar_common::PlayableTrack;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const APP_NAME: &str = "navicar";

/// Text of the persistent notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

impl NotificationContent {
    /// Shown right after `start`, before the engine has published
    pub fn loading(track: &PlayableTrack) -> Self {
        Self {
            title: track.title.clone(),
            body: with_status(track.subtitle.as_deref(), "Buffering"),
        }
    }

    pub fn from_snapshot(snapshot: &PlaybackSnapshot) -> Self {
        let status = match snapshot.status {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Buffering => "Buffering",
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Idle => "Idle",
            PlaybackStatus::Error => snapshot.error_message.as_deref().unwrap_or("Playback error"),
        };
        Self {
            title: snapshot.title.clone().unwrap_or_else(|| APP_NAME.to_string()),
            body: with_status(snapshot.subtitle.as_deref(), status),
        }
    }
}

fn with_status(subtitle: Option<&str>, status: &str) -> String {
    match subtitle.filter(|s| !s.is_empty()) {
        Some(artist) => format!("{} · {}", artist, status),
        None => status.to_string(),
    }
}

/// Persistent notification surface
///
/// `show` creates the notification or replaces the text of the one
/// already shown.
pub trait Notifier: Send + Sync {
    fn show(&self, content: &NotificationContent);
    fn close(&self);
}

/// Notifier that only logs; used where no notification daemon exists
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, content: &NotificationContent) {
        info!(title = %content.title, "Now playing: {}", content.body);
    }

    fn close(&self) {
        debug!("Now playing notification closed");
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
pub use desktop::DesktopNotifier;

#[cfg(all(unix, not(target_os = "macos")))]
mod desktop {
    use super::{NotificationContent, Notifier, APP_NAME};
    use notify_rust::{Hint, Notification, NotificationHandle, Timeout};
    use std::sync::Mutex;
    use tracing::warn;

    /// freedesktop notification via notify-rust
    #[derive(Default)]
    pub struct DesktopNotifier {
        handle: Mutex<Option<NotificationHandle>>,
    }

    impl DesktopNotifier {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Notifier for DesktopNotifier {
        fn show(&self, content: &NotificationContent) {
            let mut slot = self.handle.lock().unwrap_or_else(|p| p.into_inner());

            if let Some(handle) = slot.as_mut() {
                handle.summary(&content.title).body(&content.body);
                handle.update();
                return;
            }

            let mut notification = Notification::new();
            notification
                .appname(APP_NAME)
                .summary(&content.title)
                .body(&content.body)
                .hint(Hint::Resident(true))
                .timeout(Timeout::Never);

            match notification.show() {
                Ok(handle) => *slot = Some(handle),
                Err(e) => warn!("Error showing notification: {}", e),
            }
        }

        fn close(&self) {
            let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
            if let Some(handle) = handle {
                handle.close();
            }
        }
    }
}

/// Platform notifier: desktop notifications where available, logging elsewhere
pub fn default_notifier() -> Arc<dyn Notifier> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Arc::new(DesktopNotifier::new())
    }
    #[cfg(not(all(unix, not(target_os = "macos"))))]
    {
        Arc::new(LogNotifier)
    }
}

/// Keeps playback in the foreground while a track is active
pub struct PlaybackHost {
    playback: PlaybackHandle,
    notifier: Arc<dyn Notifier>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackHost {
    pub fn new(playback: PlaybackHandle, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            playback,
            notifier,
            watcher: Mutex::new(None),
        }
    }

    /// Load `track` with autoplay and promote to the foreground
    pub fn start(&self, track: PlayableTrack) -> Result<()> {
        let content = NotificationContent::loading(&track);
        self.playback.load(track, true)?;
        self.notifier.show(&content);
        self.ensure_watcher();
        Ok(())
    }

    /// Release the player and remove the notification
    pub async fn destroy(&self) -> Result<()> {
        if let Some(task) = self.watcher().take() {
            task.abort();
        }
        self.playback.release().await?;
        self.notifier.close();
        info!("Playback host destroyed");
        Ok(())
    }

    fn ensure_watcher(&self) {
        let mut watcher = self.watcher();
        if watcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut snapshots = self.playback.subscribe();
        let notifier = Arc::clone(&self.notifier);
        *watcher = Some(tokio::spawn(async move {
            let mut shown: Option<NotificationContent> = None;
            // The current value is treated as already seen
            snapshots.borrow_and_update();
            while snapshots.changed().await.is_ok() {
                let content = NotificationContent::from_snapshot(&snapshots.borrow_and_update());
                if shown.as_ref() != Some(&content) {
                    notifier.show(&content);
                    shown = Some(content);
                }
            }
            debug!("Notification watcher finished");
        }));
    }

    fn watcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for PlaybackHost {
    fn drop(&mut self) {
        if let Some(task) = self.watcher().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(status: PlaybackStatus) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status,
            title: Some("Kind of Blue".to_string()),
            subtitle: Some("Miles Davis".to_string()),
            updated_at: Utc::now(),
            ..PlaybackSnapshot::idle()
        }
    }

    #[test]
    fn test_content_follows_status() {
        let playing = NotificationContent::from_snapshot(&snapshot(PlaybackStatus::Playing));
        assert_eq!(playing.title, "Kind of Blue");
        assert_eq!(playing.body, "Miles Davis · Playing");

        let paused = NotificationContent::from_snapshot(&snapshot(PlaybackStatus::Paused));
        assert_eq!(paused.body, "Miles Davis · Paused");
    }

    #[test]
    fn test_content_without_track() {
        let content = NotificationContent::from_snapshot(&PlaybackSnapshot::idle());
        assert_eq!(content.title, "navicar");
        assert_eq!(content.body, "Idle");
    }

    #[test]
    fn test_loading_content() {
        let track = PlayableTrack::new("al-1", "Giant Steps", "http://nd/stream");
        let content = NotificationContent::loading(&track);
        assert_eq!(content.body, "Buffering");
    }
}
