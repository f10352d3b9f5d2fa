//! Car head-unit bridge
//!
//! Exposes a single browsable root whose flat children are the session's
//! albums, each already resolved to a stream URL when the list is built.
//! Stream URLs can go stale between the build and the moment the head unit
//! plays them; `SessionCoordinator::refresh_albums` rebuilds the list.
//!
//! With no albums the root holds one placeholder item pointing at the
//! configured fallback stream.

use crate::catalog::CatalogClient;
use crate::error::{Error, Result};
use crate::playback::{LastTrackStore, PlaybackHandle};
use futures::future::join_all;
use navicar_common::api::Album;
use navicar_common::PlayableTrack;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Id of the browsable root node
pub const BROWSE_ROOT_ID: &str = "root_id";

/// Id of the placeholder item shown when there are no albums
pub const DEFAULT_ITEM_ID: &str = "default_item";

/// One node of the browse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub media_id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub icon_url: Option<String>,
    /// Resolved stream URL; `None` when the album could not be resolved
    pub media_uri: Option<String>,
    pub duration_ms: u64,
    pub browsable: bool,
    pub playable: bool,
}

impl MediaItem {
    fn root() -> Self {
        Self {
            media_id: BROWSE_ROOT_ID.to_string(),
            title: "navicar".to_string(),
            subtitle: None,
            icon_url: None,
            media_uri: None,
            duration_ms: 0,
            browsable: true,
            playable: false,
        }
    }

    fn from_album(album: &Album, resolved: Option<PlayableTrack>) -> Self {
        let (media_uri, duration_ms, artwork) = match resolved {
            Some(track) => (Some(track.stream_uri), track.duration_ms, track.artwork_url),
            None => (None, 0, None),
        };
        Self {
            media_id: album.id.clone(),
            title: album.name.clone(),
            subtitle: Some(album.album_artist.clone()).filter(|a| !a.is_empty()),
            icon_url: album.cover_art_url.clone().or(artwork),
            media_uri,
            duration_ms,
            browsable: false,
            playable: true,
        }
    }

    /// Placeholder for an empty catalog
    pub fn default_item(fallback_stream_url: &str) -> Self {
        Self {
            media_id: DEFAULT_ITEM_ID.to_string(),
            title: "No albums".to_string(),
            subtitle: Some("The list is empty".to_string()),
            icon_url: None,
            media_uri: Some(fallback_stream_url.to_string()),
            duration_ms: 0,
            browsable: false,
            playable: true,
        }
    }

    /// Track to hand to the engine; `None` without a stream URL
    pub fn to_track(&self) -> Option<PlayableTrack> {
        let uri = self.media_uri.clone()?;
        let mut track = PlayableTrack::new(&self.media_id, &self.title, uri)
            .with_duration_ms(self.duration_ms)
            .with_artwork(self.icon_url.clone());
        if let Some(subtitle) = &self.subtitle {
            track = track.with_subtitle(subtitle.clone());
        }
        Some(track)
    }

    /// Seek and skip make sense only for a known length
    pub fn is_live(&self) -> bool {
        self.duration_ms == 0
    }
}

/// Resolve every album concurrently, keeping the album order
pub async fn build_items(albums: &[Album], catalog: &CatalogClient, fallback_stream_url: &str) -> Vec<MediaItem> {
    if albums.is_empty() {
        debug!("No albums; using placeholder item");
        return vec![MediaItem::default_item(fallback_stream_url)];
    }

    let resolved = join_all(albums.iter().map(|album| catalog.resolve_album(album))).await;
    let items: Vec<MediaItem> = albums
        .iter()
        .zip(resolved)
        .map(|(album, track)| MediaItem::from_album(album, track))
        .collect();

    let unresolved = items.iter().filter(|i| i.media_uri.is_none()).count();
    if unresolved > 0 {
        warn!("{} of {} albums have no stream URL", unresolved, items.len());
    }
    items
}

/// Browse tree plus transport controls for a head unit
pub struct CarBridge {
    items: RwLock<Arc<Vec<MediaItem>>>,
    playback: PlaybackHandle,
    last_track: Arc<dyn LastTrackStore>,
}

impl CarBridge {
    /// Bridge with an empty tree; call `build` to populate it
    pub fn new(playback: PlaybackHandle, last_track: Arc<dyn LastTrackStore>) -> Self {
        Self {
            items: RwLock::new(Arc::new(Vec::new())),
            playback,
            last_track,
        }
    }

    /// Resolve `albums` and replace the tree
    pub async fn build(&self, albums: &[Album], catalog: &CatalogClient, fallback_stream_url: &str) -> usize {
        let items = build_items(albums, catalog, fallback_stream_url).await;
        let count = items.len();
        self.replace_items(items);
        info!("Car browse tree built with {} items", count);
        count
    }

    pub fn replace_items(&self, items: Vec<MediaItem>) {
        *self.items.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(items);
    }

    pub fn items(&self) -> Arc<Vec<MediaItem>> {
        Arc::clone(&self.items.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn root(&self) -> MediaItem {
        MediaItem::root()
    }

    /// Children of `parent_id`; only the root has any
    pub fn load_children(&self, parent_id: &str) -> Option<Vec<MediaItem>> {
        if parent_id == BROWSE_ROOT_ID {
            Some(self.items().as_ref().clone())
        } else {
            None
        }
    }

    pub fn item(&self, media_id: &str) -> Option<MediaItem> {
        self.items().iter().find(|i| i.media_id == media_id).cloned()
    }

    /// Load the item with autoplay
    pub fn play_from_media_id(&self, media_id: &str) -> Result<()> {
        let track = self.track_for(media_id)?;
        info!(media_id = %media_id, "Playing from media id");
        self.playback.load(track, true)
    }

    /// Prepare the last played item if still listed, else the first item
    ///
    /// Returns the prepared media id, `None` when the tree is empty.
    pub async fn restore_last_or_default(&self, autoplay: bool) -> Result<Option<String>> {
        let items = self.items();
        let last = match self.last_track.load().await {
            Ok(track) => track.map(|t| t.media_id),
            Err(e) => {
                warn!("Failed to read last played track: {}", e);
                None
            }
        };

        let chosen = last
            .filter(|id| items.iter().any(|i| &i.media_id == id && i.media_uri.is_some()))
            .or_else(|| items.iter().find(|i| i.media_uri.is_some()).map(|i| i.media_id.clone()));

        let Some(media_id) = chosen else {
            warn!("Media item list is empty, cannot prepare player");
            return Ok(None);
        };
        let track = self.track_for(&media_id)?;
        debug!(media_id = %media_id, autoplay, "Restoring playback");
        self.playback.load(track, autoplay)?;
        Ok(Some(media_id))
    }

    pub fn play(&self) -> Result<()> {
        self.playback.play()
    }

    pub fn pause(&self) -> Result<()> {
        self.playback.pause()
    }

    pub fn stop(&self) -> Result<()> {
        self.playback.stop()
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.require_bounded("seek")?;
        self.playback.seek(position_ms)
    }

    pub fn skip_next(&self) -> Result<()> {
        self.require_bounded("skip_next")?;
        self.playback.skip_next()
    }

    pub fn skip_prev(&self) -> Result<()> {
        self.require_bounded("skip_prev")?;
        self.playback.skip_prev()
    }

    fn track_for(&self, media_id: &str) -> Result<PlayableTrack> {
        let item = self
            .item(media_id)
            .ok_or_else(|| Error::NotFound(format!("media item {}", media_id)))?;
        item.to_track()
            .ok_or_else(|| Error::NotFound(format!("stream for media item {}", media_id)))
    }

    fn require_bounded(&self, action: &str) -> Result<()> {
        if self.playback.snapshot().duration_ms == 0 {
            return Err(Error::InvalidState(format!("{} is disabled for live streams", action)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, name: &str) -> Album {
        Album {
            id: id.to_string(),
            name: name.to_string(),
            album_artist: "Artist".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_item_points_at_fallback() {
        let item = MediaItem::default_item("http://radio/stream");
        assert_eq!(item.media_id, DEFAULT_ITEM_ID);
        assert!(item.is_live());
        let track = item.to_track().unwrap();
        assert_eq!(track.stream_uri, "http://radio/stream");
    }

    #[test]
    fn test_unresolved_album_has_no_track() {
        let item = MediaItem::from_album(&album("a1", "One"), None);
        assert!(item.playable);
        assert!(item.to_track().is_none());
    }

    #[test]
    fn test_resolved_album_keeps_album_metadata() {
        let track = PlayableTrack::new("a1", "Song", "http://nd/rest/stream?id=s1").with_duration_ms(1000);
        let item = MediaItem::from_album(&album("a1", "One"), Some(track));

        assert_eq!(item.title, "One");
        assert_eq!(item.subtitle.as_deref(), Some("Artist"));
        assert_eq!(item.media_uri.as_deref(), Some("http://nd/rest/stream?id=s1"));
        assert_eq!(item.to_track().unwrap().duration_ms, 1000);
    }
}
