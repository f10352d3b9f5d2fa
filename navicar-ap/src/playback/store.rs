//! Last-played track persistence
//!
//! The engine remembers the last successfully loaded track so a bare "play"
//! after a restart can resume it.

use async_trait::async_trait;
use navicar_common::db::settings::{get_raw, set_setting};
use navicar_common::{PlayableTrack, Result};
use sqlx::SqlitePool;
use tracing::warn;

/// Settings key holding the serialized track
pub const LAST_TRACK_KEY: &str = "last_played_track";

/// Settings key holding only the media id
pub const LAST_MEDIA_ID_KEY: &str = "last_media_id";

#[async_trait]
pub trait LastTrackStore: Send + Sync {
    async fn save(&self, track: &PlayableTrack) -> Result<()>;
    async fn load(&self) -> Result<Option<PlayableTrack>>;
}

/// `LastTrackStore` backed by the settings table
#[derive(Clone)]
pub struct SqliteLastTrackStore {
    db: SqlitePool,
}

impl SqliteLastTrackStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Media id of the last track, if any
    pub async fn last_media_id(&self) -> Result<Option<String>> {
        get_raw(&self.db, LAST_MEDIA_ID_KEY).await
    }
}

#[async_trait]
impl LastTrackStore for SqliteLastTrackStore {
    async fn save(&self, track: &PlayableTrack) -> Result<()> {
        let json = serde_json::to_string(track)
            .map_err(|e| navicar_common::Error::Internal(e.to_string()))?;

        let mut tx = self.db.begin().await?;
        set_setting(&mut *tx, LAST_TRACK_KEY, json).await?;
        set_setting(&mut *tx, LAST_MEDIA_ID_KEY, &track.media_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<PlayableTrack>> {
        let Some(json) = get_raw(&self.db, LAST_TRACK_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(track) => Ok(Some(track)),
            Err(e) => {
                warn!("Ignoring unreadable last track: {}", e);
                Ok(None)
            }
        }
    }
}
