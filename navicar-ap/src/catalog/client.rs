//! Navidrome HTTP client

use super::CatalogError;
use navicar_common::api::{Album, LoginRequest, LoginResponse, Song};
use navicar_common::time::parse_epoch_millis;
use navicar_common::{PlayableTrack, SessionConfig};
use reqwest::{StatusCode, Url};
use std::cmp::Reverse;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subsonic protocol version sent as `v=`
pub const SUBSONIC_API_VERSION: &str = "1.8.0";

const USER_AGENT: &str = concat!("navicar/", env!("CARGO_PKG_VERSION"));
const AUTH_HEADER: &str = "X-ND-Authorization";
const COVER_ART_SIZE: u32 = 300;

/// Credentials the client signs requests with
///
/// Taken from a `SessionConfig` snapshot; fields may be missing before the
/// first login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogCredentials {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub auth_token: Option<String>,
    pub streaming_salt: Option<String>,
    pub streaming_token: Option<String>,
}

impl From<&SessionConfig> for CatalogCredentials {
    fn from(session: &SessionConfig) -> Self {
        Self {
            server_url: session.server_url.clone(),
            username: session.username.clone(),
            auth_token: session.auth_token.clone(),
            streaming_salt: session.streaming_salt.clone(),
            streaming_token: session.streaming_token.clone(),
        }
    }
}

/// Navidrome catalog client
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    credentials: CatalogCredentials,
    client_id: String,
}

impl CatalogClient {
    pub fn new(
        credentials: CatalogCredentials,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http,
            credentials,
            client_id: client_id.into(),
        })
    }

    pub fn credentials(&self) -> &CatalogCredentials {
        &self.credentials
    }

    /// Same connection pool, different credentials
    pub fn with_credentials(&self, credentials: CatalogCredentials) -> Self {
        Self {
            http: self.http.clone(),
            credentials,
            client_id: self.client_id.clone(),
        }
    }

    /// `POST /auth/login`
    ///
    /// Any non-2xx answer is an authentication failure carrying the status
    /// and the server's message. Nothing is retried.
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, CatalogError> {
        let url = endpoint(server_url, "auth/login")?;
        debug!(url = %url, username = %username, "Logging in");

        let response = self
            .http
            .post(url)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!(status = status.as_u16(), "Login rejected: {}", message);
            return Err(CatalogError::Auth(status.as_u16(), message));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        info!(username = %username, "Login succeeded");
        Ok(login)
    }

    /// Albums sorted newest first, or an empty list on any failure
    pub async fn fetch_albums(&self) -> Vec<Album> {
        match self.try_fetch_albums().await {
            Ok(albums) => albums,
            Err(e) => {
                warn!("Album fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    /// `GET /api/album`
    ///
    /// Fills in `cover_art_url` and sorts descending by `created_at`. An
    /// unparsable timestamp sorts as epoch 0; ties keep server order.
    pub async fn try_fetch_albums(&self) -> Result<Vec<Album>, CatalogError> {
        let url = self.api_endpoint("api/album")?;
        let mut albums: Vec<Album> = self.get_json(url).await?;

        for album in &mut albums {
            album.cover_art_url = self.cover_art_url(&album.id);
        }
        sort_albums_newest_first(&mut albums);

        debug!("Fetched {} albums", albums.len());
        Ok(albums)
    }

    /// Songs of an album in track order, or an empty list on any failure
    pub async fn fetch_songs(&self, album_id: &str) -> Vec<Song> {
        match self.try_fetch_songs(album_id).await {
            Ok(songs) => songs,
            Err(e) => {
                warn!(album_id = %album_id, "Song fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    /// `GET /api/song?album_id=…&_sort=trackNumber&_order=ASC`
    pub async fn try_fetch_songs(&self, album_id: &str) -> Result<Vec<Song>, CatalogError> {
        let mut url = self.api_endpoint("api/song")?;
        url.query_pairs_mut()
            .append_pair("album_id", album_id)
            .append_pair("_start", "0")
            .append_pair("_end", "-1")
            .append_pair("_sort", "trackNumber")
            .append_pair("_order", "ASC");

        let mut songs: Vec<Song> = self.get_json(url).await?;
        // The server order is not trusted
        songs.sort_by_key(|song| song.track_number);
        Ok(songs)
    }

    /// Playable track for the first song of an album
    ///
    /// `None` when the album has no songs, streaming credentials are missing,
    /// or the request fails.
    pub async fn resolve_stream_url(&self, album_id: &str) -> Option<PlayableTrack> {
        let songs = self.fetch_songs(album_id).await;
        let first = songs.first()?;
        if first.id.is_empty() {
            return None;
        }
        let uri = self.stream_url(&first.id)?;

        let mut track = PlayableTrack::new(album_id, first.title.clone(), uri)
            .with_duration_ms(first.duration_ms())
            .with_artwork(self.cover_art_url(album_id));
        if !first.artist.is_empty() {
            track = track.with_subtitle(first.artist.clone());
        }
        Some(track)
    }

    /// Like `resolve_stream_url` but titled by the album
    pub async fn resolve_album(&self, album: &Album) -> Option<PlayableTrack> {
        let mut track = self.resolve_stream_url(&album.id).await?;
        track.title = album.name.clone();
        if !album.album_artist.is_empty() {
            track.subtitle = Some(album.album_artist.clone());
        }
        if album.cover_art_url.is_some() {
            track.artwork_url = album.cover_art_url.clone();
        }
        Some(track)
    }

    /// `<server>/rest/stream?u=&t=&s=&v=1.8.0&c=<client>&id=<song>`
    pub fn stream_url(&self, song_id: &str) -> Option<String> {
        let mut url = self.subsonic_endpoint("rest/stream")?;
        url.query_pairs_mut().append_pair("id", song_id);
        Some(url.into())
    }

    /// `<server>/rest/getCoverArt?…&id=al-<album>&size=300`
    pub fn cover_art_url(&self, album_id: &str) -> Option<String> {
        let mut url = self.subsonic_endpoint("rest/getCoverArt")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("al-{}", album_id))
            .append_pair("size", &COVER_ART_SIZE.to_string());
        Some(url.into())
    }

    fn api_endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        let server = self
            .credentials
            .server_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CatalogError::NotConfigured("server_url".to_string()))?;
        endpoint(server, path)
    }

    /// Subsonic endpoint with the shared auth query pairs
    fn subsonic_endpoint(&self, path: &str) -> Option<Url> {
        let creds = &self.credentials;
        let server = creds.server_url.as_deref().filter(|s| !s.is_empty())?;
        let username = creds.username.as_deref()?;
        let token = creds.streaming_token.as_deref()?;
        let salt = creds.streaming_salt.as_deref()?;

        let mut url = endpoint(server, path).ok()?;
        url.query_pairs_mut()
            .append_pair("u", username)
            .append_pair("t", token)
            .append_pair("s", salt)
            .append_pair("v", SUBSONIC_API_VERSION)
            .append_pair("c", &self.client_id);
        Some(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let token = self.credentials.auth_token.as_deref().unwrap_or_default();
        debug!(url = %url, "GET");

        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Auth(status.as_u16(), error_message(response).await));
        }
        if !status.is_success() {
            return Err(CatalogError::Api(status.as_u16(), error_message(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

/// Sort newest first by `created_at`; stable, unparsable as epoch 0
pub(crate) fn sort_albums_newest_first(albums: &mut [Album]) {
    albums.sort_by_key(|album| Reverse(parse_epoch_millis(&album.created_at).unwrap_or(0)));
}

fn endpoint(server_url: &str, path: &str) -> Result<Url, CatalogError> {
    let base = server_url.trim_end_matches('/');
    Url::parse(&format!("{}/{}", base, path))
        .map_err(|e| CatalogError::NotConfigured(format!("invalid server url {:?}: {}", server_url, e)))
}

async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    // Navidrome answers `{"error": "..."}`
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text)
}
