//! Session configuration
//!
//! The server URL, username and tokens the catalog client needs, plus the
//! sorted album list. Readers get an immutable `SessionConfig` snapshot; the
//! manager rebuilds the snapshot from the active account on every `get()`.
//!
//! Credential fields are mirrored into the `settings` table under the legacy
//! single-account keys so older installs keep working.

use crate::api::Album;
use crate::db::settings::{delete_setting, get_raw, set_setting};
use crate::db::{Account, AccountStore, NewAccount};
use crate::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const SERVER_URL_KEY: &str = "server_url";
pub const USERNAME_KEY: &str = "username";
pub const SUBSONIC_SALT_KEY: &str = "subsonic_salt";
pub const SUBSONIC_TOKEN_KEY: &str = "subsonic_token";
pub const ACTIVE_ACCOUNT_ID_KEY: &str = "active_account_id";
pub const SORTED_ALBUMS_COUNT_KEY: &str = "sorted_albums_count";

const LEGACY_CREDENTIAL_KEYS: [&str; 5] = [
    AUTH_TOKEN_KEY,
    SUBSONIC_SALT_KEY,
    SUBSONIC_TOKEN_KEY,
    SERVER_URL_KEY,
    USERNAME_KEY,
];

/// Immutable snapshot of the current session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub auth_token: Option<String>,
    pub streaming_salt: Option<String>,
    pub streaming_token: Option<String>,
    pub sorted_albums: Arc<Vec<Album>>,
}

impl SessionConfig {
    /// True when the native API can be called
    pub fn has_api_credentials(&self) -> bool {
        non_empty(&self.server_url) && non_empty(&self.auth_token)
    }

    /// True when stream and cover-art URLs can be built
    pub fn has_streaming_credentials(&self) -> bool {
        non_empty(&self.server_url)
            && non_empty(&self.username)
            && non_empty(&self.streaming_salt)
            && non_empty(&self.streaming_token)
    }

    fn apply_account(&mut self, account: &Account) {
        self.server_url = Some(account.server_url.clone());
        self.username = Some(account.username.clone());
        self.auth_token = account.auth_token.clone();
        self.streaming_salt = account.streaming_salt.clone();
        self.streaming_token = account.streaming_token.clone();
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Partial update of the session credentials
///
/// `None` and empty strings leave the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub auth_token: Option<String>,
    pub streaming_salt: Option<String>,
    pub streaming_token: Option<String>,
}

/// Owner of the session snapshot
#[derive(Clone)]
pub struct SessionManager {
    accounts: AccountStore,
    current: Arc<RwLock<SessionConfig>>,
}

impl SessionManager {
    pub fn new(accounts: AccountStore) -> Self {
        Self {
            accounts,
            current: Arc::new(RwLock::new(SessionConfig::default())),
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Current snapshot, refreshed from the active account
    ///
    /// With no active account the previous credential values are kept.
    pub async fn get(&self) -> Result<SessionConfig> {
        let active = self.accounts.get_active().await?;
        let mut current = self.current.write().await;
        if let Some(account) = active {
            current.apply_account(&account);
        }
        Ok(current.clone())
    }

    /// Snapshot without touching the database
    pub async fn cached(&self) -> SessionConfig {
        self.current.read().await.clone()
    }

    /// Merge the non-empty patch fields and mirror them to the legacy keys
    pub async fn update(&self, patch: SessionPatch) -> Result<SessionConfig> {
        let db = self.accounts.pool();
        let mut current = self.current.write().await;

        let fields = [
            (patch.server_url, SERVER_URL_KEY),
            (patch.username, USERNAME_KEY),
            (patch.auth_token, AUTH_TOKEN_KEY),
            (patch.streaming_salt, SUBSONIC_SALT_KEY),
            (patch.streaming_token, SUBSONIC_TOKEN_KEY),
        ];

        for (value, key) in fields {
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            set_setting(db, key, &value).await?;
            let slot = match key {
                SERVER_URL_KEY => &mut current.server_url,
                USERNAME_KEY => &mut current.username,
                AUTH_TOKEN_KEY => &mut current.auth_token,
                SUBSONIC_SALT_KEY => &mut current.streaming_salt,
                _ => &mut current.streaming_token,
            };
            *slot = Some(value);
        }

        debug!("Session updated");
        Ok(current.clone())
    }

    /// Wipe every field, the album list and the mirrored keys
    pub async fn clear(&self) -> Result<()> {
        let db = self.accounts.pool();
        let mut current = self.current.write().await;

        for key in LEGACY_CREDENTIAL_KEYS {
            delete_setting(db, key).await?;
        }
        delete_setting(db, ACTIVE_ACCOUNT_ID_KEY).await?;

        *current = SessionConfig::default();
        info!("Session cleared");
        Ok(())
    }

    /// Make `id` the active account and load it into the session
    pub async fn activate(&self, id: i64) -> Result<SessionConfig> {
        self.accounts.set_active(id).await?;
        set_setting(self.accounts.pool(), ACTIVE_ACCOUNT_ID_KEY, id).await?;
        self.get().await
    }

    pub async fn set_sorted_albums(&self, albums: Vec<Album>) -> Result<()> {
        let count = albums.len();
        self.current.write().await.sorted_albums = Arc::new(albums);
        set_setting(self.accounts.pool(), SORTED_ALBUMS_COUNT_KEY, count).await?;
        Ok(())
    }

    pub async fn sorted_albums(&self) -> Arc<Vec<Album>> {
        self.current.read().await.sorted_albums.clone()
    }

    /// Import pre-account-store credentials
    ///
    /// Needs `auth_token`, `server_url` and `username`. An existing account
    /// with the same server and username gets its tokens refreshed instead
    /// of a duplicate row. The legacy keys are removed afterwards. Returns
    /// the id of the imported or refreshed account.
    pub async fn migrate_legacy_credentials(&self) -> Result<Option<i64>> {
        let db = self.accounts.pool();

        let auth_token = get_raw(db, AUTH_TOKEN_KEY).await?.filter(|v| !v.is_empty());
        let server_url = get_raw(db, SERVER_URL_KEY).await?.filter(|v| !v.is_empty());
        let username = get_raw(db, USERNAME_KEY).await?.filter(|v| !v.is_empty());

        let (Some(auth_token), Some(server_url), Some(username)) = (auth_token, server_url, username)
        else {
            return Ok(None);
        };

        let streaming_salt = get_raw(db, SUBSONIC_SALT_KEY).await?;
        let streaming_token = get_raw(db, SUBSONIC_TOKEN_KEY).await?;

        let id = match self.accounts.find(&server_url, &username).await? {
            Some(mut existing) => {
                existing.auth_token = Some(auth_token);
                existing.streaming_salt = streaming_salt.or(existing.streaming_salt);
                existing.streaming_token = streaming_token.or(existing.streaming_token);
                self.accounts.update(&existing).await?;
                debug!("Legacy credentials refreshed account {}", existing.id);
                existing.id
            }
            None => {
                let id = self
                    .accounts
                    .add(NewAccount {
                        server_url,
                        username,
                        // never stored by the single-account layout
                        password: String::new(),
                        auth_token: Some(auth_token),
                        streaming_salt,
                        streaming_token,
                        is_active: false,
                        is_default: false,
                    })
                    .await?;
                info!("Imported legacy credentials as account {}", id);
                id
            }
        };

        self.accounts.set_active(id).await?;

        for key in LEGACY_CREDENTIAL_KEYS {
            delete_setting(db, key).await?;
        }

        Ok(Some(id))
    }

    /// Activate the default account when nothing is active
    ///
    /// Returns the id that was activated, if any.
    pub async fn select_startup_account(&self) -> Result<Option<i64>> {
        if self.accounts.get_active().await?.is_some() {
            return Ok(None);
        }
        match self.accounts.get_default().await? {
            Some(default) => {
                self.accounts.set_active(default.id).await?;
                info!("Activated default account {} at startup", default.id);
                Ok(Some(default.id))
            }
            None => Ok(None),
        }
    }
}
