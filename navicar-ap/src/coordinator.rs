//! Session coordinator
//!
//! Single owner of every write flow that touches session state: account
//! changes, login, logout and catalog refreshes. Flows are serialized by one
//! async mutex so a refresh never interleaves with an account switch.
//! Readers take `SessionManager` snapshots directly and never wait here.

use crate::car::CarBridge;
use crate::catalog::{CatalogClient, CatalogCredentials};
use crate::error::{Error, Result};
use chrono::Utc;
use navicar_common::db::{Account, AccountStore, NewAccount};
use navicar_common::events::{EventBus, PlayerEvent};
use navicar_common::{SessionConfig, SessionManager};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct SessionCoordinator {
    session: SessionManager,
    /// Credential-less client; per-call clients share its connection pool
    base_catalog: CatalogClient,
    car: Arc<CarBridge>,
    events: EventBus,
    fallback_stream_url: String,
    writes: Mutex<()>,
}

impl SessionCoordinator {
    pub fn new(
        session: SessionManager,
        base_catalog: CatalogClient,
        car: Arc<CarBridge>,
        events: EventBus,
        fallback_stream_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            base_catalog,
            car,
            events,
            fallback_stream_url: fallback_stream_url.into(),
            writes: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn accounts(&self) -> &AccountStore {
        self.session.accounts()
    }

    pub fn car(&self) -> &Arc<CarBridge> {
        &self.car
    }

    /// Client signed with the current session snapshot
    pub async fn catalog(&self) -> Result<CatalogClient> {
        let snapshot = self.session.get().await?;
        Ok(self
            .base_catalog
            .with_credentials(CatalogCredentials::from(&snapshot)))
    }

    /// Log in, store the account and make it active
    ///
    /// A second login for the same server and username refreshes the stored
    /// row instead of adding a duplicate. Login failures leave the store
    /// untouched.
    pub async fn add_account(&self, server_url: &str, username: &str, password: &str) -> Result<Account> {
        let server_url = server_url.trim().trim_end_matches('/');
        let username = username.trim();
        if server_url.is_empty() || username.is_empty() {
            return Err(Error::BadRequest("server_url and username are required".to_string()));
        }

        let _guard = self.writes.lock().await;
        let login = self.base_catalog.login(server_url, username, password).await?;

        let accounts = self.session.accounts();
        let id = match accounts.find(server_url, username).await? {
            Some(mut existing) => {
                existing.password = password.to_string();
                existing.auth_token = Some(login.token);
                existing.streaming_salt = login.subsonic_salt;
                existing.streaming_token = login.subsonic_token;
                accounts.update(&existing).await?;
                info!("Refreshed credentials of account {}", existing.id);
                existing.id
            }
            None => {
                accounts
                    .add(NewAccount {
                        auth_token: Some(login.token),
                        streaming_salt: login.subsonic_salt,
                        streaming_token: login.subsonic_token,
                        ..NewAccount::new(server_url, username, password)
                    })
                    .await?
            }
        };

        self.activate_locked(id).await?;
        self.refresh_locked().await?;

        accounts
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))
    }

    /// Make `id` the active account and reload its catalog
    pub async fn switch_account(&self, id: i64) -> Result<SessionConfig> {
        let _guard = self.writes.lock().await;
        let snapshot = self.activate_locked(id).await?;
        self.refresh_locked().await?;
        Ok(snapshot)
    }

    /// Mark `id` as default; like the login screen, this also activates it
    pub async fn set_default_account(&self, id: i64) -> Result<SessionConfig> {
        let _guard = self.writes.lock().await;
        self.session.accounts().set_default(id).await?;
        let snapshot = self.activate_locked(id).await?;
        self.refresh_locked().await?;
        Ok(snapshot)
    }

    /// Delete `id`; removing the active account logs out
    pub async fn remove_account(&self, id: i64) -> Result<()> {
        let _guard = self.writes.lock().await;
        let accounts = self.session.accounts();
        let account = accounts
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))?;

        accounts.delete(id).await?;
        info!("Removed account {}", id);

        if account.is_active {
            self.logout_locked().await?;
        }
        Ok(())
    }

    /// Deactivate every account and wipe the session
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.writes.lock().await;
        self.session.accounts().clear_active().await?;
        self.logout_locked().await
    }

    /// Re-fetch albums, store them in the session and rebuild the car tree
    ///
    /// Fetch failures degrade to an empty catalog, as everywhere else.
    pub async fn refresh_albums(&self) -> Result<usize> {
        let _guard = self.writes.lock().await;
        self.refresh_locked().await
    }

    async fn activate_locked(&self, id: i64) -> Result<SessionConfig> {
        let snapshot = self.session.activate(id).await?;
        info!("Account {} is now active", id);
        self.events.emit_lossy(PlayerEvent::ActiveAccountChanged {
            account_id: Some(id),
            timestamp: Utc::now(),
        });
        Ok(snapshot)
    }

    async fn logout_locked(&self) -> Result<()> {
        self.session.clear().await?;
        self.session.set_sorted_albums(Vec::new()).await?;
        self.car
            .build(&[], &self.base_catalog, &self.fallback_stream_url)
            .await;
        self.events.emit_lossy(PlayerEvent::ActiveAccountChanged {
            account_id: None,
            timestamp: Utc::now(),
        });
        info!("Logged out");
        Ok(())
    }

    async fn refresh_locked(&self) -> Result<usize> {
        let catalog = self.catalog().await?;
        if !catalog.credentials().auth_token.as_deref().is_some_and(|t| !t.is_empty()) {
            warn!("Refreshing albums without an API token");
        }

        let albums = catalog.fetch_albums().await;
        let album_count = albums.len();
        self.session.set_sorted_albums(albums.clone()).await?;
        self.car
            .build(&albums, &catalog, &self.fallback_stream_url)
            .await;

        self.events.emit_lossy(PlayerEvent::CatalogRefreshed {
            album_count,
            timestamp: Utc::now(),
        });
        info!("Catalog refreshed: {} albums", album_count);
        Ok(album_count)
    }
}
