//! Configuration management for navicar-ap
//!
//! Two tiers:
//! 1. **Bootstrap**: TOML file plus command-line/env overrides. Root folder,
//!    database path, port, client id, log filter. Fixed for the process.
//! 2. **Runtime**: the `settings` table. Missing rows are seeded with
//!    built-in defaults by `init_database`; values here are read once at
//!    startup and may be overridden by the TOML `[playback]` section.
//!
//! # Priority
//!
//! 1. Command-line arguments (--port, --root-folder)
//! 2. Environment variable (NAVICAR_ROOT_FOLDER)
//! 3. TOML configuration file
//! 4. Database settings table
//! 5. Built-in defaults

use crate::error::Result;
use crate::playback::machine::{DEFAULT_SKIP_INTERVAL_MS, DEFAULT_SKIP_MARGIN_MS};
use crate::playback::{EngineSettings, MachineSettings};
use navicar_common::config::{resolve_root_folder, PlaybackOverrides, TomlConfig};
use navicar_common::db::settings::{get_raw, get_setting_or};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Command-line overrides for the bootstrap tier
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Bootstrap configuration after applying overrides
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub port: u16,
    pub client_id: String,
    pub fallback_stream_url: String,
    pub log_filter: String,
    pub playback: PlaybackOverrides,
}

impl Bootstrap {
    /// Read the TOML file (if any) and apply `overrides`
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml = TomlConfig::load(overrides.config_path.as_deref())?;
        Ok(Self::from_toml(toml, overrides))
    }

    pub fn from_toml(toml: TomlConfig, overrides: &ConfigOverrides) -> Self {
        let root_folder = resolve_root_folder(overrides.root_folder.as_deref(), &toml);
        let database_path = toml.database_path_in(&root_folder);

        Self {
            root_folder,
            database_path,
            port: overrides.port.unwrap_or(toml.port),
            client_id: toml.client_id,
            fallback_stream_url: toml.fallback_stream_url,
            log_filter: toml.logging.filter,
            playback: toml.playback,
        }
    }
}

/// Runtime settings loaded from the `settings` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub position_interval_ms: u64,
    pub skip_interval_ms: u64,
    pub skip_margin_ms: u64,
    /// Start playing the restored track at startup instead of pausing
    pub autoplay_on_restore: bool,
    pub http_request_timeout_ms: u64,
    pub event_bus_capacity: usize,
    /// Output device name; `None` uses the system default
    pub audio_device: Option<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            position_interval_ms: 1000,
            skip_interval_ms: DEFAULT_SKIP_INTERVAL_MS,
            skip_margin_ms: DEFAULT_SKIP_MARGIN_MS,
            autoplay_on_restore: false,
            http_request_timeout_ms: 30_000,
            event_bus_capacity: 100,
            audio_device: None,
        }
    }
}

impl RuntimeSettings {
    /// Load every runtime setting, falling back to the built-in defaults
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            position_interval_ms: get_setting_or(db, "position_interval_ms", defaults.position_interval_ms).await?,
            skip_interval_ms: get_setting_or(db, "skip_interval_ms", defaults.skip_interval_ms).await?,
            skip_margin_ms: get_setting_or(db, "skip_margin_ms", defaults.skip_margin_ms).await?,
            autoplay_on_restore: get_setting_or(db, "autoplay_on_restore", defaults.autoplay_on_restore).await?,
            http_request_timeout_ms: get_setting_or(db, "http_request_timeout_ms", defaults.http_request_timeout_ms)
                .await?,
            event_bus_capacity: get_setting_or(db, "event_bus_capacity", defaults.event_bus_capacity).await?,
            audio_device: get_raw(db, "audio_device").await?.filter(|d| !d.is_empty()),
        };

        info!("Loaded runtime settings from database");
        Ok(settings)
    }

    /// Apply the TOML `[playback]` overrides
    pub fn with_overrides(mut self, overrides: &PlaybackOverrides) -> Self {
        if let Some(ms) = overrides.position_interval_ms {
            self.position_interval_ms = ms;
        }
        if let Some(ms) = overrides.skip_interval_ms {
            self.skip_interval_ms = ms;
        }
        if let Some(ms) = overrides.skip_margin_ms {
            self.skip_margin_ms = ms;
        }
        self
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            machine: MachineSettings {
                skip_interval_ms: self.skip_interval_ms,
                skip_margin_ms: self.skip_margin_ms,
            },
            // A zero period would spin the ticker
            position_interval: Duration::from_millis(self.position_interval_ms.max(10)),
        }
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_millis(self.http_request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navicar_common::db::init_database;
    use navicar_common::db::settings::set_setting;
    use serial_test::serial;

    #[tokio::test]
    async fn test_load_seeded_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("t.db")).await.unwrap();

        let settings = RuntimeSettings::load(&pool).await.unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[tokio::test]
    async fn test_load_stored_values_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("t.db")).await.unwrap();
        set_setting(&pool, "skip_interval_ms", 30_000u64).await.unwrap();
        set_setting(&pool, "autoplay_on_restore", true).await.unwrap();
        set_setting(&pool, "audio_device", "hw:1").await.unwrap();

        let overrides = PlaybackOverrides {
            position_interval_ms: Some(250),
            ..Default::default()
        };
        let settings = RuntimeSettings::load(&pool).await.unwrap().with_overrides(&overrides);

        assert_eq!(settings.skip_interval_ms, 30_000);
        assert!(settings.autoplay_on_restore);
        assert_eq!(settings.audio_device.as_deref(), Some("hw:1"));

        let engine = settings.engine_settings();
        assert_eq!(engine.position_interval, Duration::from_millis(250));
        assert_eq!(engine.machine.skip_interval_ms, 30_000);
        assert_eq!(engine.machine.skip_margin_ms, 1000);
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("t.db")).await.unwrap();
        set_setting(&pool, "skip_margin_ms", "soon").await.unwrap();

        assert!(RuntimeSettings::load(&pool).await.is_err());
    }

    #[test]
    #[serial]
    fn test_bootstrap_cli_overrides_win() {
        let toml = TomlConfig::from_toml_str(
            r#"
            root_folder = "/srv/navicar"
            port = 6000
            client_id = "dash"
            "#,
        )
        .unwrap();
        let overrides = ConfigOverrides {
            config_path: None,
            root_folder: Some(PathBuf::from("/tmp/car")),
            port: Some(7000),
        };

        let bootstrap = Bootstrap::from_toml(toml, &overrides);
        assert_eq!(bootstrap.root_folder, PathBuf::from("/tmp/car"));
        assert_eq!(bootstrap.database_path, PathBuf::from("/tmp/car/navicar.db"));
        assert_eq!(bootstrap.port, 7000);
        assert_eq!(bootstrap.client_id, "dash");
    }

    #[test]
    #[serial]
    fn test_bootstrap_env_root_beats_toml() {
        let toml = TomlConfig::from_toml_str(r#"root_folder = "/srv/navicar""#).unwrap();

        std::env::set_var("NAVICAR_ROOT_FOLDER", "/from/env");
        let bootstrap = Bootstrap::from_toml(toml, &ConfigOverrides::default());
        std::env::remove_var("NAVICAR_ROOT_FOLDER");

        assert_eq!(bootstrap.root_folder, PathBuf::from("/from/env"));
        assert_eq!(bootstrap.database_path, PathBuf::from("/from/env/navicar.db"));
    }
}
