//! Bootstrap configuration loading and root folder resolution
//!
//! The TOML file is optional and minimal: it only covers what must be known
//! before the database is open. Everything else lives in the `settings`
//! table (see `db::settings`).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "NAVICAR_ROOT_FOLDER";

/// Default control API port
pub const DEFAULT_PORT: u16 = 5740;

/// Client identifier sent as `c=` on Subsonic URLs
pub const DEFAULT_CLIENT_ID: &str = "navicar";

/// Stream played when the catalog is empty
pub const DEFAULT_FALLBACK_STREAM_URL: &str = "http://streams.90s90s.de/techno/mp3-192/";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Path to SQLite database file; relative paths resolve against the
    /// root folder
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Control API port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier for stream and cover-art URLs
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Stream used by the car bridge placeholder item
    #[serde(default = "default_fallback_stream_url")]
    pub fallback_stream_url: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Overrides for the runtime playback settings
    #[serde(default)]
    pub playback: PlaybackOverrides,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Optional overrides for the playback intervals
///
/// Unset fields fall through to the `settings` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaybackOverrides {
    pub position_interval_ms: Option<u64>,
    pub skip_interval_ms: Option<u64>,
    pub skip_margin_ms: Option<u64>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: default_database_path(),
            port: default_port(),
            client_id: default_client_id(),
            fallback_stream_url: default_fallback_stream_url(),
            logging: LoggingConfig::default(),
            playback: PlaybackOverrides::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("navicar.db")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_fallback_stream_url() -> String {
    DEFAULT_FALLBACK_STREAM_URL.to_string()
}

fn default_log_filter() -> String {
    "navicar_ap=debug,navicar_common=info".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from an explicit path, or the platform default
    ///
    /// A missing file yields the built-in defaults. A file that exists but
    /// cannot be parsed is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file(),
        };

        let Some(path) = path else {
            debug!("No config file location; using defaults");
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                info!("Loaded TOML configuration from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit.is_some() {
                    warn!("Config file {:?} not found; using defaults", path);
                } else {
                    debug!("Config file {:?} not found; using defaults", path);
                }
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!(
                "Failed to read config file {:?}: {}",
                path, e
            ))),
        }
    }

    /// Database path, resolved against `root` when relative
    pub fn database_path_in(&self, root: &Path) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            root.join(&self.database_path)
        }
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable (`NAVICAR_ROOT_FOLDER`)
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Platform config file location (`<config_dir>/navicar/config.toml`)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("navicar").join("config.toml"))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/navicar
        dirs::data_local_dir()
            .map(|d| d.join("navicar"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/navicar"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/navicar
        dirs::data_dir()
            .map(|d| d.join("navicar"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/navicar"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("navicar"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\navicar"))
    } else {
        PathBuf::from("./navicar_data")
    }
}
