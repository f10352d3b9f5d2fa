//! navicar-ap - Main entry point
//!
//! Opens the database, restores the session, starts the playback engine on
//! the default audio device and serves the local control API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use navicar_ap::api::{self, AppContext};
use navicar_ap::audio::StreamingPlayer;
use navicar_ap::car::CarBridge;
use navicar_ap::catalog::{CatalogClient, CatalogCredentials};
use navicar_ap::config::{Bootstrap, ConfigOverrides, RuntimeSettings};
use navicar_ap::coordinator::SessionCoordinator;
use navicar_ap::host::{default_notifier, PlaybackHost};
use navicar_ap::playback::{EngineParts, FocusArbiter, LastTrackStore, PlaybackEngine, SqliteLastTrackStore};
use navicar_common::db::{init_database, AccountStore};
use navicar_common::events::EventBus;
use navicar_common::SessionManager;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for navicar-ap
#[derive(Parser, Debug)]
#[command(name = "navicar-ap")]
#[command(about = "Navidrome streaming player for the car")]
#[command(version)]
struct Args {
    /// Port the control API listens on
    #[arg(short, long, env = "NAVICAR_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "NAVICAR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "NAVICAR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let bootstrap = Bootstrap::resolve(&ConfigOverrides {
        config_path: args.config,
        root_folder: args.root_folder,
        port: args.port,
    })
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=debug", bootstrap.log_filter).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting navicar-ap {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", bootstrap.root_folder.display());

    let db = init_database(&bootstrap.database_path)
        .await
        .context("Failed to initialize database")?;
    let runtime = RuntimeSettings::load(&db)
        .await
        .context("Failed to load runtime settings")?
        .with_overrides(&bootstrap.playback);

    // Session: legacy import, then default account when nothing is active
    let accounts = AccountStore::new(db.clone())
        .await
        .context("Failed to open account store")?;
    let session = SessionManager::new(accounts);
    if let Some(id) = session
        .migrate_legacy_credentials()
        .await
        .context("Failed to migrate legacy credentials")?
    {
        info!("Migrated legacy credentials into account {}", id);
    }
    session
        .select_startup_account()
        .await
        .context("Failed to select startup account")?;

    let events = EventBus::new(runtime.event_bus_capacity);

    // Playback engine on the audio device
    let (signal_tx, signals) = mpsc::unbounded_channel();
    let device = runtime.audio_device.clone();
    let player = tokio::task::spawn_blocking(move || StreamingPlayer::new(signal_tx, device))
        .await
        .context("Audio startup task panicked")?
        .context("Failed to open audio output")?;

    let arbiter = FocusArbiter::new();
    let (focus, focus_changes) = arbiter.register("navicar-ap");
    let last_track: Arc<dyn LastTrackStore> = Arc::new(SqliteLastTrackStore::new(db.clone()));

    let playback = PlaybackEngine::spawn(EngineParts {
        player: Box::new(player),
        signals,
        focus: Box::new(focus),
        focus_changes,
        store: Arc::clone(&last_track),
        events: events.clone(),
        settings: runtime.engine_settings(),
    });

    let base_catalog = CatalogClient::new(
        CatalogCredentials::default(),
        bootstrap.client_id.clone(),
        runtime.http_request_timeout(),
    )
    .context("Failed to create HTTP client")?;

    let car = Arc::new(CarBridge::new(playback.clone(), last_track));
    let coordinator = Arc::new(SessionCoordinator::new(
        session,
        base_catalog,
        Arc::clone(&car),
        events.clone(),
        bootstrap.fallback_stream_url.clone(),
    ));

    match coordinator.refresh_albums().await {
        Ok(count) => info!("Loaded {} albums", count),
        Err(e) => warn!("Initial catalog refresh failed: {}", e),
    }
    if let Err(e) = car.restore_last_or_default(runtime.autoplay_on_restore).await {
        warn!("Failed to restore playback: {}", e);
    }

    let host = Arc::new(PlaybackHost::new(playback.clone(), default_notifier()));

    let ctx = AppContext {
        playback,
        host: Arc::clone(&host),
        coordinator,
        car,
        events,
    };

    api::run(ctx, bootstrap.port, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Err(e) = host.destroy().await {
        warn!("Failed to release playback: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
