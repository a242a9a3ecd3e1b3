//! Merit Scan kiosk entry point.
//!
//! Wires the scan engine to a keyboard-wedge badge scanner on stdin, the UDP
//! presence responder, and the on-disk configuration, then runs until
//! Ctrl-C.
//!
//! ```text
//! main()
//!  ├─ load KioskConfig (file + CLI overrides)
//!  ├─ ScanEngine
//!  │    ├─ managed: KeyboardWedgeScanner(stdin)
//!  │    └─ raw:     no camera stack in the headless build
//!  ├─ QrFrameDecoder for uploaded stills (--decode)
//!  ├─ PresenceAnnouncer over UdpPresenceResponder
//!  └─ snapshot logger (status changes → log lines)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use scan_core::{LocalPresenceBus, PresenceChannel};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scan_kiosk::application::announce_presence::PresenceAnnouncer;
use scan_kiosk::application::scan_engine::ScanEngine;
use scan_kiosk::infrastructure::decoder::managed::ManagedBackend;
use scan_kiosk::infrastructure::decoder::qr::{load_still, QrFrameDecoder};
use scan_kiosk::infrastructure::decoder::raw::FrameDecoder;
use scan_kiosk::infrastructure::decoder::raw::RawBackend;
use scan_kiosk::infrastructure::decoder::wedge::KeyboardWedgeScanner;
use scan_kiosk::infrastructure::network::presence_responder::UdpPresenceResponder;
use scan_kiosk::infrastructure::storage::camera_store::{
    CameraStore, MemoryCameraStore, TomlCameraStore,
};
use scan_kiosk::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, state_file_path,
};
use scan_kiosk::infrastructure::ui_bridge::{
    decode_image, launch_scanner, shutdown_kiosk, KioskAppState,
};

/// Merit Scan kiosk: greets registered badges and announces itself to dashboards.
#[derive(Debug, Parser)]
#[command(name = "scan-kiosk", version, about)]
struct Args {
    /// Path to the kiosk configuration file.
    #[arg(long, env = "MERIT_SCAN_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port dashboards poll for presence; overrides the config file.
    #[arg(long, env = "MERIT_SCAN_PRESENCE_PORT")]
    presence_port: Option<u16>,

    /// Scanning context under which the last camera is remembered.
    #[arg(long, env = "MERIT_SCAN_CONTEXT")]
    context: Option<String>,

    /// Keep the remembered camera in memory only.
    #[arg(long)]
    ephemeral: bool,

    /// Decode a QR code from this image once the scanner is up.
    #[arg(long, value_name = "IMAGE")]
    decode: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let mut config = load_config_from(&config_path)?;
    let first_run = !config_path.exists();
    let seeded = first_run.then(|| save_config_to(&config_path, &config));
    if let Some(port) = args.presence_port {
        config.presence.port = port;
    }
    if let Some(context) = args.context {
        config.kiosk.context = context;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.kiosk.log_level)),
        )
        .init();

    info!("Merit Scan kiosk starting ({})", config_path.display());
    match seeded {
        Some(Ok(())) => info!("wrote default configuration to {}", config_path.display()),
        Some(Err(e)) => warn!("could not write default configuration: {e}"),
        None => {}
    }

    let registry = Arc::new(config.student_registry());
    info!("roster loaded with {} badge(s)", registry.len());

    let store: Arc<dyn CameraStore> = if args.ephemeral {
        Arc::new(MemoryCameraStore::new())
    } else {
        Arc::new(TomlCameraStore::new(state_file_path(&config_path)))
    };

    // ── Scan engine ───────────────────────────────────────────────────────────
    let wedge = Arc::new(KeyboardWedgeScanner::new(BufReader::new(tokio::io::stdin())));
    let managed = Arc::new(ManagedBackend::new(wedge, config.managed_scan_config()));
    let decoder: Arc<dyn FrameDecoder> = Arc::new(QrFrameDecoder::new());
    let raw = Arc::new(RawBackend::new(
        None,
        Some(Arc::clone(&decoder)),
        config.frame_interval(),
    ));
    let engine = ScanEngine::new(managed, raw, registry, store, config.engine_config());

    // ── Presence ──────────────────────────────────────────────────────────────
    let channel: Arc<dyn PresenceChannel> = match UdpPresenceResponder::bind(
        &config.presence.bind_address,
        config.presence.port,
        config.presence.channel.clone(),
        config.presence_peer_ttl(),
    )
    .await
    {
        Ok(responder) => Arc::new(responder),
        Err(e) => {
            error!("failed to start presence responder: {e}; presence stays in-process");
            Arc::new(LocalPresenceBus::new().open(config.presence.channel.clone()))
        }
    };
    let announcer = PresenceAnnouncer::new(channel, config.heartbeat_interval());

    let state = KioskAppState::new(engine, announcer, Some(decoder));

    // ── Status logger ─────────────────────────────────────────────────────────
    let mut snapshots = state.engine.subscribe();
    tokio::spawn(async move {
        let mut last = (String::new(), String::new(), None);
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let current = (snapshot.status, snapshot.message, snapshot.banner);
            if current == last {
                continue;
            }
            match &current.2 {
                Some(banner) => info!("[{}] {}", current.0, banner.replace('\n', " | ")),
                None if current.1.is_empty() => info!("[{}]", current.0),
                None => info!("[{}] {}", current.0, current.1),
            }
            last = current;
        }
    });

    let launched = launch_scanner(Arc::clone(&state)).await;
    if let Some(status) = launched.data {
        info!(
            "scanner {} on camera {}",
            status.snapshot.status,
            status.snapshot.camera_id.as_deref().unwrap_or("default")
        );
    }

    if let Some(path) = args.decode {
        match load_still(&path) {
            Ok(frame) => {
                if let Some(still) = decode_image(Arc::clone(&state), frame).await.data {
                    info!("{}: {}", path.display(), still.message);
                }
            }
            Err(e) => warn!("cannot read image {}: {e}", path.display()),
        }
    }

    info!("Merit Scan kiosk ready. Scan a badge or press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shutdown_kiosk(state).await;
    info!("Merit Scan kiosk stopped");
    Ok(())
}
