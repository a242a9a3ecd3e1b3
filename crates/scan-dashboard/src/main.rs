//! Merit Scan dashboard entry point.
//!
//! Polls one kiosk's presence port and logs the portal badge whenever it
//! changes, until Ctrl-C.
//!
//! ```text
//! main()
//!  ├─ UdpPresenceObserver::connect(kiosk)
//!  ├─ PresenceObserver::start()   -- status-request every poll interval
//!  └─ status loop                 -- "Portal: Online" / "Portal: Offline"
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scan_core::DEFAULT_CHANNEL;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scan_dashboard::application::watch_presence::{ObserverConfig, PresenceObserver};
use scan_dashboard::infrastructure::network::UdpPresenceObserver;
use scan_dashboard::infrastructure::ui_bridge::DashboardAppState;

/// Merit Scan dashboard: shows whether the kiosk portal is reachable.
#[derive(Debug, Parser)]
#[command(name = "scan-dashboard", version, about)]
struct Args {
    /// Kiosk presence address.
    #[arg(long, default_value = "127.0.0.1:24810", env = "MERIT_SCAN_KIOSK")]
    kiosk: String,

    /// Presence channel name.
    #[arg(long, default_value = DEFAULT_CHANNEL, env = "MERIT_SCAN_CHANNEL")]
    channel: String,

    /// The kiosk's heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 2000, env = "MERIT_SCAN_HEARTBEAT_MS")]
    heartbeat_ms: u64,

    /// How often to poll the kiosk, in milliseconds.
    #[arg(long, default_value_t = 3000, env = "MERIT_SCAN_POLL_MS")]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Merit Scan dashboard starting");

    let transport = UdpPresenceObserver::connect(&args.kiosk, args.channel.clone()).await?;
    let observer = PresenceObserver::new(
        Arc::new(transport),
        ObserverConfig {
            heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
            poll_interval: Duration::from_millis(args.poll_ms),
        },
    );
    let state = DashboardAppState::new(observer, args.kiosk);
    let mut statuses = state.observer.subscribe();
    state.observer.start();

    info!("Merit Scan dashboard ready; watching {}", state.kiosk);
    info!("{}", *statuses.borrow_and_update());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *statuses.borrow_and_update();
                info!("{status}");
            }
            signal = &mut shutdown => {
                signal?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    state.observer.shutdown();
    info!("Merit Scan dashboard stopped");
    Ok(())
}
