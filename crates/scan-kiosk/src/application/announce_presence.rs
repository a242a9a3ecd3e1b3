//! PresenceAnnouncer: the kiosk side of the presence heartbeat.
//!
//! Once started, the announcer posts `portal-online` immediately, repeats it
//! every heartbeat interval, and answers every `status-request` with an
//! extra `portal-online`.  On shutdown it stops the heartbeat and posts a
//! best-effort `portal-offline`.
//!
//! Posting is fire-and-forget: a failed post is logged and the heartbeat
//! carries on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use scan_core::{PresenceBeacon, PresenceChannel, PresenceError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::infrastructure::decoder::lock_unpoisoned;

/// Heartbeat and responder loop over a [`PresenceChannel`].
pub struct PresenceAnnouncer {
    channel: Arc<dyn PresenceChannel>,
    heartbeat: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceAnnouncer {
    pub fn new(channel: Arc<dyn PresenceChannel>, heartbeat: Duration) -> Self {
        Self {
            channel,
            heartbeat,
            task: Mutex::new(None),
        }
    }

    /// Starts announcing.  Calling this while already running does nothing.
    pub fn start(&self) {
        let mut task = lock_unpoisoned(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        info!("announcing kiosk presence on {}", self.channel.name());
        *task = Some(tokio::spawn(announce_loop(
            Arc::clone(&self.channel),
            self.heartbeat,
        )));
    }

    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.task)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stops the heartbeat and posts `portal-offline`.  Idempotent.
    pub async fn shutdown(&self) {
        let task = lock_unpoisoned(&self.task).take();
        let Some(task) = task else {
            return;
        };
        task.abort();
        post(self.channel.as_ref(), PresenceBeacon::Offline).await;
        info!("kiosk presence withdrawn from {}", self.channel.name());
    }
}

impl Drop for PresenceAnnouncer {
    fn drop(&mut self) {
        if let Some(task) = lock_unpoisoned(&self.task).take() {
            task.abort();
        }
    }
}

async fn announce_loop(channel: Arc<dyn PresenceChannel>, heartbeat: Duration) {
    // The first tick completes immediately.
    let mut ticker = time::interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => post(channel.as_ref(), PresenceBeacon::Online).await,
            received = channel.recv() => match received {
                Ok(PresenceBeacon::StatusRequest) => {
                    debug!("answering presence status request");
                    post(channel.as_ref(), PresenceBeacon::Online).await;
                }
                Ok(_) => {}
                Err(PresenceError::Closed) => {
                    debug!("presence channel closed; heartbeat stopped");
                    break;
                }
                Err(e) => debug!("ignoring presence receive error: {e}"),
            },
        }
    }
}

async fn post(channel: &dyn PresenceChannel, beacon: PresenceBeacon) {
    if let Err(e) = channel.post(beacon).await {
        debug!("presence post of {} failed: {e}", beacon.as_tag());
    }
}
