//! PresenceObserver: the dashboard side of the presence heartbeat.
//!
//! The observer never announces anything.  It posts `status-request` at
//! start and every poll interval, remembers the last kiosk beacon it heard,
//! and renders it as a [`PortalStatus`]:
//!
//! | Last beacon                        | Status    |
//! |------------------------------------|-----------|
//! | none yet                           | `Unknown` |
//! | `portal-online`, under 2 × beat    | `Online`  |
//! | `portal-online`, 2 × beat or older | `Offline` |
//! | `portal-offline`                   | `Offline` |
//!
//! Beacons may be lost or duplicated, so the last one wins and nothing is
//! counted.  The loop wakes when an `Online` goes stale, so subscribers see
//! `Offline` at that moment rather than on the next poll.  `status-request`s from other dashboards are ignored.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scan_core::{lock_unpoisoned, PresenceBeacon, PresenceChannel, PresenceError};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Kiosk reachability as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalStatus {
    /// Nothing heard from the kiosk yet.
    Unknown,
    Online,
    Offline,
}

impl PortalStatus {
    pub fn label(self) -> &'static str {
        match self {
            PortalStatus::Unknown => "Portal: Unknown",
            PortalStatus::Online => "Portal: Online",
            PortalStatus::Offline => "Portal: Offline",
        }
    }
}

impl fmt::Display for PortalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observer timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    /// The kiosk's heartbeat interval; staleness is twice this.
    pub heartbeat_interval: Duration,
    /// How often to post `status-request`.
    pub poll_interval: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastBeacon {
    online: bool,
    at: Instant,
}

/// Last-message-wins record of kiosk beacons.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    stale_after: Duration,
    last: Option<LastBeacon>,
}

impl PresenceTracker {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            stale_after: heartbeat_interval * 2,
            last: None,
        }
    }

    /// Records a beacon heard at `at`.  Returns `false` for beacons that say
    /// nothing about the kiosk (status requests).
    pub fn record(&mut self, beacon: PresenceBeacon, at: Instant) -> bool {
        let online = match beacon {
            PresenceBeacon::Online => true,
            PresenceBeacon::Offline => false,
            PresenceBeacon::StatusRequest => return false,
        };
        self.last = Some(LastBeacon { online, at });
        true
    }

    pub fn status_at(&self, now: Instant) -> PortalStatus {
        match self.last {
            None => PortalStatus::Unknown,
            Some(LastBeacon { online: true, at })
                if now.saturating_duration_since(at) < self.stale_after =>
            {
                PortalStatus::Online
            }
            Some(_) => PortalStatus::Offline,
        }
    }

    /// The instant a still-fresh `Online` turns into `Offline`, or `None`
    /// if the status cannot change without another beacon.
    pub fn stale_deadline(&self, now: Instant) -> Option<Instant> {
        match self.last {
            Some(LastBeacon { online: true, at }) => {
                Some(at + self.stale_after).filter(|deadline| *deadline > now)
            }
            _ => None,
        }
    }

    /// When the last kiosk beacon arrived, if any.
    pub fn last_heard(&self) -> Option<Instant> {
        self.last.map(|last| last.at)
    }
}

/// Polling loop over a [`PresenceChannel`] that keeps a [`PresenceTracker`]
/// current and publishes status changes.
pub struct PresenceObserver {
    channel: Arc<dyn PresenceChannel>,
    poll_interval: Duration,
    tracker: Arc<Mutex<PresenceTracker>>,
    statuses: Arc<watch::Sender<PortalStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceObserver {
    pub fn new(channel: Arc<dyn PresenceChannel>, config: ObserverConfig) -> Self {
        let (statuses, _) = watch::channel(PortalStatus::Unknown);
        Self {
            channel,
            poll_interval: config.poll_interval,
            tracker: Arc::new(Mutex::new(PresenceTracker::new(config.heartbeat_interval))),
            statuses: Arc::new(statuses),
            task: Mutex::new(None),
        }
    }

    /// Starts polling.  Calling this while already running does nothing.
    pub fn start(&self) {
        let mut task = lock_unpoisoned(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        info!("watching kiosk presence on {}", self.channel.name());
        *task = Some(tokio::spawn(observe_loop(
            Arc::clone(&self.channel),
            Arc::clone(&self.tracker),
            Arc::clone(&self.statuses),
            self.poll_interval,
        )));
    }

    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.task)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Current status, with staleness evaluated now.
    pub fn status(&self) -> PortalStatus {
        lock_unpoisoned(&self.tracker).status_at(Instant::now())
    }

    /// Time since the last kiosk beacon, if one was heard.
    pub fn last_heard_age(&self) -> Option<Duration> {
        lock_unpoisoned(&self.tracker)
            .last_heard()
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Receives every status change, including an `Online` going stale.
    pub fn subscribe(&self) -> watch::Receiver<PortalStatus> {
        self.statuses.subscribe()
    }

    /// Asks the kiosk to announce itself now, outside the poll schedule.
    pub async fn request_status(&self) {
        request(self.channel.as_ref()).await;
    }

    /// Stops polling.  Idempotent; posts nothing.
    pub fn shutdown(&self) {
        if let Some(task) = lock_unpoisoned(&self.task).take() {
            task.abort();
            debug!("stopped watching kiosk presence");
        }
    }
}

impl Drop for PresenceObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn observe_loop(
    channel: Arc<dyn PresenceChannel>,
    tracker: Arc<Mutex<PresenceTracker>>,
    statuses: Arc<watch::Sender<PortalStatus>>,
    poll_interval: Duration,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let stale_deadline = lock_unpoisoned(&tracker).stale_deadline(Instant::now());
        tokio::select! {
            _ = until(stale_deadline) => publish(&tracker, &statuses),
            _ = ticker.tick() => {
                publish(&tracker, &statuses);
                request(channel.as_ref()).await;
            }
            received = channel.recv() => match received {
                Ok(beacon) => {
                    if lock_unpoisoned(&tracker).record(beacon, Instant::now()) {
                        publish(&tracker, &statuses);
                    }
                }
                Err(PresenceError::Closed) => {
                    debug!("presence channel closed; observer stopped");
                    break;
                }
                Err(e) => debug!("ignoring presence receive error: {e}"),
            },
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(tracker: &Mutex<PresenceTracker>, statuses: &watch::Sender<PortalStatus>) {
    let status = lock_unpoisoned(tracker).status_at(Instant::now());
    statuses.send_if_modified(|current| {
        if *current == status {
            return false;
        }
        debug!("portal status {current} -> {status}");
        *current = status;
        true
    });
}

async fn request(channel: &dyn PresenceChannel) {
    if let Err(e) = channel.post(PresenceBeacon::StatusRequest).await {
        debug!("status request failed: {e}");
    }
}
