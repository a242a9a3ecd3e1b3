//! CameraEnumerator: one-shot listing of distinct video inputs.
//!
//! The first successful, non-empty listing is memoized for the rest of the
//! session; later calls return it without touching the backend.  Listing is
//! best-effort: a failure or timeout leaves the cache empty, disables camera
//! switching, and is retried after the next successful start.

use std::sync::Mutex;
use std::time::Duration;

use scan_core::{dedupe_device_ids, CameraDevice};
use tokio::time::timeout;
use tracing::debug;

use crate::infrastructure::decoder::{lock_unpoisoned, DecoderBackend};

/// Memoized camera listing.
#[derive(Debug, Default)]
pub struct CameraEnumerator {
    devices: Mutex<Option<Vec<CameraDevice>>>,
}

impl CameraEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists cameras through `backend` unless a listing is already cached.
    ///
    /// Returns the number of distinct cameras known afterwards.
    pub async fn enumerate_once(&self, backend: &dyn DecoderBackend, deadline: Duration) -> usize {
        if let Some(count) = self.cached_count() {
            return count;
        }

        match timeout(deadline, backend.enumerate()).await {
            Ok(Ok(devices)) => {
                let devices = dedupe_device_ids(devices);
                let count = devices.len();
                debug!("{} backend listed {count} distinct camera(s)", backend.kind());
                if count > 0 {
                    *lock_unpoisoned(&self.devices) = Some(devices);
                }
                count
            }
            Ok(Err(e)) => {
                debug!("camera enumeration via {} backend failed: {e}", backend.kind());
                0
            }
            Err(_) => {
                debug!("camera enumeration via {} backend timed out", backend.kind());
                0
            }
        }
    }

    fn cached_count(&self) -> Option<usize> {
        lock_unpoisoned(&self.devices).as_ref().map(Vec::len)
    }

    pub fn devices(&self) -> Vec<CameraDevice> {
        lock_unpoisoned(&self.devices).clone().unwrap_or_default()
    }

    pub fn device_count(&self) -> usize {
        self.cached_count().unwrap_or(0)
    }

    /// The camera after `current` in listing order, wrapping around.
    ///
    /// An unknown or absent `current` yields the first camera.  Returns
    /// `None` when fewer than two cameras are known.
    pub fn next_after(&self, current: Option<&str>) -> Option<String> {
        let guard = lock_unpoisoned(&self.devices);
        let devices = guard.as_ref()?;
        if devices.len() < 2 {
            return None;
        }
        let next = current
            .and_then(|id| devices.iter().position(|d| d.id == id))
            .map_or(0, |i| (i + 1) % devices.len());
        Some(devices[next].id.clone())
    }
}
