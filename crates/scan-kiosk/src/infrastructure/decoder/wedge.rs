//! Keyboard-wedge managed scanner.
//!
//! USB HID QR scanners present themselves as keyboards: every badge they
//! read arrives as one line of text followed by Enter.  This adapter turns
//! such a line-oriented reader (typically stdin on a headless kiosk) into a
//! [`ManagedScanner`], so the kiosk binary runs the full engine without a
//! camera stack.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scan_core::{CameraConstraints, CameraDevice};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock_unpoisoned;
use super::managed::{LibraryError, ManagedScanConfig, ManagedScanner};
use super::DecodeSink;

/// Device id reported for the wedge "camera".
pub const WEDGE_DEVICE_ID: &str = "keyboard-wedge";

/// A [`ManagedScanner`] that reads one payload per line from `R`.
pub struct KeyboardWedgeScanner<R> {
    reader: Arc<AsyncMutex<R>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R> KeyboardWedgeScanner<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Arc::new(AsyncMutex::new(reader)),
            task: Mutex::new(None),
        }
    }

    fn abort_reader(&self) -> bool {
        let task = lock_unpoisoned(&self.task).take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl<R> ManagedScanner for KeyboardWedgeScanner<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(
        &self,
        constraints: &CameraConstraints,
        _config: &ManagedScanConfig,
        sink: DecodeSink,
    ) -> Result<Option<String>, LibraryError> {
        if let Some(wanted) = constraints.device_id() {
            if wanted != WEDGE_DEVICE_ID {
                debug!("wedge scanner ignoring device constraint {wanted}");
            }
        }
        self.abort_reader();

        let reader = Arc::clone(&self.reader);
        let task = tokio::spawn(async move {
            let mut reader = reader.lock().await;
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        info!("wedge scanner input closed");
                        break;
                    }
                    Ok(_) => {
                        let payload = line.trim_end_matches(['\r', '\n']);
                        if payload.is_empty() {
                            continue;
                        }
                        if !sink.deliver(payload) {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("wedge scanner read failed: {e}");
                        break;
                    }
                }
            }
        });
        *lock_unpoisoned(&self.task) = Some(task);
        Ok(Some(WEDGE_DEVICE_ID.to_string()))
    }

    async fn stop(&self) -> Result<(), LibraryError> {
        if self.abort_reader() {
            Ok(())
        } else {
            Err(LibraryError::NotRunning)
        }
    }

    async fn cameras(&self) -> Result<Vec<CameraDevice>, LibraryError> {
        Ok(vec![CameraDevice {
            id: WEDGE_DEVICE_ID.to_string(),
            label: Some("USB HID QR scanner".to_string()),
        }])
    }
}

impl<R> Drop for KeyboardWedgeScanner<R> {
    fn drop(&mut self) {
        if let Some(task) = lock_unpoisoned(&self.task).take() {
            task.abort();
        }
    }
}
