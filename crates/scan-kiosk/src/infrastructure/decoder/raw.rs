//! Raw decoder backend.
//!
//! Opens a camera stream through a [`MediaDevices`] implementation and runs a
//! render loop that samples the current frame on a fixed cadence and hands
//! it to a stateless [`FrameDecoder`].
//!
//! The decoder is optional.  Without one the stream still opens and the
//! render loop keeps sampling, so the operator gets a live preview while the
//! status badge reports that the decode library is missing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scan_core::{BackendKind, CameraConstraints, CameraDevice, Frame};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::{lock_unpoisoned, ActiveHandle, BackendError, DecodeSink, DecoderBackend};

/// Kind of device reported by a media device listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// One entry of a media device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub kind: MediaDeviceKind,
    pub device_id: String,
    pub label: String,
}

impl MediaDeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: MediaDeviceKind::VideoInput,
            device_id: device_id.into(),
            label: label.into(),
        }
    }
}

/// Errors reported by the camera stack.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("requested device not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

/// An open camera stream.
pub trait VideoStream: Send {
    /// The id of the device backing this stream, if the platform reports it.
    fn device_id(&self) -> Option<String>;

    /// The most recent frame, or `None` while the stream is still buffering.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Stops every track of the stream.
    fn stop(&mut self);
}

/// Camera stack seam: stream acquisition and device listing.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_stream(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn VideoStream>, MediaError>;

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;
}

/// Stateless image-to-text QR decoder.
///
/// Implementations should try both the normal and the inverted image.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

type SharedStream = Arc<Mutex<Box<dyn VideoStream>>>;

struct RawSession {
    stream: SharedStream,
    render_loop: JoinHandle<()>,
}

/// [`DecoderBackend`] over an optional camera stack and optional decoder.
pub struct RawBackend {
    media: Option<Arc<dyn MediaDevices>>,
    decoder: Option<Arc<dyn FrameDecoder>>,
    frame_interval: Duration,
    active: Mutex<Option<RawSession>>,
}

impl RawBackend {
    pub fn new(
        media: Option<Arc<dyn MediaDevices>>,
        decoder: Option<Arc<dyn FrameDecoder>>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            media,
            decoder,
            frame_interval,
            active: Mutex::new(None),
        }
    }

    /// A raw backend with no camera stack behind it.
    pub fn unavailable() -> Self {
        Self::new(None, None, Duration::from_millis(33))
    }

    /// Returns `true` while a stream is open.
    pub fn is_streaming(&self) -> bool {
        lock_unpoisoned(&self.active).is_some()
    }

    fn release(session: RawSession) {
        session.render_loop.abort();
        lock_unpoisoned(&session.stream).stop();
    }
}

#[async_trait]
impl DecoderBackend for RawBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Raw
    }

    fn is_available(&self) -> bool {
        self.media.is_some()
    }

    async fn start(
        &self,
        camera_id: Option<&str>,
        sink: DecodeSink,
    ) -> Result<ActiveHandle, BackendError> {
        let media = self
            .media
            .as_ref()
            .ok_or(BackendError::BackendUnavailable(BackendKind::Raw))?;

        // At most one stream is ever held.
        let previous = lock_unpoisoned(&self.active).take();
        if let Some(previous) = previous {
            debug!("raw backend releasing previous stream before restart");
            Self::release(previous);
        }

        let constraints = CameraConstraints::for_camera(camera_id);
        let stream = media.open_stream(&constraints).await.map_err(|e| match e {
            MediaError::PermissionDenied => BackendError::PermissionDenied,
            other => BackendError::StartRejected(other.to_string()),
        })?;

        let resolved = stream
            .device_id()
            .or_else(|| camera_id.map(str::to_string));
        let decoder_missing = self.decoder.is_none();
        if decoder_missing {
            warn!("raw backend running without a QR decoder; preview only");
        }

        let stream: SharedStream = Arc::new(Mutex::new(stream));
        let render_loop = tokio::spawn(render_loop(
            Arc::clone(&stream),
            self.decoder.clone(),
            sink,
            self.frame_interval,
        ));
        *lock_unpoisoned(&self.active) = Some(RawSession {
            stream,
            render_loop,
        });

        Ok(ActiveHandle {
            backend: BackendKind::Raw,
            camera_id: resolved,
            decoder_missing,
        })
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let session = lock_unpoisoned(&self.active).take();
        if let Some(session) = session {
            Self::release(session);
        }
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<CameraDevice>, BackendError> {
        let media = self
            .media
            .as_ref()
            .ok_or(BackendError::BackendUnavailable(BackendKind::Raw))?;
        let devices = media
            .enumerate_devices()
            .await
            .map_err(|e| BackendError::EnumerationFailed(e.to_string()))?;
        Ok(devices
            .into_iter()
            .filter(|d| d.kind == MediaDeviceKind::VideoInput)
            .map(|d| CameraDevice {
                id: d.device_id,
                label: (!d.label.is_empty()).then_some(d.label),
            })
            .collect())
    }
}

impl Drop for RawBackend {
    fn drop(&mut self) {
        if let Some(session) = lock_unpoisoned(&self.active).take() {
            Self::release(session);
        }
    }
}

/// Samples the stream every `interval` and forwards decoded payloads.
///
/// Ends when the sink's receiver is gone; otherwise runs until aborted.
async fn render_loop(
    stream: SharedStream,
    decoder: Option<Arc<dyn FrameDecoder>>,
    sink: DecodeSink,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let frame = lock_unpoisoned(&stream).current_frame();
        let (Some(frame), Some(decoder)) = (frame, decoder.as_ref()) else {
            continue;
        };
        if let Some(payload) = decoder.decode(&frame) {
            trace!("raw backend decoded a frame");
            if !sink.deliver(payload) {
                break;
            }
        }
    }
}
