//! Mock decoding libraries and camera stack for testing.
//!
//! Lets tests drive both backends without a camera: script how the managed
//! library's start call behaves, feed frames into a fake stream, and count
//! how often each seam was called.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scan_core::{CameraConstraints, CameraDevice, Frame};

use super::lock_unpoisoned;
use super::managed::{LibraryError, ManagedScanConfig, ManagedScanner};
use super::raw::{FrameDecoder, MediaDeviceInfo, MediaDevices, MediaError, VideoStream};
use super::DecodeSink;

/// How [`MockManagedScanner::start`] should behave.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    /// Resolve immediately, reporting this camera id.
    Succeed(Option<String>),
    /// Resolve after a delay.
    SucceedAfter(Duration, Option<String>),
    /// Reject with a generic library error.
    Reject(String),
    /// Reject with a permission error.
    DenyPermission,
    /// Never resolve.
    Hang,
}

/// A scriptable [`ManagedScanner`].
pub struct MockManagedScanner {
    behavior: Mutex<StartBehavior>,
    cameras: Mutex<Result<Vec<CameraDevice>, String>>,
    cameras_delay: Mutex<Duration>,
    sink: Mutex<Option<DecodeSink>>,
    last_constraints: Mutex<Option<CameraConstraints>>,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    camera_calls: AtomicU32,
}

impl MockManagedScanner {
    pub fn new(behavior: StartBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            cameras: Mutex::new(Ok(Vec::new())),
            cameras_delay: Mutex::new(Duration::ZERO),
            sink: Mutex::new(None),
            last_constraints: Mutex::new(None),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            camera_calls: AtomicU32::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: StartBehavior) {
        *lock_unpoisoned(&self.behavior) = behavior;
    }

    /// Sets the ids returned by the camera listing call.
    pub fn set_cameras(&self, ids: &[&str]) {
        *lock_unpoisoned(&self.cameras) = Ok(ids.iter().map(|id| CameraDevice::new(*id)).collect());
    }

    /// Makes the camera listing call take `delay` before answering.
    pub fn delay_cameras(&self, delay: Duration) {
        *lock_unpoisoned(&self.cameras_delay) = delay;
    }

    /// Makes the camera listing call fail.
    pub fn fail_cameras(&self, reason: &str) {
        *lock_unpoisoned(&self.cameras) = Err(reason.to_string());
    }

    /// Injects a decoded payload, as if the library read a QR code.
    ///
    /// Returns `false` if the scanner is not running or nobody is listening.
    pub fn inject(&self, payload: &str) -> bool {
        lock_unpoisoned(&self.sink)
            .as_ref()
            .is_some_and(|sink| sink.deliver(payload))
    }

    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.sink).is_some()
    }

    pub fn last_constraints(&self) -> Option<CameraConstraints> {
        lock_unpoisoned(&self.last_constraints).clone()
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn camera_calls(&self) -> u32 {
        self.camera_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedScanner for MockManagedScanner {
    async fn start(
        &self,
        constraints: &CameraConstraints,
        _config: &ManagedScanConfig,
        sink: DecodeSink,
    ) -> Result<Option<String>, LibraryError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *lock_unpoisoned(&self.last_constraints) = Some(constraints.clone());
        let behavior = lock_unpoisoned(&self.behavior).clone();

        let resolved = match behavior {
            StartBehavior::Succeed(id) => id,
            StartBehavior::SucceedAfter(delay, id) => {
                tokio::time::sleep(delay).await;
                id
            }
            StartBehavior::Reject(reason) => return Err(LibraryError::Other(reason)),
            StartBehavior::DenyPermission => return Err(LibraryError::PermissionDenied),
            StartBehavior::Hang => std::future::pending().await,
        };
        *lock_unpoisoned(&self.sink) = Some(sink);
        Ok(resolved.or_else(|| constraints.device_id().map(str::to_string)))
    }

    async fn stop(&self) -> Result<(), LibraryError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        match lock_unpoisoned(&self.sink).take() {
            Some(_) => Ok(()),
            None => Err(LibraryError::NotRunning),
        }
    }

    async fn cameras(&self) -> Result<Vec<CameraDevice>, LibraryError> {
        self.camera_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock_unpoisoned(&self.cameras_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock_unpoisoned(&self.cameras)
            .clone()
            .map_err(LibraryError::Other)
    }
}

/// A scriptable [`MediaDevices`] whose streams read from a shared frame queue.
pub struct MockMediaDevices {
    devices: Mutex<Vec<MediaDeviceInfo>>,
    frames: Arc<Mutex<VecDeque<Frame>>>,
    live: Arc<AtomicUsize>,
    deny: AtomicBool,
    fail_enumeration: AtomicBool,
    last_constraints: Mutex<Option<CameraConstraints>>,
    open_calls: AtomicU32,
    enumerate_calls: AtomicU32,
}

impl MockMediaDevices {
    /// Creates a camera stack listing one video input per id.
    pub fn with_devices(ids: &[&str]) -> Self {
        Self {
            devices: Mutex::new(
                ids.iter()
                    .map(|id| MediaDeviceInfo::video(*id, format!("Camera {id}")))
                    .collect(),
            ),
            frames: Arc::new(Mutex::new(VecDeque::new())),
            live: Arc::new(AtomicUsize::new(0)),
            deny: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
            last_constraints: Mutex::new(None),
            open_calls: AtomicU32::new(0),
            enumerate_calls: AtomicU32::new(0),
        }
    }

    pub fn add_device(&self, device: MediaDeviceInfo) {
        lock_unpoisoned(&self.devices).push(device);
    }

    pub fn deny_permission(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Queues a frame for the next render-loop sample.
    pub fn push_frame(&self, frame: Frame) {
        lock_unpoisoned(&self.frames).push_back(frame);
    }

    /// Queues a frame that [`MockFrameDecoder`] decodes to `payload`.
    pub fn push_payload(&self, payload: &str) {
        self.push_frame(payload_frame(payload));
    }

    /// Number of streams opened and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<CameraConstraints> {
        lock_unpoisoned(&self.last_constraints).clone()
    }

    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn enumerate_calls(&self) -> u32 {
        self.enumerate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn open_stream(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn VideoStream>, MediaError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        *lock_unpoisoned(&self.last_constraints) = Some(constraints.clone());
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }

        let device_id = {
            let devices = lock_unpoisoned(&self.devices);
            match constraints.device_id() {
                Some(wanted) if devices.iter().any(|d| d.device_id == wanted) => {
                    Some(wanted.to_string())
                }
                Some(_) => return Err(MediaError::NotFound),
                None => devices.first().map(|d| d.device_id.clone()),
            }
        };

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockVideoStream {
            device_id,
            frames: Arc::clone(&self.frames),
            live: Arc::clone(&self.live),
            stopped: false,
        }))
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(MediaError::Other("enumeration blocked".to_string()));
        }
        Ok(lock_unpoisoned(&self.devices).clone())
    }
}

struct MockVideoStream {
    device_id: Option<String>,
    frames: Arc<Mutex<VecDeque<Frame>>>,
    live: Arc<AtomicUsize>,
    stopped: bool,
}

impl VideoStream for MockVideoStream {
    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.stopped {
            return None;
        }
        lock_unpoisoned(&self.frames).pop_front()
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Builds a one-row frame whose pixel bytes carry the UTF-8 payload,
/// zero-padded to whole RGBA pixels.
pub fn payload_frame(payload: &str) -> Frame {
    let mut bytes = payload.as_bytes().to_vec();
    let width = bytes.len().div_ceil(4).max(1);
    bytes.resize(width * 4, 0);
    Frame::new(width as u32, 1, bytes)
}

/// A [`FrameDecoder`] that reads frames built by [`payload_frame`].
///
/// Blank frames decode to nothing.
#[derive(Default)]
pub struct MockFrameDecoder {
    calls: AtomicU32,
}

impl MockFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for MockFrameDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let end = frame.rgba.iter().position(|b| *b == 0).unwrap_or(frame.rgba.len());
        if end == 0 {
            return None;
        }
        String::from_utf8(frame.rgba[..end].to_vec()).ok()
    }
}
