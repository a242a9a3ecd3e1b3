//! Decoder backend infrastructure for the kiosk application.
//!
//! A decoder backend acquires a camera, turns what it sees into raw QR
//! payload strings, and releases the camera again.  Two strategies exist:
//!
//! - [`managed::ManagedBackend`] wraps a turnkey scan library that owns its
//!   own camera control and decode loop.
//! - [`raw::RawBackend`] opens a camera stream itself and runs a stateless
//!   frame decoder on a fixed cadence.
//!
//! The scan engine only sees the [`DecoderBackend`] trait, probes
//! [`DecoderBackend::is_available`] to choose a strategy, and never touches a
//! library or stream handle directly.
//!
//! # Delivery
//!
//! Decoded payloads are pushed into a [`DecodeSink`], an unbounded channel
//! drained by the engine.  A backend that finds the sink closed simply stops
//! delivering; it never blocks its decode loop on the consumer.
//!
//! # Testability
//!
//! Every external library is reached through a small trait
//! ([`managed::ManagedScanner`], [`raw::MediaDevices`], [`raw::FrameDecoder`]),
//! and [`mock`] provides scriptable implementations of each.  [`qr`] holds
//! the production frame decoder.

use std::time::Duration;

use async_trait::async_trait;
use scan_core::{BackendKind, CameraDevice, FailureKind};
use tokio::sync::mpsc;

pub mod managed;
pub mod mock;
pub mod qr;
pub mod raw;
pub mod wedge;

/// Error type for decoder backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0} decoding library is not available")]
    BackendUnavailable(BackendKind),
    #[error("managed scanner did not start within {0:?}")]
    StartTimeout(Duration),
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("QR decode library missing")]
    DecodeLibraryMissing,
    #[error("camera start rejected: {0}")]
    StartRejected(String),
    #[error("failed to release camera: {0}")]
    StopError(String),
    #[error("camera listing failed: {0}")]
    EnumerationFailed(String),
}

impl BackendError {
    /// Coarse category used for the operator's status badge.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BackendError::PermissionDenied => FailureKind::PermissionDenied,
            BackendError::BackendUnavailable(_) | BackendError::DecodeLibraryMissing => {
                FailureKind::Unavailable
            }
            _ => FailureKind::Failed,
        }
    }
}

/// Handle describing a camera a backend has successfully acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveHandle {
    pub backend: BackendKind,
    /// The device the platform actually opened, when it reports one.
    pub camera_id: Option<String>,
    /// The camera is live but nothing can decode its frames.
    pub decoder_missing: bool,
}

/// Sending half of the decode channel handed to a backend on start.
#[derive(Debug, Clone)]
pub struct DecodeSink {
    tx: mpsc::UnboundedSender<String>,
}

impl DecodeSink {
    /// Creates a sink and the receiver the engine drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers one raw payload.  Returns `false` once the receiver is gone.
    pub fn deliver(&self, payload: impl Into<String>) -> bool {
        self.tx.send(payload.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A strategy that can own the camera and produce raw decode strings.
///
/// Implementations own their active state: `stop` releases whatever the last
/// successful `start` acquired and is a no-op when nothing is held.
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Capability probe: can this backend run at all on this machine?
    fn is_available(&self) -> bool;

    /// Acquires a camera, preferring `camera_id` when given, and starts
    /// delivering decoded payloads into `sink`.
    async fn start(
        &self,
        camera_id: Option<&str>,
        sink: DecodeSink,
    ) -> Result<ActiveHandle, BackendError>;

    /// Releases the camera and cancels any decode loop.
    async fn stop(&self) -> Result<(), BackendError>;

    /// Lists the video input devices this backend can open.
    async fn enumerate(&self) -> Result<Vec<CameraDevice>, BackendError>;
}

pub(crate) use scan_core::lock_unpoisoned;
