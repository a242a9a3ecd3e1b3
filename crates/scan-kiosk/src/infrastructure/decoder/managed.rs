//! Managed decoder backend.
//!
//! Wraps a turnkey scanning library that opens the camera, runs its own
//! decode loop, and reports which device it actually opened.  The library is
//! optional: a kiosk built without one reports the backend as unavailable and
//! the engine goes straight to the raw backend.
//!
//! The start deadline is enforced by the caller.  This backend only maps
//! library outcomes onto [`BackendError`].

use std::sync::Arc;

use async_trait::async_trait;
use scan_core::{BackendKind, CameraConstraints, CameraDevice};
use tracing::debug;

use super::{ActiveHandle, BackendError, DecodeSink, DecoderBackend};

/// Scan configuration handed to the managed library on start.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedScanConfig {
    /// Decode attempts per second.
    pub fps: u32,
    /// Side length of the square scan region, in pixels.
    pub qrbox: u32,
    pub aspect_ratio: f32,
    pub disable_flip: bool,
    pub remember_last_used_camera: bool,
    /// Prefer a platform barcode detector when one exists.
    pub use_native_detector: bool,
}

impl Default for ManagedScanConfig {
    fn default() -> Self {
        Self {
            fps: 12,
            qrbox: 250,
            aspect_ratio: 1.0,
            disable_flip: false,
            remember_last_used_camera: true,
            use_native_detector: true,
        }
    }
}

/// Errors reported by a managed scanning library.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("no camera matches the requested constraints")]
    NotFound,
    #[error("scanner is not running")]
    NotRunning,
    #[error("{0}")]
    Other(String),
}

/// The turnkey scanning library seam.
#[async_trait]
pub trait ManagedScanner: Send + Sync {
    /// Opens a camera matching `constraints` and starts decoding into `sink`.
    ///
    /// Returns the id of the device that was opened, if the library knows it.
    async fn start(
        &self,
        constraints: &CameraConstraints,
        config: &ManagedScanConfig,
        sink: DecodeSink,
    ) -> Result<Option<String>, LibraryError>;

    async fn stop(&self) -> Result<(), LibraryError>;

    /// The library's own camera listing call.
    async fn cameras(&self) -> Result<Vec<CameraDevice>, LibraryError>;
}

/// [`DecoderBackend`] over an optional [`ManagedScanner`].
pub struct ManagedBackend {
    library: Option<Arc<dyn ManagedScanner>>,
    config: ManagedScanConfig,
}

impl ManagedBackend {
    pub fn new(library: Arc<dyn ManagedScanner>, config: ManagedScanConfig) -> Self {
        Self {
            library: Some(library),
            config,
        }
    }

    /// A managed backend with no library behind it.
    pub fn unavailable() -> Self {
        Self {
            library: None,
            config: ManagedScanConfig::default(),
        }
    }

    fn library(&self) -> Result<&Arc<dyn ManagedScanner>, BackendError> {
        self.library
            .as_ref()
            .ok_or(BackendError::BackendUnavailable(BackendKind::Managed))
    }
}

#[async_trait]
impl DecoderBackend for ManagedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Managed
    }

    fn is_available(&self) -> bool {
        self.library.is_some()
    }

    async fn start(
        &self,
        camera_id: Option<&str>,
        sink: DecodeSink,
    ) -> Result<ActiveHandle, BackendError> {
        let library = self.library()?;
        let constraints = CameraConstraints::for_camera(camera_id);
        debug!("managed backend starting with {constraints:?}");

        let resolved = library
            .start(&constraints, &self.config, sink)
            .await
            .map_err(|e| match e {
                LibraryError::PermissionDenied => BackendError::PermissionDenied,
                other => BackendError::StartRejected(other.to_string()),
            })?;

        Ok(ActiveHandle {
            backend: BackendKind::Managed,
            camera_id: resolved.or_else(|| camera_id.map(str::to_string)),
            decoder_missing: false,
        })
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let Some(library) = self.library.as_ref() else {
            return Ok(());
        };
        match library.stop().await {
            Ok(()) | Err(LibraryError::NotRunning) => Ok(()),
            Err(e) => Err(BackendError::StopError(e.to_string())),
        }
    }

    async fn enumerate(&self) -> Result<Vec<CameraDevice>, BackendError> {
        self.library()?
            .cameras()
            .await
            .map_err(|e| BackendError::EnumerationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::decoder::mock::{MockManagedScanner, StartBehavior};

    fn backend(behavior: StartBehavior) -> (ManagedBackend, Arc<MockManagedScanner>) {
        let library = Arc::new(MockManagedScanner::new(behavior));
        let backend = ManagedBackend::new(library.clone(), ManagedScanConfig::default());
        (backend, library)
    }

    #[tokio::test]
    async fn test_unavailable_backend_reports_unavailable() {
        let backend = ManagedBackend::unavailable();

        assert!(!backend.is_available());
        let (sink, _rx) = DecodeSink::channel();
        let err = backend.start(None, sink).await.unwrap_err();
        assert!(matches!(err, BackendError::BackendUnavailable(BackendKind::Managed)));
        assert!(backend.stop().await.is_ok(), "stop without a library is a no-op");
    }

    #[tokio::test]
    async fn test_start_prefers_library_resolved_camera_id() {
        // Arrange
        let (backend, library) = backend(StartBehavior::Succeed(Some("cam-rear".to_string())));
        let (sink, _rx) = DecodeSink::channel();

        // Act
        let handle = backend.start(Some("cam-old"), sink).await.unwrap();

        // Assert
        assert_eq!(handle.camera_id.as_deref(), Some("cam-rear"));
        assert_eq!(
            library.last_constraints(),
            Some(CameraConstraints::ExactDevice("cam-old".to_string()))
        );
    }

    #[tokio::test]
    async fn test_start_falls_back_to_requested_id_when_library_is_silent() {
        let (backend, _library) = backend(StartBehavior::Succeed(None));
        let (sink, _rx) = DecodeSink::channel();

        let handle = backend.start(Some("cam-1"), sink).await.unwrap();

        assert_eq!(handle.camera_id.as_deref(), Some("cam-1"));
        assert!(!handle.decoder_missing);
    }

    #[tokio::test]
    async fn test_permission_denial_is_mapped() {
        let (backend, _library) = backend(StartBehavior::DenyPermission);
        let (sink, _rx) = DecodeSink::channel();

        let err = backend.start(None, sink).await.unwrap_err();

        assert!(matches!(err, BackendError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_decodes_flow_into_sink_after_start() {
        // Arrange
        let (backend, library) = backend(StartBehavior::Succeed(None));
        let (sink, mut rx) = DecodeSink::channel();
        backend.start(None, sink).await.unwrap();

        // Act
        assert!(library.inject("QR100"));

        // Assert
        assert_eq!(rx.recv().await.as_deref(), Some("QR100"));
    }

    #[tokio::test]
    async fn test_enumerate_uses_library_listing() {
        let (backend, library) = backend(StartBehavior::Succeed(None));
        library.set_cameras(&["a", "b"]);

        let devices = backend.enumerate().await.unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(library.camera_calls(), 1);
    }
}
