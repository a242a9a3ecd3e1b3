//! Command bridge between the kiosk UI and the application layer.
//!
//! Every operator action (launch, restart, switch camera, manual check,
//! still-image decode, shutdown) is a plain async function over a shared
//! [`KioskAppState`], returning a serializable [`KioskCommandResult`]:
//!
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! { "success": false, "data": null,  "error": "..."  }
//! ```
//!
//! The bridge also decides when the kiosk is "up" for presence purposes: the
//! heartbeat starts as soon as a backend is running, whichever command
//! started it, and stops on shutdown.

use std::sync::{Arc, Weak};

use scan_core::{CameraDevice, Frame, ScanOutcome, ScanSnapshot};
use serde::{Deserialize, Serialize};

use crate::application::announce_presence::PresenceAnnouncer;
use crate::application::check_codes::{decode_still, manual_check, ManualCheck, StillDecode};
use crate::application::scan_engine::ScanEngine;
use crate::infrastructure::decoder::raw::FrameDecoder;

// ── Shared application state ──────────────────────────────────────────────────

/// Runtime state shared between kiosk commands.
pub struct KioskAppState {
    pub engine: ScanEngine,
    pub announcer: PresenceAnnouncer,
    /// Decoder used for uploaded images; `None` when no decode library is linked.
    still_decoder: Option<Arc<dyn FrameDecoder>>,
}

impl KioskAppState {
    pub fn new(
        engine: ScanEngine,
        announcer: PresenceAnnouncer,
        still_decoder: Option<Arc<dyn FrameDecoder>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            engine.on_running(move |_| {
                if let Some(state) = weak.upgrade() {
                    state.announcer.start();
                }
            });
            Self {
                engine,
                announcer,
                still_decoder,
            }
        })
    }
}

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// Scanner status shown on the kiosk screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerStatusDto {
    #[serde(flatten)]
    pub snapshot: ScanSnapshot,
    pub cameras: Vec<CameraDevice>,
    /// `true` while this kiosk is announcing itself on the presence channel.
    pub announcing: bool,
}

/// Result of the "Check" button next to the manual code field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualCheckDto {
    pub result: ManualCheck,
    pub message: String,
}

/// Result of decoding an uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StillDecodeDto {
    pub result: StillDecode,
    pub message: String,
    /// Whether the decoded code was a registered badge, if one was decoded
    /// and the scanner was accepting.
    pub registered: Option<bool>,
}

/// Unified response wrapper for kiosk commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct KioskCommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> KioskCommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn status_dto(state: &KioskAppState) -> ScannerStatusDto {
    ScannerStatusDto {
        snapshot: state.engine.snapshot(),
        cameras: state.engine.devices(),
        announcing: state.announcer.is_running(),
    }
}

/// Starts the scanner on the remembered (or default) camera.
pub async fn launch_scanner(state: Arc<KioskAppState>) -> KioskCommandResult<ScannerStatusDto> {
    state.engine.start(None).await;
    KioskCommandResult::ok(status_dto(&state))
}

pub async fn get_scanner_status(state: Arc<KioskAppState>) -> KioskCommandResult<ScannerStatusDto> {
    KioskCommandResult::ok(status_dto(&state))
}

/// "Restart Scanner" button.  Rejected while a start is in progress; from
/// any other state, including after shutdown, the scanner starts again.
pub async fn restart_scanner(state: Arc<KioskAppState>) -> KioskCommandResult<ScannerStatusDto> {
    if !state.engine.snapshot().restart_enabled {
        return KioskCommandResult::err("scanner is still starting");
    }
    state.engine.restart().await;
    KioskCommandResult::ok(status_dto(&state))
}

/// "Switch Camera" button.
pub async fn switch_camera(state: Arc<KioskAppState>) -> KioskCommandResult<ScannerStatusDto> {
    if !state.engine.switch_camera().await {
        return KioskCommandResult::err("camera switch needs two cameras and an idle scanner");
    }
    KioskCommandResult::ok(status_dto(&state))
}

pub async fn check_code(state: Arc<KioskAppState>, input: String) -> KioskCommandResult<ManualCheckDto> {
    let result = manual_check(state.engine.registry(), &input);
    KioskCommandResult::ok(ManualCheckDto {
        message: result.message().to_string(),
        result,
    })
}

/// Decodes an uploaded image and feeds a hit through the live scan path.
pub async fn decode_image(state: Arc<KioskAppState>, frame: Frame) -> KioskCommandResult<StillDecodeDto> {
    let result = decode_still(state.still_decoder.as_deref(), &frame);
    let registered = match &result {
        StillDecode::Decoded { payload } => match state.engine.handle_decoded(payload) {
            ScanOutcome::Accepted { .. } => Some(true),
            ScanOutcome::Unrecognized(_) => Some(false),
            ScanOutcome::Discarded => None,
        },
        _ => None,
    };
    KioskCommandResult::ok(StillDecodeDto {
        message: result.message(),
        result,
        registered,
    })
}

/// Releases the camera and withdraws the kiosk from the presence channel.
pub async fn shutdown_kiosk(state: Arc<KioskAppState>) -> KioskCommandResult<()> {
    state.engine.shutdown().await;
    state.announcer.shutdown().await;
    KioskCommandResult::ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use scan_core::{LocalPresenceBus, PresenceBeacon, StudentRegistry, PresenceChannel, DEFAULT_CHANNEL};

    use crate::application::scan_engine::EngineConfig;
    use crate::infrastructure::decoder::managed::{ManagedBackend, ManagedScanConfig};
    use crate::infrastructure::decoder::mock::{
        payload_frame, MockFrameDecoder, MockManagedScanner, StartBehavior,
    };
    use crate::infrastructure::decoder::raw::RawBackend;
    use crate::infrastructure::storage::camera_store::MemoryCameraStore;

    fn make_state(behavior: StartBehavior) -> Arc<KioskAppState> {
        let library = Arc::new(MockManagedScanner::new(behavior));
        library.set_cameras(&["cam-1", "cam-2"]);
        state_over(library, &LocalPresenceBus::new())
    }

    fn state_over(library: Arc<MockManagedScanner>, bus: &LocalPresenceBus) -> Arc<KioskAppState> {
        let engine = ScanEngine::new(
            Arc::new(ManagedBackend::new(library, ManagedScanConfig::default())),
            Arc::new(RawBackend::unavailable()),
            Arc::new(StudentRegistry::from_entries([("8JKH3B4O", "John Doe")])),
            Arc::new(MemoryCameraStore::new()),
            EngineConfig::default(),
        );
        let announcer = PresenceAnnouncer::new(
            Arc::new(bus.open(DEFAULT_CHANNEL)),
            Duration::from_secs(2),
        );
        KioskAppState::new(engine, announcer, Some(Arc::new(MockFrameDecoder::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_starts_scanning_and_announcing() {
        // Arrange
        let state = make_state(StartBehavior::Succeed(Some("cam-1".to_string())));

        // Act
        let result = launch_scanner(state.clone()).await;

        // Assert
        assert!(result.success);
        let dto = result.data.unwrap();
        assert_eq!(dto.snapshot.status, "Scanning");
        assert_eq!(dto.cameras.len(), 2);
        assert!(dto.snapshot.switch_enabled);
        assert!(dto.announcing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_launch_does_not_announce() {
        let state = make_state(StartBehavior::DenyPermission);

        let dto = launch_scanner(state).await.data.unwrap();

        assert_eq!(dto.snapshot.status, "Unavailable");
        assert!(!dto.announcing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_starts_before_camera_listing_finishes() {
        // Arrange
        let bus = LocalPresenceBus::new();
        let dashboard = bus.open(DEFAULT_CHANNEL);
        let library = Arc::new(MockManagedScanner::new(StartBehavior::Succeed(None)));
        library.set_cameras(&["cam-1", "cam-2"]);
        library.delay_cameras(Duration::from_secs(2));
        let state = state_over(library.clone(), &bus);

        // Act
        let launch = tokio::spawn(launch_scanner(state.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let announcing_early = state.announcer.is_running();
        assert!(library.inject("8JKH3B4O"));
        let dto = launch.await.unwrap().data.unwrap();

        // Assert
        assert!(announcing_early, "online must not wait for camera listing");
        assert_eq!(dashboard.recv().await.unwrap(), PresenceBeacon::Online);
        assert_eq!(dto.snapshot.status, "Accepted");
        assert!(dto.announcing);
        assert_eq!(dto.cameras.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_from_idle_starts_scanning() {
        let state = make_state(StartBehavior::Succeed(None));

        let result = restart_scanner(state.clone()).await;

        assert!(result.success);
        assert_eq!(result.data.unwrap().snapshot.status, "Scanning");
        assert!(state.announcer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_shutdown_announces_again() {
        // Arrange
        let state = make_state(StartBehavior::Succeed(None));
        launch_scanner(state.clone()).await;
        shutdown_kiosk(state.clone()).await;
        assert!(!state.announcer.is_running());

        // Act
        let result = restart_scanner(state.clone()).await;

        // Assert
        assert!(result.success);
        let dto = result.data.unwrap();
        assert_eq!(dto.snapshot.status, "Scanning");
        assert!(dto.announcing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_rejected_while_starting() {
        // Arrange
        let state = make_state(StartBehavior::Hang);
        let launch = tokio::spawn(launch_scanner(state.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Act
        let result = restart_scanner(state.clone()).await;

        // Assert
        assert!(!result.success);
        launch.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_camera_moves_to_next_device() {
        // Arrange
        let state = make_state(StartBehavior::Succeed(None));
        launch_scanner(state.clone()).await;

        // Act
        let result = switch_camera(state.clone()).await;

        // Assert
        assert!(result.success);
        assert_eq!(result.data.unwrap().snapshot.camera_id.as_deref(), Some("cam-1"));
    }

    #[tokio::test]
    async fn test_check_code_reports_registration() {
        let state = make_state(StartBehavior::Succeed(None));

        let hit = check_code(state.clone(), "8jkh3b4o".to_string()).await.data.unwrap();
        let miss = check_code(state, "zzz".to_string()).await.data.unwrap();

        assert_eq!(hit.message, "Code is REGISTERED.");
        assert_eq!(miss.message, "Code not found.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoded_image_is_fed_through_scan_path() {
        // Arrange
        let state = make_state(StartBehavior::Succeed(None));
        launch_scanner(state.clone()).await;

        // Act
        let dto = decode_image(state.clone(), payload_frame("8JKH3B4O")).await.data.unwrap();

        // Assert
        assert_eq!(dto.message, "Decoded: 8JKH3B4O");
        assert_eq!(dto.registered, Some(true));
        assert_eq!(state.engine.snapshot().status, "Accepted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_announcing() {
        let state = make_state(StartBehavior::Succeed(None));
        launch_scanner(state.clone()).await;

        let result = shutdown_kiosk(state.clone()).await;

        assert!(result.success);
        assert!(!state.announcer.is_running());
        assert_eq!(state.engine.snapshot().status, "Initializing…");
    }

    #[test]
    fn test_command_result_envelopes() {
        let ok: KioskCommandResult<u32> = KioskCommandResult::ok(7);
        let err: KioskCommandResult<u32> = KioskCommandResult::err("nope");
        assert!(ok.success && ok.data == Some(7));
        assert!(!err.success && err.error.as_deref() == Some("nope"));
    }
}
