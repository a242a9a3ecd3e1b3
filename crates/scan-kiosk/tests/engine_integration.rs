//! Integration tests for the scan engine.
//!
//! These tests drive `ScanEngine` end-to-end through its public API with the
//! mock decoding libraries, on paused Tokio time so start deadlines and the
//! cooldown countdown run instantly.

use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use scan_core::{
    BackendKind, CameraConstraints, FailureKind, NormalizedCode, RegistryLookup, ScanOutcome,
    ScanStatus, StudentRegistry,
};
use scan_kiosk::application::scan_engine::{EngineConfig, ScanEngine};
use scan_kiosk::infrastructure::decoder::managed::{ManagedBackend, ManagedScanConfig};
use scan_kiosk::infrastructure::decoder::mock::{
    MockFrameDecoder, MockManagedScanner, MockMediaDevices, StartBehavior,
};
use scan_kiosk::infrastructure::decoder::raw::RawBackend;
use scan_kiosk::infrastructure::storage::camera_store::{
    CameraStore, MemoryCameraStore, StoreError,
};
use tokio::time::{self, Instant};

mock! {
    Roster {}
    impl RegistryLookup for Roster {
        fn contains(&self, code: &NormalizedCode) -> bool;
        fn display_name(&self, code: &NormalizedCode) -> Option<String>;
    }
}

mock! {
    Store {}
    impl CameraStore for Store {
        fn load(&self, context: &str) -> Option<String>;
        fn save(&self, context: &str, camera_id: &str) -> Result<(), StoreError>;
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Rig {
    engine: ScanEngine,
    library: Arc<MockManagedScanner>,
    media: Arc<MockMediaDevices>,
}

fn roster() -> Arc<StudentRegistry> {
    Arc::new(StudentRegistry::from_entries([("8JKH3B4O", "John Doe")]))
}

fn rig_with(
    behavior: StartBehavior,
    registry: Arc<dyn RegistryLookup>,
    store: Arc<dyn CameraStore>,
) -> Rig {
    let library = Arc::new(MockManagedScanner::new(behavior));
    let media = Arc::new(MockMediaDevices::with_devices(&["usb-cam"]));
    let engine = ScanEngine::new(
        Arc::new(ManagedBackend::new(library.clone(), ManagedScanConfig::default())),
        Arc::new(RawBackend::new(
            Some(media.clone()),
            Some(Arc::new(MockFrameDecoder::new())),
            Duration::from_millis(33),
        )),
        registry,
        store,
        EngineConfig::default(),
    );
    Rig {
        engine,
        library,
        media,
    }
}

fn rig(behavior: StartBehavior) -> Rig {
    rig_with(behavior, roster(), Arc::new(MemoryCameraStore::new()))
}

/// Lets the decode pump drain without crossing a countdown tick.
async fn settle() {
    time::sleep(Duration::from_millis(10)).await;
}

// ── Accept and cooldown ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_registered_badge_is_accepted_once_per_cooldown() {
    // Arrange
    let mut registry = MockRoster::new();
    registry.expect_contains().returning(|code| code.as_str() == "8JKH3B4O");
    registry
        .expect_display_name()
        .times(1)
        .returning(|_| Some("John Doe".to_string()));
    let rig = rig_with(
        StartBehavior::Succeed(Some("cam-1".to_string())),
        Arc::new(registry),
        Arc::new(MemoryCameraStore::new()),
    );
    rig.engine.start(None).await;

    // Act
    assert!(rig.library.inject(" 8jkh-3b4o\n"));
    settle().await;
    assert!(rig.library.inject("8JKH3B4O"));
    settle().await;

    // Assert
    let snapshot = rig.engine.snapshot();
    assert_eq!(snapshot.status, "Accepted");
    assert!(!snapshot.accepting);
    assert_eq!(snapshot.last_scan, "Scan: 8JKH3B4O");
    assert_eq!(
        snapshot.banner.as_deref(),
        Some("Welcome John Doe! Please Come In!\nRefreshing in 5…")
    );
}

#[tokio::test(start_paused = true)]
async fn test_countdown_rearms_scanning_after_five_ticks() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(Some("cam-1".to_string())));
    rig.engine.start(None).await;
    let accepted_at = Instant::now();
    assert!(matches!(
        rig.engine.handle_decoded("8JKH3B4O"),
        ScanOutcome::Accepted { .. }
    ));

    // Act
    time::sleep(Duration::from_millis(4500)).await;
    let mid = rig.engine.snapshot();
    time::sleep(Duration::from_millis(600)).await;

    // Assert
    assert_eq!(mid.status, "Accepted");
    assert_eq!(
        mid.banner.as_deref(),
        Some("Welcome John Doe! Please Come In!\nRefreshing in 1…")
    );
    let after = rig.engine.snapshot();
    assert!(accepted_at.elapsed() >= Duration::from_secs(5));
    assert_eq!(after.status, "Scanning");
    assert!(after.accepting);
    assert_eq!(after.banner, None);
    assert!(!rig.engine.countdown_running());
    assert_eq!(after.last_scan, "(Awaiting next scan)");
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_code_is_recorded_without_status_change() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(None));
    rig.engine.start(None).await;

    // Act
    let outcome = rig.engine.handle_decoded("nobody-here");

    // Assert
    assert!(matches!(outcome, ScanOutcome::Unrecognized(_)));
    let snapshot = rig.engine.snapshot();
    assert_eq!(snapshot.status, "Scanning");
    assert!(snapshot.accepting);
    assert_eq!(snapshot.last_scan_registered, Some(false));
    assert!(!rig.engine.countdown_running());
}

// ── Failover ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_hanging_managed_start_fails_over_at_deadline() {
    // Arrange
    let rig = rig(StartBehavior::Hang);
    let started = Instant::now();

    // Act
    let status = rig.engine.start(None).await;

    // Assert
    assert_eq!(started.elapsed(), Duration::from_millis(5500));
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Raw });
    assert_eq!(rig.library.stop_calls(), 1, "managed must be stopped once");
    assert_eq!(rig.media.open_calls(), 1, "raw must start exactly once");
    assert_eq!(rig.engine.active_backend(), Some(BackendKind::Raw));
    let snapshot = rig.engine.snapshot();
    assert_eq!(snapshot.status, "Scanning (fallback)");
    assert!(snapshot.fallback);
    assert_eq!(snapshot.visible_surface, Some(BackendKind::Raw));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_managed_start_fails_over_immediately() {
    // Arrange
    let rig = rig(StartBehavior::Reject("no camera".to_string()));
    let started = Instant::now();

    // Act
    let status = rig.engine.start(None).await;

    // Assert
    assert!(started.elapsed() < Duration::from_millis(5500));
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Raw });
    assert_eq!(rig.media.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_frames_are_decoded_and_accepted() {
    // Arrange
    let rig = rig(StartBehavior::Reject("no camera".to_string()));
    rig.engine.start(None).await;

    // Act
    rig.media.push_payload("8jkh3b4o");
    time::sleep(Duration::from_millis(100)).await;

    // Assert
    assert_eq!(rig.engine.status(), ScanStatus::Accepted);
    assert_eq!(rig.engine.snapshot().last_scan_registered, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_on_fallback_shows_denied() {
    // Arrange
    let rig = rig(StartBehavior::DenyPermission);
    rig.media.deny_permission(true);

    // Act
    let status = rig.engine.start(None).await;

    // Assert
    assert!(matches!(
        status,
        ScanStatus::Errored { kind: FailureKind::PermissionDenied, .. }
    ));
    let snapshot = rig.engine.snapshot();
    assert_eq!(snapshot.status, "Denied");
    assert!(snapshot.restart_enabled);
    assert_eq!(rig.engine.active_backend(), None);
    assert_eq!(rig.media.live_streams(), 0);
}

// ── Restart and camera switching ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_restart_stops_then_starts_on_same_camera() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(Some("cam-7".to_string())));
    rig.engine.start(None).await;

    // Act
    let status = rig.engine.restart().await;

    // Assert
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Managed });
    assert_eq!(rig.library.start_calls(), 2);
    assert_eq!(rig.library.stop_calls(), 1);
    assert_eq!(
        rig.library.last_constraints(),
        Some(CameraConstraints::ExactDevice("cam-7".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_failure_reaches_scanning_or_error() {
    // Arrange
    let rig = rig(StartBehavior::DenyPermission);
    rig.media.deny_permission(true);
    rig.engine.start(None).await;
    rig.media.deny_permission(false);

    // Act
    let status = rig.engine.restart().await;

    // Assert
    assert!(matches!(
        status,
        ScanStatus::Scanning { .. } | ScanStatus::Errored { .. }
    ));
    assert_eq!(rig.media.live_streams(), 1, "exactly one stream after restart");
}

#[tokio::test(start_paused = true)]
async fn test_switch_is_a_no_op_with_a_single_camera() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(Some("cam-1".to_string())));
    rig.library.set_cameras(&["cam-1", "cam-1"]);
    rig.engine.start(None).await;

    // Act
    let switched = rig.engine.switch_camera().await;

    // Assert
    assert!(!switched);
    assert_eq!(rig.library.start_calls(), 1);
    assert!(!rig.engine.snapshot().switch_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_switch_cycles_through_enumerated_cameras() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(None));
    rig.library.set_cameras(&["front", "back", "side"]);
    rig.engine.start(Some("back".to_string())).await;

    // Act
    assert!(rig.engine.switch_camera().await);
    let first = rig.engine.snapshot().camera_id;
    assert!(rig.engine.switch_camera().await);
    let second = rig.engine.snapshot().camera_id;

    // Assert
    assert_eq!(first.as_deref(), Some("side"));
    assert_eq!(second.as_deref(), Some("front"));
    assert_eq!(rig.library.camera_calls(), 1, "listing is memoized");
}

#[tokio::test(start_paused = true)]
async fn test_switch_is_ignored_while_a_start_is_in_progress() {
    // Arrange
    let rig = rig(StartBehavior::Succeed(None));
    rig.library.set_cameras(&["front", "back"]);
    rig.engine.start(None).await;
    rig.library
        .set_behavior(StartBehavior::SucceedAfter(Duration::from_secs(2), None));
    let engine = rig.engine.clone();
    let restart = tokio::spawn(async move { engine.restart().await });
    time::sleep(Duration::from_millis(200)).await;
    assert!(rig.engine.session().is_starting());

    // Act
    let switched = rig.engine.switch_camera().await;

    // Assert
    assert!(!switched);
    assert!(!rig.engine.snapshot().switch_enabled);
    let status = restart.await.expect("restart task");
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Managed });
    assert_eq!(rig.library.start_calls(), 2);
}

// ── Persisted camera ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_remembered_camera_is_requested_and_saved() {
    // Arrange
    let mut store = MockStore::new();
    store
        .expect_load()
        .withf(|context| context == "portal")
        .returning(|_| Some("cam-2".to_string()));
    store
        .expect_save()
        .withf(|context, id| context == "portal" && id == "cam-2")
        .times(1)
        .returning(|_, _| Ok(()));
    let rig = rig_with(StartBehavior::Succeed(None), roster(), Arc::new(store));

    // Act
    rig.engine.start(None).await;

    // Assert
    assert_eq!(
        rig.library.last_constraints(),
        Some(CameraConstraints::ExactDevice("cam-2".to_string()))
    );
    assert_eq!(rig.engine.snapshot().camera_id.as_deref(), Some("cam-2"));
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_does_not_block_scanning() {
    // Arrange
    let mut store = MockStore::new();
    store.expect_load().returning(|_| None);
    store.expect_save().returning(|_, _| {
        Err(StoreError::Io {
            path: "state.toml".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    });
    let rig = rig_with(
        StartBehavior::Succeed(Some("cam-1".to_string())),
        roster(),
        Arc::new(store),
    );

    // Act
    let status = rig.engine.start(None).await;

    // Assert
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Managed });
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_camera_and_cancels_countdown() {
    // Arrange
    let rig = rig(StartBehavior::Reject("no camera".to_string()));
    rig.engine.start(None).await;
    rig.engine.handle_decoded("8JKH3B4O");

    // Act
    rig.engine.shutdown().await;

    // Assert
    assert_eq!(rig.media.live_streams(), 0);
    assert!(!rig.engine.countdown_running());
    assert_eq!(rig.engine.active_backend(), None);
    assert_eq!(rig.engine.snapshot().message, "Scanner stopped.");
}

// ── Teardown while a start is in flight ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_slow_start_releases_the_late_camera() {
    // Arrange
    let rig = rig(StartBehavior::SucceedAfter(
        Duration::from_secs(2),
        Some("cam-1".to_string()),
    ));
    let engine = rig.engine.clone();
    let start = tokio::spawn(async move { engine.start(None).await });
    time::sleep(Duration::from_millis(500)).await;

    // Act
    rig.engine.shutdown().await;
    let status = start.await.expect("start task");
    time::sleep(Duration::from_secs(1)).await;

    // Assert
    assert_eq!(status, ScanStatus::Idle);
    assert_eq!(rig.engine.status(), ScanStatus::Idle);
    assert_eq!(rig.engine.active_backend(), None);
    assert!(!rig.library.is_running(), "late start must not keep the camera");
    assert_eq!(rig.library.stop_calls(), 2);
    assert!(!rig.library.inject("8JKH3B4O"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_slow_start_keeps_the_newer_camera() {
    // Arrange
    let rig = rig(StartBehavior::SucceedAfter(Duration::from_secs(2), None));
    let engine = rig.engine.clone();
    let first = tokio::spawn(async move { engine.start(None).await });
    time::sleep(Duration::from_millis(500)).await;

    // Act
    let status = rig.engine.restart().await;
    first.await.expect("first start task");

    // Assert
    assert_eq!(status, ScanStatus::Scanning { backend: BackendKind::Managed });
    assert_eq!(rig.library.start_calls(), 2);
    assert_eq!(rig.engine.active_backend(), Some(BackendKind::Managed));
    assert!(rig.library.is_running());
    assert!(rig.library.inject("8JKH3B4O"));
    settle().await;
    assert_eq!(rig.engine.status(), ScanStatus::Accepted);
}
