//! ScanEngine: camera lifecycle, decode handling, and the cooldown countdown.
//!
//! The engine owns one [`ScanSession`] and two [`DecoderBackend`]
//! strategies.  It guarantees that at most one backend holds the camera,
//! that a registered badge is accepted exactly once per cooldown, and that a
//! slow or broken managed backend never leaves the kiosk without a scanner.
//!
//! # Start and failover
//!
//! ```text
//! start(camera?)
//!   ├─ managed usable? ──no──────────────────────────┐
//!   │      yes                                        ▼
//!   ├─ managed.start  ── ok ──► Scanning     raw.start ── ok ──► Scanning (fallback)
//!   │      │ error / deadline                         │ error
//!   │      └─► stop managed, fail over ───────────────┘      └─► Errored
//! ```
//!
//! The managed deadline is a [`tokio::time::timeout`] around the start
//! future, so a start that resolves late is simply dropped and can never
//! trigger a second failover.  Every start, restart, switch, and shutdown
//! bumps an attempt counter.  A start that succeeds for an older attempt is
//! stopped again unless a newer attempt already owns the same backend.
//!
//! Once a backend is running the engine calls its running hook (see
//! [`ScanEngine::on_running`]) before listing cameras, so listeners learn
//! about the start without waiting for enumeration.
//!
//! # Delivery
//!
//! Backends push raw payloads into a shared [`DecodeSink`].  A pump task
//! drains it into [`ScanEngine::handle_decoded`], which tests may also call
//! directly.
//!
//! # Locking
//!
//! Session state sits behind a std `Mutex` that is never held across an
//! `await`.  UI observers receive [`ScanSnapshot`]s through a `watch`
//! channel after every visible change.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use scan_core::{
    AcceptPolicy, BackendKind, CameraDevice, RegistryLookup, ScanOutcome, ScanSession,
    ScanSnapshot, ScanStatus,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::application::enumerate_cameras::CameraEnumerator;
use crate::infrastructure::decoder::{
    lock_unpoisoned, ActiveHandle, BackendError, DecodeSink, DecoderBackend,
};
use crate::infrastructure::storage::camera_store::CameraStore;

/// Engine timings and accept policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Key under which the last-used camera is remembered.
    pub context: String,
    /// How long the managed backend may take to start before failover.
    pub managed_start_timeout: Duration,
    /// Pause between stopping and starting on restart.
    pub restart_delay: Duration,
    /// Pause between stopping and starting on camera switch.
    pub switch_delay: Duration,
    /// Countdown tick length.
    pub tick_interval: Duration,
    /// Upper bound on a camera listing call.
    pub enumerate_timeout: Duration,
    pub policy: AcceptPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context: "portal".to_string(),
            managed_start_timeout: Duration::from_millis(5500),
            restart_delay: Duration::from_millis(120),
            switch_delay: Duration::from_millis(140),
            tick_interval: Duration::from_secs(1),
            enumerate_timeout: Duration::from_secs(3),
            policy: AcceptPolicy::default(),
        }
    }
}

type RunningHook = Arc<dyn Fn(BackendKind) + Send + Sync>;

/// The kiosk scan engine.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    managed: Arc<dyn DecoderBackend>,
    raw: Arc<dyn DecoderBackend>,
    registry: Arc<dyn RegistryLookup>,
    store: Arc<dyn CameraStore>,
    enumerator: CameraEnumerator,
    session: Mutex<ScanSession>,
    /// Set once the managed backend reports its library missing.
    managed_unavailable: AtomicBool,
    attempt: AtomicU64,
    /// Backend currently holding (or acquiring) the camera.
    active: Mutex<Option<BackendKind>>,
    countdown: Mutex<Option<JoinHandle<()>>>,
    sink: DecodeSink,
    decodes: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    snapshots: watch::Sender<ScanSnapshot>,
    running_hook: Mutex<Option<RunningHook>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for slot in [&self.pump, &self.countdown] {
            if let Some(task) = lock_unpoisoned(slot).take() {
                task.abort();
            }
        }
    }
}

impl ScanEngine {
    pub fn new(
        managed: Arc<dyn DecoderBackend>,
        raw: Arc<dyn DecoderBackend>,
        registry: Arc<dyn RegistryLookup>,
        store: Arc<dyn CameraStore>,
        config: EngineConfig,
    ) -> Self {
        let (sink, decodes) = DecodeSink::channel();
        let (snapshots, _) = watch::channel(ScanSnapshot::default());
        Self {
            inner: Arc::new(EngineInner {
                config,
                managed,
                raw,
                registry,
                store,
                enumerator: CameraEnumerator::new(),
                session: Mutex::new(ScanSession::new()),
                managed_unavailable: AtomicBool::new(false),
                attempt: AtomicU64::new(0),
                active: Mutex::new(None),
                countdown: Mutex::new(None),
                sink,
                decodes: Mutex::new(Some(decodes)),
                pump: Mutex::new(None),
                snapshots,
                running_hook: Mutex::new(None),
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &dyn RegistryLookup {
        self.inner.registry.as_ref()
    }

    /// A copy of the current session state.
    pub fn session(&self) -> ScanSession {
        self.lock_session().clone()
    }

    pub fn status(&self) -> ScanStatus {
        self.lock_session().status().clone()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let device_count = self.inner.enumerator.device_count();
        self.lock_session().snapshot(device_count)
    }

    /// Receives a fresh [`ScanSnapshot`] after every visible change.
    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Distinct cameras enumerated so far.
    pub fn devices(&self) -> Vec<CameraDevice> {
        self.inner.enumerator.devices()
    }

    /// The backend currently holding the camera, if any.
    pub fn active_backend(&self) -> Option<BackendKind> {
        *lock_unpoisoned(&self.inner.active)
    }

    pub fn countdown_running(&self) -> bool {
        lock_unpoisoned(&self.inner.countdown)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Registers a callback run each time a backend starts successfully,
    /// before camera enumeration.  Replaces any previous hook.
    pub fn on_running(&self, hook: impl Fn(BackendKind) + Send + Sync + 'static) {
        *lock_unpoisoned(&self.inner.running_hook) = Some(Arc::new(hook));
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Acquires a camera, preferring `camera_id`, then the remembered
    /// camera for this context, then the platform's rear camera.
    ///
    /// Tries the managed backend first unless it is known to be unavailable
    /// and fails over to the raw backend on rejection or deadline.  A call
    /// made while another start is in progress returns the current status
    /// without doing anything.
    pub async fn start(&self, camera_id: Option<String>) -> ScanStatus {
        let preferred = camera_id.or_else(|| self.inner.store.load(&self.inner.config.context));
        let use_managed = self.managed_usable();
        let first = if use_managed {
            BackendKind::Managed
        } else {
            BackendKind::Raw
        };

        let attempt = {
            let mut session = self.lock_session();
            if !session.try_begin_start(first) {
                debug!("start ignored; another start is in progress");
                return session.status().clone();
            }
            self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.cancel_countdown();
        self.ensure_pump();
        if let Some(previous) = self.take_active() {
            self.stop_backend(self.backend(previous)).await;
        }
        self.publish();

        if use_managed {
            self.set_active(Some(BackendKind::Managed));
            match self.start_managed(preferred.as_deref(), attempt).await {
                Ok(handle) if self.is_current(attempt) => return self.on_started(handle).await,
                Ok(handle) => {
                    debug!("discarding managed start from a superseded attempt");
                    self.release_superseded(&handle).await;
                    return self.status();
                }
                Err(_) if !self.is_current(attempt) => return self.status(),
                Err(e) => {
                    if matches!(e, BackendError::BackendUnavailable(_)) {
                        self.inner.managed_unavailable.store(true, Ordering::SeqCst);
                    }
                    warn!("managed backend failed ({e}); switching to raw backend");
                    self.lock_session().fail_over();
                    self.publish();
                }
            }
        }

        self.set_active(Some(BackendKind::Raw));
        let result = self
            .inner
            .raw
            .start(preferred.as_deref(), self.inner.sink.clone())
            .await;
        if !self.is_current(attempt) {
            debug!("discarding raw start from a superseded attempt");
            if let Ok(handle) = &result {
                self.release_superseded(handle).await;
            }
            return self.status();
        }
        match result {
            Ok(handle) => self.on_started(handle).await,
            Err(e) => {
                error!("raw backend failed to start: {e}");
                self.set_active(None);
                self.lock_session().fail(e.failure_kind(), e.to_string());
                self.publish();
                self.status()
            }
        }
    }

    /// Stops the active backend and starts again on the same camera after
    /// the restart delay.
    pub async fn restart(&self) -> ScanStatus {
        let camera_id = self.lock_session().camera_id().map(str::to_string);
        info!("restarting scanner");
        self.release_camera().await;
        self.lock_session().prepare_restart();
        self.publish();
        time::sleep(self.inner.config.restart_delay).await;
        self.start(camera_id).await
    }

    /// Moves to the next enumerated camera.
    ///
    /// Returns `false` without side effects while a start is in progress or
    /// when fewer than two cameras are known.
    pub async fn switch_camera(&self) -> bool {
        let (current, starting) = {
            let session = self.lock_session();
            (session.camera_id().map(str::to_string), session.is_starting())
        };
        if starting {
            debug!("camera switch ignored; a start is in progress");
            return false;
        }
        let Some(next) = self.inner.enumerator.next_after(current.as_deref()) else {
            debug!("camera switch needs at least two cameras");
            return false;
        };

        info!("switching camera to {next}");
        self.release_camera().await;
        self.lock_session().prepare_restart();
        self.publish();
        time::sleep(self.inner.config.switch_delay).await;
        self.start(Some(next)).await;
        true
    }

    /// Releases the camera and cancels every pending timer.  Idempotent.
    pub async fn shutdown(&self) {
        self.release_camera().await;
        {
            let mut session = self.lock_session();
            session.stopped();
            session.set_message("Scanner stopped.");
        }
        self.publish();
        info!("scanner stopped");
    }

    // ── Decodes and cooldown ─────────────────────────────────────────────────

    /// Feeds one raw decode string through the accept policy.
    ///
    /// Must be called from within a Tokio runtime: an accepted scan spawns
    /// the countdown task.
    pub fn handle_decoded(&self, raw: &str) -> ScanOutcome {
        let outcome = self.lock_session().record_decode(
            raw,
            self.inner.registry.as_ref(),
            &self.inner.config.policy,
        );
        match &outcome {
            ScanOutcome::Accepted { code, name } => {
                info!("accepted badge {code} for {name}");
                self.start_countdown();
            }
            ScanOutcome::Unrecognized(code) => debug!("scanned code {code} is not registered"),
            ScanOutcome::Discarded => {
                trace!("decode discarded while not accepting");
                return outcome;
            }
        }
        self.publish();
        outcome
    }

    /// Ends the cooldown early and re-arms the session.
    pub fn soft_reset(&self) {
        self.cancel_countdown();
        self.lock_session().soft_reset();
        self.publish();
    }

    fn start_countdown(&self) {
        let engine = self.clone();
        let tick = self.inner.config.tick_interval;
        let task = tokio::spawn(async move {
            loop {
                time::sleep(tick).await;
                let remaining = engine.lock_session().tick();
                engine.publish();
                if remaining.map_or(true, |left| left == 0) {
                    break;
                }
            }
            engine.finish_countdown();
        });
        let previous = lock_unpoisoned(&self.inner.countdown).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn finish_countdown(&self) {
        // This is our own handle; dropping it detaches.
        drop(lock_unpoisoned(&self.inner.countdown).take());
        self.lock_session().soft_reset();
        self.publish();
        debug!("cooldown finished; accepting scans again");
    }

    fn cancel_countdown(&self) {
        let task = lock_unpoisoned(&self.inner.countdown).take();
        if let Some(task) = task {
            task.abort();
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn start_managed(
        &self,
        camera_id: Option<&str>,
        attempt: u64,
    ) -> Result<ActiveHandle, BackendError> {
        let managed = self.inner.managed.as_ref();
        let deadline = self.inner.config.managed_start_timeout;
        let result = match timeout(deadline, managed.start(camera_id, self.inner.sink.clone())).await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::StartTimeout(deadline)),
        };

        if let Err(e) = &result {
            let held = !matches!(e, BackendError::BackendUnavailable(_));
            if held && self.is_current(attempt) {
                self.stop_backend(managed).await;
            }
        }
        result
    }

    async fn on_started(&self, handle: ActiveHandle) -> ScanStatus {
        if let Some(id) = handle.camera_id.as_deref() {
            if let Err(e) = self.inner.store.save(&self.inner.config.context, id) {
                warn!("could not remember camera {id}: {e}");
            }
        }
        self.lock_session()
            .started(handle.backend, handle.camera_id.clone(), handle.decoder_missing);
        self.set_active(Some(handle.backend));
        info!(
            "scanner running on {} backend (camera {})",
            handle.backend,
            handle.camera_id.as_deref().unwrap_or("default")
        );
        self.publish();

        let hook = lock_unpoisoned(&self.inner.running_hook).clone();
        if let Some(hook) = hook {
            hook(handle.backend);
        }

        self.inner
            .enumerator
            .enumerate_once(
                self.backend(handle.backend),
                self.inner.config.enumerate_timeout,
            )
            .await;
        self.publish();
        self.status()
    }

    /// Invalidates in-flight attempts and stops whichever backend is active.
    async fn release_camera(&self) {
        self.inner.attempt.fetch_add(1, Ordering::SeqCst);
        self.cancel_countdown();
        if let Some(kind) = self.take_active() {
            self.stop_backend(self.backend(kind)).await;
        }
    }

    /// Stops a backend whose start finished after its attempt was
    /// superseded, unless a newer attempt has made it active again.
    async fn release_superseded(&self, handle: &ActiveHandle) {
        if self.active_backend() == Some(handle.backend) {
            return;
        }
        info!("releasing camera from a superseded {} start", handle.backend);
        self.stop_backend(self.backend(handle.backend)).await;
    }

    async fn stop_backend(&self, backend: &dyn DecoderBackend) {
        if let Err(e) = backend.stop().await {
            warn!("ignoring stop error from {} backend: {e}", backend.kind());
        }
    }

    fn ensure_pump(&self) {
        let mut pump = lock_unpoisoned(&self.inner.pump);
        if pump.is_some() {
            return;
        }
        let Some(mut decodes) = lock_unpoisoned(&self.inner.decodes).take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        *pump = Some(tokio::spawn(async move {
            while let Some(raw) = decodes.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ScanEngine { inner }.handle_decoded(&raw);
            }
        }));
    }

    fn backend(&self, kind: BackendKind) -> &dyn DecoderBackend {
        match kind {
            BackendKind::Managed => self.inner.managed.as_ref(),
            BackendKind::Raw => self.inner.raw.as_ref(),
        }
    }

    fn managed_usable(&self) -> bool {
        self.inner.managed.is_available() && !self.inner.managed_unavailable.load(Ordering::SeqCst)
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.inner.attempt.load(Ordering::SeqCst) == attempt
    }

    fn set_active(&self, kind: Option<BackendKind>) {
        *lock_unpoisoned(&self.inner.active) = kind;
    }

    fn take_active(&self) -> Option<BackendKind> {
        lock_unpoisoned(&self.inner.active).take()
    }

    fn lock_session(&self) -> MutexGuard<'_, ScanSession> {
        lock_unpoisoned(&self.inner.session)
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.inner.snapshots.send_replace(snapshot);
    }
}
