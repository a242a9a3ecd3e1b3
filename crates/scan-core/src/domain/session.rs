//! The scan session state machine.
//!
//! A [`ScanSession`] is the live runtime state of one scanning instance:
//! which backend owns the camera, which device is open, whether new scans are
//! being accepted, and what the operator currently sees.  Every mutation goes
//! through a named transition so the whole accept/cooldown cycle can be
//! exercised without a camera.
//!
//! # Lifecycle
//!
//! ```text
//!            try_begin_start          started
//!   Idle ─────────────────► Starting ─────────► Scanning ◄──────────┐
//!    ▲                        │  │                  │               │
//!    │                fail    │  │ fail_over        │ record_decode │ soft_reset
//!    │                        ▼  ▼                  ▼  (registered) │
//!    │                    Errored  Starting(Raw)  Accepted ─────────┘
//!    │                                             (tick × N)
//!    └──────── stopped / prepare_restart (from any state)
//! ```
//!
//! `accepting` is cleared on entry to `Accepted` and only restored by
//! [`ScanSession::soft_reset`], a restart, or a fresh start, so decodes that
//! arrive during the countdown are discarded rather than queued.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::code::NormalizedCode;
use crate::domain::registry::RegistryLookup;

/// Which decoding strategy owns the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Turnkey scan service with its own camera control.
    Managed,
    /// Explicit camera stream plus per-frame decode.
    Raw,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Managed => f.write_str("managed"),
            BackendKind::Raw => f.write_str("raw"),
        }
    }
}

/// Coarse category of a terminal start failure, used for the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The operator (or platform policy) refused camera access.
    PermissionDenied,
    /// No usable decoding library or camera stack was present.
    Unavailable,
    /// Anything else the fallback backend reported.
    Failed,
}

/// Engine state as seen by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ScanStatus {
    Idle,
    Starting { backend: BackendKind },
    Scanning { backend: BackendKind },
    Accepted,
    Errored { kind: FailureKind, reason: String },
}

/// Colour class of the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Off,
    Starting,
    On,
    Success,
    Error,
}

/// The success banner shown during the cooldown countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub name: String,
    /// Ticks left before the session re-arms.
    pub remaining: u32,
}

impl Banner {
    pub fn headline(&self) -> String {
        format!("Welcome {}! Please Come In!", self.name)
    }

    pub fn timer_text(&self) -> String {
        if self.remaining > 0 {
            format!("Refreshing in {}…", self.remaining)
        } else {
            "Resetting…".to_string()
        }
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.headline(), self.timer_text())
    }
}

/// Tunables for the accept/cooldown cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPolicy {
    /// Countdown length in ticks.
    pub countdown_ticks: u32,
    /// Banner name used when the registry has no display name for a code.
    pub fallback_label: String,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            countdown_ticks: 5,
            fallback_label: "Student".to_string(),
        }
    }
}

/// Result of feeding one raw decode string into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The session was not accepting; nothing was recorded.
    Discarded,
    /// Recorded for operator visibility but not a registered badge.
    Unrecognized(NormalizedCode),
    /// Registered badge; the countdown should start.
    Accepted { code: NormalizedCode, name: String },
}

/// Live runtime state of one scanning instance.
#[derive(Debug, Clone)]
pub struct ScanSession {
    backend_kind: BackendKind,
    camera_id: Option<String>,
    accepting: bool,
    status: ScanStatus,
    last_raw_payload: String,
    last_normalized_payload: Option<NormalizedCode>,
    last_scan_registered: Option<bool>,
    scan_line: String,
    message: String,
    banner: Option<Banner>,
    decoder_missing: bool,
    visible_surface: Option<BackendKind>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            backend_kind: BackendKind::Managed,
            camera_id: None,
            accepting: true,
            status: ScanStatus::Idle,
            last_raw_payload: String::new(),
            last_normalized_payload: None,
            last_scan_registered: None,
            scan_line: "(No scan yet)".to_string(),
            message: "Loading scanner…".to_string(),
            banner: None,
            decoder_missing: false,
            visible_surface: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn accepting(&self) -> bool {
        self.accepting
    }

    pub fn last_raw_payload(&self) -> &str {
        &self.last_raw_payload
    }

    pub fn last_normalized_payload(&self) -> Option<&NormalizedCode> {
        self.last_normalized_payload.as_ref()
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn decoder_missing(&self) -> bool {
        self.decoder_missing
    }

    /// The only backend whose preview surface may be shown.
    pub fn visible_surface(&self) -> Option<BackendKind> {
        self.visible_surface
    }

    pub fn is_starting(&self) -> bool {
        matches!(self.status, ScanStatus::Starting { .. })
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.status, ScanStatus::Scanning { .. })
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Enters `Starting` for `backend`.
    ///
    /// Returns `false` (and changes nothing) if a start is already in
    /// progress.
    pub fn try_begin_start(&mut self, backend: BackendKind) -> bool {
        if self.is_starting() {
            return false;
        }
        self.enter_starting(backend);
        self.message = match backend {
            BackendKind::Managed => "Starting camera…".to_string(),
            BackendKind::Raw => "Starting fallback scanner…".to_string(),
        };
        true
    }

    /// Moves a managed start attempt over to the raw backend.
    pub fn fail_over(&mut self) {
        self.enter_starting(BackendKind::Raw);
        self.message = "Switching to fallback…".to_string();
    }

    fn enter_starting(&mut self, backend: BackendKind) {
        self.backend_kind = backend;
        self.status = ScanStatus::Starting { backend };
        self.visible_surface = Some(backend);
        self.banner = None;
        self.decoder_missing = false;
    }

    /// A backend confirmed a running camera.
    pub fn started(&mut self, backend: BackendKind, camera_id: Option<String>, decoder_missing: bool) {
        self.backend_kind = backend;
        if camera_id.is_some() {
            self.camera_id = camera_id;
        }
        self.status = ScanStatus::Scanning { backend };
        self.visible_surface = Some(backend);
        self.decoder_missing = decoder_missing;
        self.accepting = true;
        self.banner = None;
        self.message = if decoder_missing {
            "QR decode library missing; preview only.".to_string()
        } else {
            String::new()
        };
    }

    /// Both backends failed for this start attempt.
    pub fn fail(&mut self, kind: FailureKind, reason: impl Into<String>) {
        let reason = reason.into();
        self.message = match kind {
            FailureKind::PermissionDenied => format!(
                "Fallback failed: {reason}. Allow camera permission and press Restart Scanner."
            ),
            _ => format!("Fallback failed: {reason}"),
        };
        self.status = ScanStatus::Errored { kind, reason };
        self.visible_surface = None;
    }

    /// Feeds one raw decode string through the accept policy.
    ///
    /// Only a scanning, accepting session records anything.  A registered
    /// code flips `accepting` off, moves to `Accepted`, and installs the
    /// banner; this is the only place the registry is asked for a name.
    pub fn record_decode(
        &mut self,
        raw: &str,
        registry: &dyn RegistryLookup,
        policy: &AcceptPolicy,
    ) -> ScanOutcome {
        if !self.accepting || !self.is_scanning() {
            return ScanOutcome::Discarded;
        }

        let code = NormalizedCode::new(raw);
        let registered = !code.is_empty() && registry.contains(&code);

        self.last_raw_payload = raw.to_string();
        self.last_normalized_payload = Some(code.clone());
        self.last_scan_registered = Some(registered);
        self.scan_line = format!("Scan: {code}");

        if !registered {
            return ScanOutcome::Unrecognized(code);
        }

        let name = registry
            .display_name(&code)
            .unwrap_or_else(|| policy.fallback_label.clone());
        self.accepting = false;
        self.status = ScanStatus::Accepted;
        self.banner = Some(Banner {
            name: name.clone(),
            remaining: policy.countdown_ticks,
        });
        ScanOutcome::Accepted { code, name }
    }

    /// Advances the countdown by one tick and returns the ticks left.
    ///
    /// Returns `None` when no countdown is running.
    pub fn tick(&mut self) -> Option<u32> {
        if self.status != ScanStatus::Accepted {
            return None;
        }
        let banner = self.banner.as_mut()?;
        banner.remaining = banner.remaining.saturating_sub(1);
        Some(banner.remaining)
    }

    /// Ends the cooldown and re-arms the session.
    pub fn soft_reset(&mut self) {
        self.banner = None;
        self.accepting = true;
        self.scan_line = "(Awaiting next scan)".to_string();
        if self.status == ScanStatus::Accepted {
            self.status = ScanStatus::Scanning {
                backend: self.backend_kind,
            };
        }
    }

    /// The active backend was stopped ahead of a restart or camera switch.
    pub fn prepare_restart(&mut self) {
        self.stopped();
        self.scan_line = "(Restarting…)".to_string();
    }

    /// The active backend was stopped.
    pub fn stopped(&mut self) {
        self.status = ScanStatus::Idle;
        self.visible_surface = None;
        self.banner = None;
        self.accepting = true;
        self.decoder_missing = false;
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    // ── Presentation ─────────────────────────────────────────────────────────

    /// Badge text, mirroring the portal's status badge.
    pub fn status_text(&self) -> String {
        match &self.status {
            ScanStatus::Idle => "Initializing…".to_string(),
            ScanStatus::Starting { backend: BackendKind::Managed } => "Starting".to_string(),
            ScanStatus::Starting { backend: BackendKind::Raw } => "Starting (fallback)".to_string(),
            ScanStatus::Scanning { backend: BackendKind::Managed } => "Scanning".to_string(),
            ScanStatus::Scanning { backend: BackendKind::Raw } if self.decoder_missing => {
                "Scanning (fallback, library missing)".to_string()
            }
            ScanStatus::Scanning { backend: BackendKind::Raw } => "Scanning (fallback)".to_string(),
            ScanStatus::Accepted => "Accepted".to_string(),
            ScanStatus::Errored { kind: FailureKind::PermissionDenied, .. } => "Denied".to_string(),
            ScanStatus::Errored { kind: FailureKind::Unavailable, .. } => "Unavailable".to_string(),
            ScanStatus::Errored { .. } => "Error".to_string(),
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self.status {
            ScanStatus::Idle => StatusTone::Off,
            ScanStatus::Starting { .. } => StatusTone::Starting,
            ScanStatus::Scanning { .. } => StatusTone::On,
            ScanStatus::Accepted => StatusTone::Success,
            ScanStatus::Errored { .. } => StatusTone::Error,
        }
    }

    /// Builds the read-only view handed to the UI layer.
    ///
    /// `device_count` is the number of distinct cameras enumerated so far;
    /// switching needs at least two.
    pub fn snapshot(&self, device_count: usize) -> ScanSnapshot {
        ScanSnapshot {
            status: self.status_text(),
            tone: self.tone(),
            fallback: self.backend_kind == BackendKind::Raw
                && !matches!(self.status, ScanStatus::Idle),
            message: self.message.clone(),
            last_scan: self.scan_line.clone(),
            last_scan_registered: self.last_scan_registered,
            banner: self.banner.as_ref().map(Banner::to_string),
            accepting: self.accepting,
            camera_id: self.camera_id.clone(),
            visible_surface: self.visible_surface,
            restart_enabled: !self.is_starting(),
            switch_enabled: device_count >= 2 && !self.is_starting(),
        }
    }
}

/// Serializable view of a [`ScanSession`] for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub status: String,
    pub tone: StatusTone,
    /// `true` while the raw backend owns the camera.
    pub fallback: bool,
    pub message: String,
    pub last_scan: String,
    pub last_scan_registered: Option<bool>,
    pub banner: Option<String>,
    pub accepting: bool,
    pub camera_id: Option<String>,
    pub visible_surface: Option<BackendKind>,
    pub restart_enabled: bool,
    pub switch_enabled: bool,
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        ScanSession::new().snapshot(0)
    }
}
