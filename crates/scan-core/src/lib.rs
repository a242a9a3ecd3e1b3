//! # scan-core
//!
//! Shared library for Merit Scan containing the scan-session domain model,
//! payload normalization, and the kiosk presence protocol.
//!
//! This crate is used by both the kiosk and the dashboard applications.
//! It has no dependencies on camera APIs, decoding libraries, or sockets.
//!
//! # Architecture overview
//!
//! A Merit Scan kiosk points a camera at a student's badge, decodes the QR
//! code printed on it, and greets the student by name.  Dashboards elsewhere
//! in the school watch a heartbeat to show whether the kiosk is reachable.
//!
//! - **`domain`** – Pure scanning rules: how a raw decode string becomes a
//!   [`NormalizedCode`], how a [`ScanSession`] moves between `Idle`,
//!   `Starting`, `Scanning`, `Accepted`, and `Errored`, and how the roster is
//!   queried through [`RegistryLookup`].
//!
//! - **`protocol`** – The three-message presence protocol
//!   (`portal-online`, `portal-offline`, `status-request`), its JSON frame
//!   codec, and the [`PresenceChannel`] abstraction both roles talk through.

pub mod domain;
pub mod protocol;
pub mod sync;

pub use domain::camera::{dedupe_device_ids, CameraConstraints, CameraDevice, FacingMode};
pub use domain::code::{normalize, NormalizedCode, MAX_CODE_LEN};
pub use domain::frame::Frame;
pub use domain::registry::{RegistryLookup, StudentRegistry};
pub use domain::session::{
    AcceptPolicy, BackendKind, Banner, FailureKind, ScanOutcome, ScanSession, ScanSnapshot,
    ScanStatus, StatusTone,
};
pub use protocol::presence::{
    LocalPresenceBus, PresenceBeacon, PresenceChannel, PresenceError, PresenceFrame,
    DEFAULT_CHANNEL,
};
pub use sync::lock_unpoisoned;
