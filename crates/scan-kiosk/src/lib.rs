//! scan-kiosk library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the kiosk do?
//!
//! The kiosk is the machine at the school entrance with a camera pointed at
//! incoming students.  It:
//!
//! 1. Acquires a camera through the managed decoder backend, failing over to
//!    the raw (stream + per-frame decode) backend when the managed one is
//!    missing, refuses to start, or hangs.
//! 2. Normalizes every decoded payload and, when it matches a registered
//!    badge, greets the student and ignores further scans for a short
//!    cooldown so one badge is never scored twice.
//! 3. Announces itself on the presence channel so dashboards can show
//!    whether the portal is reachable.

/// Application layer: the scan engine, camera enumeration, presence announcing.
pub mod application;

/// Infrastructure layer: decoder backends, presence transport, storage, UI bridge.
pub mod infrastructure;
