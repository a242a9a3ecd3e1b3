//! scan-dashboard library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! A dashboard sits on an administrator's desk, away from the kiosk.  It
//! never touches a camera; all it does is watch the presence channel and
//! show whether the kiosk portal is reachable:
//!
//! 1. Polls the kiosk with `status-request` every few seconds.
//! 2. Tracks the last `portal-online` / `portal-offline` it heard.
//! 3. Treats an `online` older than two heartbeats as stale.

/// Application layer: presence observation.
pub mod application;

/// Infrastructure layer: UDP transport and UI bridge.
pub mod infrastructure;
