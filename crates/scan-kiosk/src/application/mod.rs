//! Application layer use cases for the kiosk.
//!
//! Use cases here orchestrate domain objects from `scan-core` and depend on
//! traits for everything that touches hardware, files, or sockets, so the
//! whole accept/cooldown/failover cycle runs in tests without a camera.
//!
//! # Sub-modules
//!
//! - **`scan_engine`** – Owns the [`scan_core::ScanSession`]: starts the
//!   camera with managed-then-raw failover, turns decodes into accepted
//!   scans, runs the cooldown countdown, and handles restart, camera switch,
//!   and shutdown.
//!
//! - **`enumerate_cameras`** – Lists distinct cameras once per session and
//!   picks the next one for a switch.
//!
//! - **`check_codes`** – Operator-side checks that bypass the camera:
//!   manual code lookup and still-image decode.
//!
//! - **`announce_presence`** – Heartbeats `portal-online` on the presence
//!   channel, answers status requests, and says goodbye on shutdown.

pub mod announce_presence;
pub mod check_codes;
pub mod enumerate_cameras;
pub mod scan_engine;
