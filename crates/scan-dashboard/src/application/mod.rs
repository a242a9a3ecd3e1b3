//! Application layer use cases for the dashboard.
//!
//! - **`watch_presence`** – Polls the presence channel and derives the
//!   kiosk's [`PortalStatus`](watch_presence::PortalStatus) from the last
//!   beacon heard.

pub mod watch_presence;
