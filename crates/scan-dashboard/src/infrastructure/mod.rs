//! Infrastructure layer for the dashboard.
//!
//! - **`network`** – UDP observer endpoint that polls the kiosk's presence
//!   port from an ephemeral local port.
//!
//! - **`ui_bridge`** – Command handlers exposing the portal status to the UI.

pub mod network;
pub mod ui_bridge;
