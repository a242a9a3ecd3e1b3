//! Storage infrastructure: configuration and kiosk state persistence.
//!
//! - `config` reads and writes the TOML configuration file from the
//!   platform config directory, falling back to defaults on first run.
//! - `camera_store` remembers the last camera each scanning context used,
//!   so a restarted kiosk reopens the same device.

pub mod camera_store;
pub mod config;
