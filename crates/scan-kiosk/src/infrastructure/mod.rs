//! Infrastructure layer for the kiosk application.
//!
//! Contains the adapters that touch the outside world: decoding libraries
//! and camera stacks, the UDP presence socket, the configuration and state
//! files, and the command bridge the kiosk UI calls into.
//!
//! # Sub-modules
//!
//! - **`decoder`** – The [`decoder::DecoderBackend`] contract and its two
//!   strategies (managed and raw), the library seams they wrap, a
//!   keyboard-wedge managed scanner, and test doubles.
//!
//! - **`network`** – The kiosk side of the cross-process presence channel.
//!
//! - **`storage`** – TOML configuration and the last-used-camera store.
//!
//! - **`ui_bridge`** – Operator commands (restart, switch camera, manual
//!   check, still-image decode) and status snapshots for the UI.

pub mod decoder;
pub mod network;
pub mod storage;
pub mod ui_bridge;
