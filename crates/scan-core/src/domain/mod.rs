//! Domain entities for Merit Scan.
//!
//! This module contains pure scanning rules with no infrastructure
//! dependencies.  Nothing here touches a camera, a decoder library, a file,
//! or a socket, so every transition can be unit-tested in isolation.

/// Payload normalization.
pub mod code;

/// Camera device identities and acquisition constraints.
pub mod camera;

/// Pixel buffers sampled from a camera stream or an uploaded image.
pub mod frame;

/// Roster lookup collaborator.
pub mod registry;

/// The scan session state machine.
///
/// See [`session::ScanSession`] for the main type.
pub mod session;
