//! Camera device identities and acquisition constraints.

use serde::{Deserialize, Serialize};

/// A video input device discovered by a backend's listing call.
///
/// The `id` is opaque: it is whatever the platform hands back and is only
/// ever compared for equality or passed back as an exact-device constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    /// Human-readable label, when the platform exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), label: None }
    }
}

/// Which way the camera should face when no device id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear-facing ("environment") camera; preferred for badge scanning.
    Environment,
    /// Front-facing ("user") camera.
    User,
}

/// Constraints passed to a backend when acquiring a camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraConstraints {
    /// Open exactly this device or fail.
    ExactDevice(String),
    /// Let the platform pick any device facing this way.
    Facing(FacingMode),
}

impl CameraConstraints {
    /// Exact device when an id is known, otherwise prefer the rear camera.
    pub fn for_camera(camera_id: Option<&str>) -> Self {
        match camera_id {
            Some(id) => Self::ExactDevice(id.to_string()),
            None => Self::Facing(FacingMode::Environment),
        }
    }

    /// Returns the requested device id, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::ExactDevice(id) => Some(id),
            Self::Facing(_) => None,
        }
    }
}

/// Deduplicates devices by id, keeping the first occurrence of each.
///
/// Some platforms list the same physical camera twice (for example once per
/// supported pixel format); switching must still cycle through distinct ids.
pub fn dedupe_device_ids(devices: Vec<CameraDevice>) -> Vec<CameraDevice> {
    let mut seen = std::collections::HashSet::new();
    devices
        .into_iter()
        .filter(|d| !d.id.is_empty() && seen.insert(d.id.clone()))
        .collect()
}
