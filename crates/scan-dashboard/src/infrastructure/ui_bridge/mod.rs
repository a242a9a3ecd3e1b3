//! Command bridge between the dashboard UI and the presence observer.
//!
//! The dashboard header shows a single "Portal: …" badge.  The UI polls
//! [`get_portal_status`] and may call [`refresh_portal_status`] to ask the
//! kiosk for an immediate answer.  Both return the same envelope as the
//! kiosk commands:
//!
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::watch_presence::{PortalStatus, PresenceObserver};

/// Runtime state shared between dashboard commands.
pub struct DashboardAppState {
    pub observer: PresenceObserver,
    /// Kiosk address as configured, for display.
    pub kiosk: String,
}

impl DashboardAppState {
    pub fn new(observer: PresenceObserver, kiosk: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            observer,
            kiosk: kiosk.into(),
        })
    }
}

/// The portal badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalStatusDto {
    pub status: PortalStatus,
    pub label: String,
    /// Milliseconds since the last kiosk beacon; `None` if none was heard.
    pub last_heard_ms: Option<u64>,
    pub kiosk: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardCommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> DashboardCommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn status_dto(state: &DashboardAppState) -> PortalStatusDto {
    let status = state.observer.status();
    PortalStatusDto {
        status,
        label: status.label().to_string(),
        last_heard_ms: state
            .observer
            .last_heard_age()
            .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
        kiosk: state.kiosk.clone(),
    }
}

pub async fn get_portal_status(state: Arc<DashboardAppState>) -> DashboardCommandResult<PortalStatusDto> {
    DashboardCommandResult::ok(status_dto(&state))
}

/// Sends an out-of-schedule `status-request`.  The answer arrives
/// asynchronously; the returned status is the one before it.
pub async fn refresh_portal_status(
    state: Arc<DashboardAppState>,
) -> DashboardCommandResult<PortalStatusDto> {
    if !state.observer.is_running() {
        return DashboardCommandResult::err("presence observer is not running");
    }
    state.observer.request_status().await;
    DashboardCommandResult::ok(status_dto(&state))
}
