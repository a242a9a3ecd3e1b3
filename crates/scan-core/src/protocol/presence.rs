//! Kiosk presence protocol.
//!
//! A kiosk announces that it is live on a named channel; dashboards listen
//! and render "Portal: Online" or "Portal: Offline".  The protocol has
//! exactly three messages and no payload beyond the tag:
//!
//! | Beacon          | Wire tag          | Sent by  | Meaning                         |
//! |-----------------|-------------------|----------|---------------------------------|
//! | `Online`        | `portal-online`   | kiosk    | heartbeat / reply to a request  |
//! | `Offline`       | `portal-offline`  | kiosk    | best-effort goodbye on teardown |
//! | `StatusRequest` | `status-request`  | anyone   | "kiosk, announce yourself now"  |
//!
//! Delivery is fire-and-forget.  Messages may be lost or duplicated, so
//! receivers apply last-message-wins and never rely on counting.
//!
//! # Framing
//!
//! Transports that cross a process boundary carry a [`PresenceFrame`]:
//! the channel name, the sender's instance id (so an instance can drop its
//! own echo), and the beacon tag, encoded as a small JSON object:
//!
//! ```json
//! {"channel":"portalStatusChannel","sender":"6f1c…","beacon":"status-request"}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, trace};
use uuid::Uuid;

/// The well-known channel name shared by every kiosk and dashboard.
pub const DEFAULT_CHANNEL: &str = "portalStatusChannel";

/// Capacity of the in-process bus; slow receivers skip ahead when it fills.
const LOCAL_BUS_CAPACITY: usize = 64;

/// One presence message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceBeacon {
    #[serde(rename = "portal-online")]
    Online,
    #[serde(rename = "portal-offline")]
    Offline,
    #[serde(rename = "status-request")]
    StatusRequest,
}

impl PresenceBeacon {
    /// Returns the wire tag for this beacon.
    pub fn as_tag(self) -> &'static str {
        match self {
            PresenceBeacon::Online => "portal-online",
            PresenceBeacon::Offline => "portal-offline",
            PresenceBeacon::StatusRequest => "status-request",
        }
    }

    /// Parses a wire tag.  Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "portal-online" => Some(PresenceBeacon::Online),
            "portal-offline" => Some(PresenceBeacon::Offline),
            "status-request" => Some(PresenceBeacon::StatusRequest),
            _ => None,
        }
    }
}

/// Errors raised by presence transports and the frame codec.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// A datagram did not contain a valid presence frame.
    #[error("malformed presence frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// The underlying socket failed.
    #[error("presence transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The channel has no more senders.
    #[error("presence channel closed")]
    Closed,
}

/// A beacon addressed to a named channel by a specific instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceFrame {
    pub channel: String,
    pub sender: Uuid,
    pub beacon: PresenceBeacon,
}

impl PresenceFrame {
    pub fn new(channel: impl Into<String>, sender: Uuid, beacon: PresenceBeacon) -> Self {
        Self {
            channel: channel.into(),
            sender,
            beacon,
        }
    }

    /// Encodes the frame as a JSON byte string.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Decode`] if serialization fails, which only
    /// happens for non-UTF-8 channel names.
    pub fn encode(&self) -> Result<Vec<u8>, PresenceError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a frame from a JSON byte string.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Decode`] for anything that is not a frame
    /// with one of the three known tags.
    pub fn decode(bytes: &[u8]) -> Result<Self, PresenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns `true` if this frame should be delivered to `instance` on
    /// `channel`: same channel, different sender.
    pub fn is_for(&self, channel: &str, instance: Uuid) -> bool {
        self.channel == channel && self.sender != instance
    }
}

/// A named, shared, fire-and-forget message channel.
///
/// Implementations never deliver an instance's own messages back to it.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// The channel name this endpoint is bound to.
    fn name(&self) -> &str;

    /// Posts a beacon to every other instance on the channel.
    async fn post(&self, beacon: PresenceBeacon) -> Result<(), PresenceError>;

    /// Waits for the next beacon from another instance.
    ///
    /// Cancel-safe: dropping the future loses no deliverable message.
    async fn recv(&self) -> Result<PresenceBeacon, PresenceError>;
}

/// In-process broadcast bus shared by every endpoint opened on it.
///
/// This is the same-process counterpart of a browser `BroadcastChannel`:
/// a kiosk engine and a dashboard observer running in one process open
/// endpoints on the same bus and exchange beacons without any socket.
#[derive(Debug, Clone)]
pub struct LocalPresenceBus {
    tx: broadcast::Sender<PresenceFrame>,
}

impl Default for LocalPresenceBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalPresenceBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LOCAL_BUS_CAPACITY);
        Self { tx }
    }

    /// Opens a new endpoint on `channel` with a fresh instance id.
    pub fn open(&self, channel: impl Into<String>) -> LocalPresenceEndpoint {
        LocalPresenceEndpoint {
            channel: channel.into(),
            instance: Uuid::new_v4(),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }
}

/// One instance's view of a [`LocalPresenceBus`] channel.
#[derive(Debug)]
pub struct LocalPresenceEndpoint {
    channel: String,
    instance: Uuid,
    tx: broadcast::Sender<PresenceFrame>,
    rx: Mutex<broadcast::Receiver<PresenceFrame>>,
}

impl LocalPresenceEndpoint {
    pub fn instance(&self) -> Uuid {
        self.instance
    }
}

#[async_trait]
impl PresenceChannel for LocalPresenceEndpoint {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn post(&self, beacon: PresenceBeacon) -> Result<(), PresenceError> {
        let frame = PresenceFrame::new(self.channel.clone(), self.instance, beacon);
        // Every endpoint holds a receiver, so this only fails once all are gone.
        if self.tx.send(frame).is_err() {
            trace!("no presence listeners on {}", self.channel);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<PresenceBeacon, PresenceError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(frame) if frame.is_for(&self.channel, self.instance) => {
                    return Ok(frame.beacon)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("presence endpoint lagged; skipped {skipped} beacons");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(PresenceError::Closed),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
