//! UDP observer endpoint: the dashboard end of the cross-process channel.
//!
//! The dashboard binds an ephemeral UDP port and sends every frame it posts
//! to the kiosk's presence port.  The kiosk remembers the address it heard
//! from and pushes its heartbeats back to it, so a dashboard only receives
//! beacons while it keeps polling.
//!
//! Datagrams that fail to decode, name another channel, or echo our own
//! instance id are dropped.

use std::net::SocketAddr;

use async_trait::async_trait;
use scan_core::{PresenceBeacon, PresenceChannel, PresenceError, PresenceFrame};
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Largest presence datagram we accept.
const MAX_DATAGRAM: usize = 1024;

/// Errors that can occur while setting up the observer endpoint.
#[derive(Debug, Error)]
pub enum ObserverNetworkError {
    /// The kiosk address did not resolve.
    #[error("cannot resolve kiosk address {addr:?}: {reason}")]
    Resolve { addr: String, reason: String },
    /// The local socket could not be bound.
    #[error("failed to bind observer socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Dashboard-side [`PresenceChannel`] polling one kiosk over UDP.
pub struct UdpPresenceObserver {
    channel: String,
    instance: Uuid,
    socket: UdpSocket,
    kiosk: SocketAddr,
}

impl UdpPresenceObserver {
    /// Resolves `kiosk` (e.g. `"10.0.0.5:24810"` or `"portal.local:24810"`)
    /// and binds an ephemeral local port of the matching address family.
    pub async fn connect(
        kiosk: &str,
        channel: impl Into<String>,
    ) -> Result<Self, ObserverNetworkError> {
        let resolve_error = |reason: String| ObserverNetworkError::Resolve {
            addr: kiosk.to_string(),
            reason,
        };
        let kiosk_addr = lookup_host(kiosk)
            .await
            .map_err(|e| resolve_error(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_error("no addresses".to_string()))?;
        let local: SocketAddr = if kiosk_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Self::bind(local, kiosk_addr, channel).await
    }

    /// Binds `local` and polls the kiosk at `kiosk`.
    pub async fn bind(
        local: SocketAddr,
        kiosk: SocketAddr,
        channel: impl Into<String>,
    ) -> Result<Self, ObserverNetworkError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| ObserverNetworkError::BindFailed { addr: local, source })?;
        let observer = Self {
            channel: channel.into(),
            instance: Uuid::new_v4(),
            socket,
            kiosk,
        };
        info!("polling kiosk presence at {kiosk}");
        Ok(observer)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn kiosk_addr(&self) -> SocketAddr {
        self.kiosk
    }
}

#[async_trait]
impl PresenceChannel for UdpPresenceObserver {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn post(&self, beacon: PresenceBeacon) -> Result<(), PresenceError> {
        let bytes = PresenceFrame::new(self.channel.clone(), self.instance, beacon).encode()?;
        self.socket.send_to(&bytes, self.kiosk).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<PresenceBeacon, PresenceError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                // An ICMP port-unreachable from a kiosk that is down surfaces
                // here on some platforms; it carries no beacon.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    trace!("kiosk port unreachable");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match PresenceFrame::decode(&buf[..len]) {
                Ok(frame) if frame.is_for(&self.channel, self.instance) => return Ok(frame.beacon),
                Ok(frame) => trace!("ignoring presence frame for {} from {src}", frame.channel),
                Err(e) => debug!("failed to decode presence datagram from {src}: {e}"),
            }
        }
    }
}
