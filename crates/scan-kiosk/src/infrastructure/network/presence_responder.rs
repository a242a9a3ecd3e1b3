//! UDP presence responder: the kiosk end of the cross-process channel.
//!
//! The kiosk binds a UDP socket on the presence port (default 24810).
//! Dashboards bind an ephemeral port and send `status-request` frames to it.
//! For every valid frame on our channel the responder:
//!
//! 1. Records the sender's address as a live peer.
//! 2. Hands the beacon to whoever is receiving (the presence announcer),
//!    which answers a request with `portal-online`.
//!
//! [`PresenceChannel::post`] sends the frame to every peer heard from within
//! the peer TTL.  Peers that stop polling age out silently, so a closed
//! dashboard costs nothing after a few seconds.
//!
//! Frames are the JSON [`PresenceFrame`]s from `scan-core`.  Datagrams that
//! fail to decode, name another channel, or echo our own instance id are
//! dropped without a reply.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scan_core::{PresenceBeacon, PresenceChannel, PresenceError, PresenceFrame};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::infrastructure::decoder::lock_unpoisoned;

/// Largest presence datagram we accept.
const MAX_DATAGRAM: usize = 1024;

/// Error type for binding the presence responder.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("failed to bind presence socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid presence bind address {0:?}")]
    InvalidAddress(String),
}

/// Kiosk-side [`PresenceChannel`] over a bound UDP socket.
pub struct UdpPresenceResponder {
    channel: String,
    instance: Uuid,
    socket: UdpSocket,
    peers: Mutex<HashMap<SocketAddr, Instant>>,
    peer_ttl: Duration,
}

impl UdpPresenceResponder {
    /// Binds `bind_address:port` and serves presence on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponderError::InvalidAddress`] if the address does not
    /// parse and [`ResponderError::BindFailed`] if the port is taken.
    pub async fn bind(
        bind_address: &str,
        port: u16,
        channel: impl Into<String>,
        peer_ttl: Duration,
    ) -> Result<Self, ResponderError> {
        let addr: SocketAddr = format!("{bind_address}:{port}")
            .parse()
            .map_err(|_| ResponderError::InvalidAddress(bind_address.to_string()))?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ResponderError::BindFailed { addr, source })?;
        let responder = Self {
            channel: channel.into(),
            instance: Uuid::new_v4(),
            socket,
            peers: Mutex::new(HashMap::new()),
            peer_ttl,
        };
        info!(
            "presence responder listening on UDP {}",
            responder.local_addr().unwrap_or(addr)
        );
        Ok(responder)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Peers that have polled within the TTL, oldest entries pruned.
    pub fn live_peers(&self) -> Vec<SocketAddr> {
        let now = Instant::now();
        let mut peers = lock_unpoisoned(&self.peers);
        peers.retain(|_, seen| now.duration_since(*seen) <= self.peer_ttl);
        peers.keys().copied().collect()
    }

    fn remember(&self, peer: SocketAddr) {
        let fresh = lock_unpoisoned(&self.peers)
            .insert(peer, Instant::now())
            .is_none();
        if fresh {
            debug!("presence peer {peer} joined");
        }
    }
}

#[async_trait]
impl PresenceChannel for UdpPresenceResponder {
    fn name(&self) -> &str {
        &self.channel
    }

    async fn post(&self, beacon: PresenceBeacon) -> Result<(), PresenceError> {
        let bytes = PresenceFrame::new(self.channel.clone(), self.instance, beacon).encode()?;
        for peer in self.live_peers() {
            if let Err(e) = self.socket.send_to(&bytes, peer).await {
                warn!("failed to send {} to {peer}: {e}", beacon.as_tag());
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<PresenceBeacon, PresenceError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            match PresenceFrame::decode(&buf[..len]) {
                Ok(frame) if frame.is_for(&self.channel, self.instance) => {
                    self.remember(src);
                    return Ok(frame.beacon);
                }
                Ok(frame) => trace!("ignoring presence frame for {} from {src}", frame.channel),
                Err(e) => debug!("failed to decode presence datagram from {src}: {e}"),
            }
        }
    }
}
