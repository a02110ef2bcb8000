//! Wireless link abstraction: unreliable, connectionless, peer-addressed datagrams.
//!
//! Two implementations share the same contract:
//! - `sim::SimHub` / `sim::SimLink`: in-process hub with configurable loss, used by the
//!   paired simulation and the concurrency tests
//! - `udp::UdpLink`: real sockets, one process per node, peer table maps hardware
//!   addresses to socket addresses
//!
//! Sends are fire-and-forget: `send` only means the request was accepted. The outcome
//! arrives later as a `DeliveryReport` on the link's report channel. Receives are
//! delivered on the link's own thread (spawned at elevated priority); the registered
//! handler must only decode and publish.

pub mod sim;
pub mod udp;

use std::fmt;
use std::str::FromStr;

use crossbeam::channel::Receiver;
use thiserror::Error;

/// Fixed 6-byte hardware address identifying a node on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr(pub [u8; 6]);

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid hardware address '{0}', expected aa:bb:cc:dd:ee:ff")]
pub struct PeerAddrParseError(String);

impl FromStr for PeerAddr {
    type Err = PeerAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| PeerAddrParseError(s.into()))?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| PeerAddrParseError(s.into()))?;
        }
        if parts.next().is_some() {
            return Err(PeerAddrParseError(s.into()));
        }
        Ok(PeerAddr(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Asynchronous send-completion notification, one per accepted send request.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryReport {
    pub peer: PeerAddr,
    pub status: DeliveryStatus,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("peer {0} is not registered on this link")]
    UnknownPeer(PeerAddr),
    #[error("receive handler is already running")]
    HandlerRunning,
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invoked from the link's receive thread for every arriving datagram.
/// Runs with higher scheduling priority than the control loop: decode, publish, return.
pub type ReceiveHandler = Box<dyn FnMut(PeerAddr, &[u8]) + Send>;

pub trait DatagramLink {
    /// Queue a datagram for `peer`. Acceptance is not delivery; the outcome is
    /// reported on [`DatagramLink::reports`].
    fn send(&self, peer: PeerAddr, payload: &[u8]) -> Result<(), LinkError>;

    /// Send-completion notifications. Bounded; unread reports are dropped rather
    /// than blocking the link.
    fn reports(&self) -> &Receiver<DeliveryReport>;

    /// Spawn the receive thread and deliver every arriving datagram to `handler`.
    /// One handler per endpoint for the life of the link.
    fn start_receive(&self, handler: ReceiveHandler) -> Result<(), LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addr_parses_and_displays() {
        let addr: PeerAddr = "00:4b:12:2f:c8:c0".parse().unwrap();
        assert_eq!(addr.0, [0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc0]);
        assert_eq!(addr.to_string(), "00:4b:12:2f:c8:c0");
    }

    #[test]
    fn peer_addr_rejects_malformed_input() {
        assert!("00:4b:12".parse::<PeerAddr>().is_err());
        assert!("00:4b:12:2f:c8:c0:ff".parse::<PeerAddr>().is_err());
        assert!("zz:4b:12:2f:c8:c0".parse::<PeerAddr>().is_err());
    }
}
