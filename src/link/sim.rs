//! sim.rs
//! In-process radio: a hub routes datagrams between registered endpoints over bounded
//! channels, with Bernoulli loss to model the unreliable air interface.
//! - send is non-blocking; a full endpoint queue counts as a lost datagram
//! - each endpoint runs its receive handler on a dedicated elevated-priority thread,
//!   so delivery genuinely preempts the consumer's control loop

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::Mutex;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use super::{DatagramLink, DeliveryReport, DeliveryStatus, LinkError, PeerAddr, ReceiveHandler};

const ENDPOINT_QUEUE: usize = 256;
const REPORT_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct SimLinkConfig {
    /// Probability that any single datagram is dropped in flight.
    pub loss_probability: f64,
}

impl Default for SimLinkConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
        }
    }
}

struct Datagram {
    source: PeerAddr,
    payload: Vec<u8>,
}

struct HubShared {
    cfg: SimLinkConfig,
    endpoints: DashMap<PeerAddr, Sender<Datagram>>,
    forwarded: AtomicU64,
    lost: AtomicU64,
}

/// Routing core shared by every simulated endpoint.
pub struct SimHub {
    shared: Arc<HubShared>,
}

impl SimHub {
    pub fn new(cfg: SimLinkConfig) -> Self {
        Self {
            shared: Arc::new(HubShared {
                cfg,
                endpoints: DashMap::new(),
                forwarded: AtomicU64::new(0),
                lost: AtomicU64::new(0),
            }),
        }
    }

    /// Register `addr` on the hub and hand back its endpoint. Registration is the
    /// one-time peer setup; steady-state traffic never touches the map structure.
    pub fn endpoint(&self, addr: PeerAddr) -> SimLink {
        let (tx, rx) = bounded(ENDPOINT_QUEUE);
        self.shared.endpoints.insert(addr, tx);
        let (report_tx, report_rx) = bounded(REPORT_QUEUE);
        SimLink {
            addr,
            shared: self.shared.clone(),
            rx,
            report_tx,
            report_rx,
            rx_thread: Mutex::new(None),
        }
    }

    pub fn forwarded(&self) -> u64 {
        self.shared.forwarded.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.shared.lost.load(Ordering::Relaxed)
    }
}

/// One node's attachment to the simulated radio.
pub struct SimLink {
    addr: PeerAddr,
    shared: Arc<HubShared>,
    rx: Receiver<Datagram>,
    report_tx: Sender<DeliveryReport>,
    report_rx: Receiver<DeliveryReport>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SimLink {
    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    fn report(&self, peer: PeerAddr, status: DeliveryStatus) {
        // Unread reports are dropped; the sender must never block on its own feedback.
        let _ = self.report_tx.try_send(DeliveryReport { peer, status });
    }

    /// Detach from the hub and stop the receive thread. Idempotent.
    pub fn shutdown(&self) {
        self.shared.endpoints.remove(&self.addr);
        if let Some(handle) = self.rx_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl DatagramLink for SimLink {
    fn send(&self, peer: PeerAddr, payload: &[u8]) -> Result<(), LinkError> {
        let Some(target) = self.shared.endpoints.get(&peer) else {
            return Err(LinkError::UnknownPeer(peer));
        };

        // The air interface: a loss draw, then a bounded queue standing in for the
        // receiver's radio buffer. Either failure mode is reported, not retried.
        if rand::random_bool(self.shared.cfg.loss_probability) {
            self.shared.lost.fetch_add(1, Ordering::Relaxed);
            self.report(peer, DeliveryStatus::Failed);
            return Ok(());
        }

        let datagram = Datagram {
            source: self.addr,
            payload: payload.to_vec(),
        };
        match target.try_send(datagram) {
            Ok(()) => {
                self.shared.forwarded.fetch_add(1, Ordering::Relaxed);
                self.report(peer, DeliveryStatus::Delivered);
            }
            Err(e) => {
                self.shared.lost.fetch_add(1, Ordering::Relaxed);
                self.report(peer, DeliveryStatus::Failed);
                debug!("[SimLink {}] queue full for {}: {:?}", self.addr, peer, e);
            }
        }
        Ok(())
    }

    fn reports(&self) -> &Receiver<DeliveryReport> {
        &self.report_rx
    }

    fn start_receive(&self, mut handler: ReceiveHandler) -> Result<(), LinkError> {
        let mut guard = self.rx_thread.lock();
        if guard.is_some() {
            return Err(LinkError::HandlerRunning);
        }

        let rx = self.rx.clone();
        let addr = self.addr;
        let handle = thread::Builder::new()
            .name(format!("sim-rx-{addr}"))
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if priority.is_err() {
                    warn!("[SimLink {addr}] receive thread running without elevated priority");
                }
                // Exits when the hub entry (the only sender) is removed.
                while let Ok(datagram) = rx.recv() {
                    handler(datagram.source, &datagram.payload);
                }
                debug!("[SimLink {addr}] receive thread stopped");
            })?;

        *guard = Some(handle);
        Ok(())
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const A: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc0]);
    const B: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc1]);

    #[test]
    fn delivers_datagrams_between_endpoints() {
        let hub = SimHub::new(SimLinkConfig::default());
        let sender = hub.endpoint(A);
        let receiver = hub.endpoint(B);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_rx = seen.clone();
        receiver
            .start_receive(Box::new(move |source, payload| {
                assert_eq!(source, A);
                assert_eq!(payload, &[1, 2, 3]);
                seen_rx.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        for _ in 0..10 {
            sender.send(B, &[1, 2, 3]).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 10);
        assert_eq!(hub.forwarded(), 10);
        assert_eq!(hub.lost(), 0);
    }

    #[test]
    fn total_loss_reports_failure_and_delivers_nothing() {
        let hub = SimHub::new(SimLinkConfig {
            loss_probability: 1.0,
        });
        let sender = hub.endpoint(A);
        let _receiver = hub.endpoint(B);

        sender.send(B, &[9]).unwrap();
        let report = sender
            .reports()
            .recv_timeout(Duration::from_millis(100))
            .unwrap();
        assert_eq!(report.peer, B);
        assert_eq!(report.status, DeliveryStatus::Failed);
        assert_eq!(hub.lost(), 1);
        assert_eq!(hub.forwarded(), 0);
    }

    #[test]
    fn unknown_peer_is_a_transport_error() {
        let hub = SimHub::new(SimLinkConfig::default());
        let sender = hub.endpoint(A);
        assert!(matches!(
            sender.send(B, &[0]),
            Err(LinkError::UnknownPeer(p)) if p == B
        ));
    }

    #[test]
    fn second_receive_handler_is_rejected() {
        let hub = SimHub::new(SimLinkConfig::default());
        let link = hub.endpoint(A);
        link.start_receive(Box::new(|_, _| {})).unwrap();
        assert!(matches!(
            link.start_receive(Box::new(|_, _| {})),
            Err(LinkError::HandlerRunning)
        ));
    }
}
