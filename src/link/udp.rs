//! udp.rs
//! Datagram link over real sockets, one process per node. Hardware addresses stay the
//! peer identity on the wire contract; a static peer table maps each one to the socket
//! address it is reachable at.
//! - delivery reports reflect the local send outcome only; UDP gives no air-side ack
//! - receive thread runs at elevated priority with a short read timeout so shutdown
//!   is observed promptly

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use super::{DatagramLink, DeliveryReport, DeliveryStatus, LinkError, PeerAddr, ReceiveHandler};

const REPORT_QUEUE: usize = 64;
const RECV_BUF: usize = 256;
const RECV_POLL: Duration = Duration::from_millis(200);

pub struct UdpLink {
    local: PeerAddr,
    socket: UdpSocket,
    peers: Arc<DashMap<PeerAddr, SocketAddr>>,
    sources: Arc<DashMap<SocketAddr, PeerAddr>>,
    report_tx: Sender<DeliveryReport>,
    report_rx: Receiver<DeliveryReport>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl UdpLink {
    /// Bind the node's socket. Fatal for the node if this fails; there is no
    /// recovery path without operator intervention.
    pub fn bind(local: PeerAddr, bind: SocketAddr) -> Result<Self, LinkError> {
        let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(bind))?;
        let socket: UdpSocket = socket.into();

        info!(
            "[UdpLink {}] bound on {}",
            local,
            socket.local_addr().map_or(bind, |a| a)
        );

        let (report_tx, report_rx) = bounded(REPORT_QUEUE);
        Ok(Self {
            local,
            socket,
            peers: Arc::new(DashMap::new()),
            sources: Arc::new(DashMap::new()),
            report_tx,
            report_rx,
            rx_thread: Mutex::new(None),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// One-time peer setup, before steady-state traffic starts.
    pub fn register_peer(&self, peer: PeerAddr, at: SocketAddr) {
        self.peers.insert(peer, at);
        self.sources.insert(at, peer);
        info!("[UdpLink {}] registered peer {} at {}", self.local, peer, at);
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl DatagramLink for UdpLink {
    fn send(&self, peer: PeerAddr, payload: &[u8]) -> Result<(), LinkError> {
        let Some(target) = self.peers.get(&peer).map(|e| *e.value()) else {
            return Err(LinkError::UnknownPeer(peer));
        };

        match self.socket.send_to(payload, target) {
            Ok(_) => {
                let _ = self.report_tx.try_send(DeliveryReport {
                    peer,
                    status: DeliveryStatus::Delivered,
                });
                Ok(())
            }
            Err(e) => {
                let _ = self.report_tx.try_send(DeliveryReport {
                    peer,
                    status: DeliveryStatus::Failed,
                });
                Err(LinkError::Io(e))
            }
        }
    }

    fn reports(&self) -> &Receiver<DeliveryReport> {
        &self.report_rx
    }

    fn start_receive(&self, mut handler: ReceiveHandler) -> Result<(), LinkError> {
        let mut guard = self.rx_thread.lock();
        if guard.is_some() {
            return Err(LinkError::HandlerRunning);
        }

        let socket = self.socket.try_clone()?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let sources = self.sources.clone();
        let running = self.running.clone();
        let local = self.local;

        let handle = thread::Builder::new()
            .name(format!("udp-rx-{local}"))
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if priority.is_err() {
                    warn!("[UdpLink {local}] receive thread running without elevated priority");
                }
                let mut buf = [0u8; RECV_BUF];
                while running.load(Ordering::Acquire) {
                    match socket.recv_from(&mut buf) {
                        Ok((len, from)) => {
                            // Datagrams from unregistered sources are not part of the
                            // peer set; drop them before decode.
                            match sources.get(&from).map(|e| *e.value()) {
                                Some(source) => handler(source, &buf[..len]),
                                None => debug!("[UdpLink {local}] datagram from unknown {from}"),
                            }
                        }
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            warn!("[UdpLink {local}] recv error: {e}");
                        }
                    }
                }
                debug!("[UdpLink {local}] receive thread stopped");
            })?;

        *guard = Some(handle);
        Ok(())
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
