//! Producer node over real sockets: sample, encode, fan out to every peer.
//!
//! Usage: `sender_node <local-mac> <bind-addr> <peer-mac>=<peer-host:port>...`
//! e.g. `sender_node 00:4b:12:2f:c8:c0 0.0.0.0:5800 00:4b:12:2f:c8:c1=192.168.1.40:5801`
//!
//! Runs until the process is terminated. A bind failure is fatal: there is no
//! recovery path without operator intervention.

use std::env;
use std::net::SocketAddr;
use std::process::exit;
use std::sync::{Arc, atomic::AtomicBool};

use log::{error, info};

use gimbal_tracker::link::udp::UdpLink;
use gimbal_tracker::link::PeerAddr;
use gimbal_tracker::sender::{SenderCounters, SimImu, Transmitter, TransmitterConfig};
use gimbal_tracker::util::trace::TraceRecorder;

fn usage() -> ! {
    eprintln!("usage: sender_node <local-mac> <bind-addr> <peer-mac>=<peer-host:port>...");
    exit(2);
}

fn parse_peer(arg: &str) -> Option<(PeerAddr, SocketAddr)> {
    let (mac, at) = arg.split_once('=')?;
    Some((mac.parse().ok()?, at.parse().ok()?))
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        usage();
    }
    let Ok(local) = args[0].parse::<PeerAddr>() else {
        usage();
    };
    let Ok(bind) = args[1].parse::<SocketAddr>() else {
        usage();
    };
    let peers: Vec<(PeerAddr, SocketAddr)> = match args[2..].iter().map(|a| parse_peer(a)).collect()
    {
        Some(peers) => peers,
        None => usage(),
    };

    let link = match UdpLink::bind(local, bind) {
        Ok(link) => link,
        Err(e) => {
            error!("[sender] link init failed: {e}");
            exit(1);
        }
    };
    for &(peer, at) in &peers {
        link.register_peer(peer, at);
    }

    let trace = Arc::new(TraceRecorder::new());
    // The physical IMU driver is outside this crate; the simulated sensor stands
    // in with bias + noise so the node exercises the full wire path.
    let imu = SimImu::stationary([0.05, -0.03, 0.02], 0.1);

    let mut transmitter = Transmitter::new(
        link,
        imu,
        TransmitterConfig {
            peers: peers.iter().map(|&(p, _)| p).collect(),
            ..TransmitterConfig::default()
        },
        Arc::new(SenderCounters::new()),
        trace,
    );

    info!("[sender] node {} up, {} peer(s)", local, peers.len());
    // Runs unconditionally until process termination.
    transmitter.run(Arc::new(AtomicBool::new(true)));
}
