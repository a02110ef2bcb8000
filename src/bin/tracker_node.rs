//! Consumer node over real sockets: receive telemetry, track it on pan/tilt.
//!
//! Usage: `tracker_node <local-mac> <bind-addr> <peer-mac>=<peer-host:port>...`
//! The sender must be registered so its datagrams are accepted; anything from an
//! unregistered source is dropped by the link.
//!
//! Runs until the process is terminated. Bind or servo-attach failure is fatal.

use std::env;
use std::net::SocketAddr;
use std::process::exit;
use std::sync::{Arc, atomic::AtomicBool};

use log::{error, info};

use gimbal_tracker::link::udp::UdpLink;
use gimbal_tracker::link::PeerAddr;
use gimbal_tracker::tracker::control_loop::{ControlConfig, ControlLoop};
use gimbal_tracker::tracker::servo::SimServo;
use gimbal_tracker::tracker::slot::TelemetrySlot;
use gimbal_tracker::tracker::{TrackerCounters, attach_receiver};
use gimbal_tracker::util::trace::TraceRecorder;

fn usage() -> ! {
    eprintln!("usage: tracker_node <local-mac> <bind-addr> <peer-mac>=<peer-host:port>...");
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
            error!("[tracker] link init failed: {e}");
            exit(1);
        }
    };
    for &(peer, at) in &peers {
        link.register_peer(peer, at);
    }

    let trace = Arc::new(TraceRecorder::new());
    let slot = Arc::new(TelemetrySlot::new());
    let counters = Arc::new(TrackerCounters::new());
    if let Err(e) = attach_receiver(&link, slot.clone(), counters.clone(), trace.clone()) {
        error!("[tracker] failed to start receive thread: {e}");
        exit(1);
    }

    // The physical PWM driver is outside this crate; the simulated servos hold
    // the commanded angles and the trace records every tick.
    let mut control = match ControlLoop::new(
        ControlConfig::default(),
        slot,
        SimServo::new("pan", 0.0),
        SimServo::new("tilt", 0.0),
        counters,
        trace,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("[tracker] servo attach failed: {e}");
            exit(1);
        }
    };

    info!("[tracker] node {} up", local);
    // Runs unconditionally until process termination.
    control.run(Arc::new(AtomicBool::new(true)));
}
