//! Paired simulation entry point: both nodes in one process, joined by the
//! simulated lossy radio.
//!
//! The producer thread samples a scripted IMU and fans records out at 10 Hz; the
//! consumer's receive thread publishes into the telemetry slot and its control
//! loop tracks the motion on two simulated servos at 100 Hz.
//!
//! Usage: `gimbal_tracker [duration_secs] [loss_probability]`
//! Outputs `data/logs/trace.csv` (event trace) and a run summary on stdout.

use std::env;
use std::fs::create_dir_all;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use log::{error, info};

use gimbal_tracker::link::sim::{SimHub, SimLinkConfig};
use gimbal_tracker::link::PeerAddr;
use gimbal_tracker::sender::{SenderCounters, SimImu, Transmitter, TransmitterConfig};
use gimbal_tracker::tracker::control_loop::{ControlConfig, ControlLoop};
use gimbal_tracker::tracker::servo::SimServo;
use gimbal_tracker::tracker::slot::TelemetrySlot;
use gimbal_tracker::tracker::{TrackerCounters, attach_receiver};
use gimbal_tracker::util::trace::TraceRecorder;

const SENDER_ADDR: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc0]);
const TRACKER_ADDR: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc1]);

const DEFAULT_DURATION_SECS: u64 = 10;
const DEFAULT_LOSS: f64 = 0.05;
const SEND_PERIOD: Duration = Duration::from_millis(100);

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let duration_secs = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DURATION_SECS);
    let loss_probability = args
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(DEFAULT_LOSS);

    info!(
        "=== GIMBAL TRACKER SIMULATION: {}s, loss {:.0}% ===",
        duration_secs,
        loss_probability * 100.0
    );

    if let Err(e) = create_dir_all("data/logs") {
        error!("failed to create data/logs: {e}");
        return;
    }
    let trace = Arc::new(TraceRecorder::new());
    trace.start_exporter("data/logs/trace.csv".into());

    let hub = SimHub::new(SimLinkConfig { loss_probability });
    let sender_link = hub.endpoint(SENDER_ADDR);
    let tracker_link = hub.endpoint(TRACKER_ADDR);

    // Consumer node: receive handler + control loop over the shared slot.
    let slot = Arc::new(TelemetrySlot::new());
    let tracker_counters = Arc::new(TrackerCounters::new());
    if let Err(e) = attach_receiver(
        &tracker_link,
        slot.clone(),
        tracker_counters.clone(),
        trace.clone(),
    ) {
        error!("failed to start receive thread: {e}");
        return;
    }

    let pan = SimServo::new("pan", 0.0);
    let tilt = SimServo::new("tilt", 0.0);
    let (pan_probe, tilt_probe) = (pan.probe(), tilt.probe());
    let mut control = match ControlLoop::new(
        ControlConfig::default(),
        slot,
        pan,
        tilt,
        tracker_counters.clone(),
        trace.clone(),
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("servo attach failed: {e}");
            return;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let control_handle = {
        let flag = running.clone();
        thread::spawn(move || control.run(flag))
    };

    // Producer node: scripted motion (slow yaw sweep, slower roll sweep) on top
    // of a biased, noisy sensor at rest.
    let imu = SimImu::stationary([0.05, -0.03, 0.02], 0.1).with_motion(Box::new(|tick| {
        let t = tick as f32 * SEND_PERIOD.as_secs_f32();
        [10.0 * (0.5 * t).sin(), 0.0, 20.0 * (0.8 * t).sin()]
    }));
    let sender_counters = Arc::new(SenderCounters::new());
    let mut transmitter = Transmitter::new(
        sender_link,
        imu,
        TransmitterConfig {
            period: SEND_PERIOD,
            peers: vec![TRACKER_ADDR],
        },
        sender_counters.clone(),
        trace.clone(),
    );
    let outcomes = transmitter.outcomes();
    let sender_handle = {
        let flag = running.clone();
        thread::spawn(move || transmitter.run(flag))
    };

    thread::sleep(Duration::from_secs(duration_secs));
    info!("[main] time's up, shutting down");
    running.store(false, Ordering::Release);

    let _ = sender_handle.join();
    let _ = control_handle.join();
    tracker_link.shutdown();
    trace.stop();

    println!("--- run summary ---");
    println!(
        "sender:  samples={} delivered={} failed={} send_errors={}",
        sender_counters.samples.load(Ordering::Relaxed),
        sender_counters.delivered.load(Ordering::Relaxed),
        sender_counters.failed.load(Ordering::Relaxed),
        sender_counters.send_errors.load(Ordering::Relaxed),
    );
    println!("link:    forwarded={} lost={}", hub.forwarded(), hub.lost());
    println!(
        "tracker: received={} rejected={} ticks={} deadline_misses={}",
        tracker_counters.received(),
        tracker_counters.rejected(),
        tracker_counters.ticks.load(Ordering::Relaxed),
        tracker_counters.deadline_misses.load(Ordering::Relaxed),
    );
    for entry in outcomes.iter() {
        println!("peer {}: last outcome {:?}", entry.key(), entry.value());
    }
    println!(
        "servos:  pan={:.1}° tilt={:.1}°",
        pan_probe.angle(),
        tilt_probe.angle()
    );
    println!("trace:   data/logs/trace.csv ({} dropped)", trace.dropped());
}
