//! transmitter.rs
//! Periodic sampling/send loop for the producer node.
//! - SpinSleeper keeps the cadence; late wakeups are counted, not compensated
//! - the identical payload goes to every registered peer independently
//! - delivery reports are drained between ticks into a per-peer last-outcome map;
//!   failures are logged and counted, never retried

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::link::{DatagramLink, DeliveryStatus, PeerAddr};
use crate::sender::sampler::SampleSource;
use crate::util::trace::{TraceEvent, TraceRecorder};

#[derive(Default)]
pub struct SenderCounters {
    pub samples: AtomicU64,
    pub send_errors: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub deadline_misses: AtomicU64,
}

impl SenderCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    pub period: Duration,
    pub peers: Vec<PeerAddr>,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            peers: Vec::new(),
        }
    }
}

pub struct Transmitter<L: DatagramLink, S: SampleSource> {
    link: L,
    sampler: S,
    cfg: TransmitterConfig,
    outcomes: Arc<DashMap<PeerAddr, DeliveryStatus>>,
    counters: Arc<SenderCounters>,
    trace: Arc<TraceRecorder>,
}

impl<L: DatagramLink, S: SampleSource> Transmitter<L, S> {
    pub fn new(
        link: L,
        sampler: S,
        cfg: TransmitterConfig,
        counters: Arc<SenderCounters>,
        trace: Arc<TraceRecorder>,
    ) -> Self {
        Self {
            link,
            sampler,
            cfg,
            outcomes: Arc::new(DashMap::new()),
            counters,
            trace,
        }
    }

    /// Last known delivery outcome per peer, updated as reports drain.
    pub fn outcomes(&self) -> Arc<DashMap<PeerAddr, DeliveryStatus>> {
        self.outcomes.clone()
    }

    /// Periodic loop; exits when `running` clears.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        let period = self.cfg.period;
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + period;
        let mut seq: u64 = 0;

        info!(
            "[sender] loop started, period {:?}, {} peer(s)",
            period,
            self.cfg.peers.len()
        );
        while running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            } else {
                self.counters.deadline_misses.fetch_add(1, Ordering::Relaxed);
            }

            seq += 1;
            let record = self.sampler.poll();
            self.counters.samples.fetch_add(1, Ordering::Relaxed);
            let payload = record.encode();

            let mut rejected = 0u32;
            for &peer in &self.cfg.peers {
                if let Err(e) = self.link.send(peer, &payload) {
                    rejected += 1;
                    self.counters.send_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("[sender] send to {peer} not accepted: {e}");
                }
            }
            self.trace.record(TraceEvent::SampleSent {
                ts_ns: self.trace.now_ns(),
                seq,
                peers: self.cfg.peers.len() as u32,
                rejected,
            });

            self.drain_reports();
            next_deadline += period;
        }
        info!("[sender] loop stopped");
    }

    fn drain_reports(&self) {
        while let Ok(report) = self.link.reports().try_recv() {
            self.outcomes.insert(report.peer, report.status);
            match report.status {
                DeliveryStatus::Delivered => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryStatus::Failed => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    debug!("[sender] delivery to {} failed", report.peer);
                }
            }
            self.trace.record(TraceEvent::Delivery {
                ts_ns: self.trace.now_ns(),
                peer: report.peer,
                delivered: report.status == DeliveryStatus::Delivered,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::sim::{SimHub, SimLinkConfig};
    use crate::sender::sampler::SimImu;
    use crate::telemetry::WIRE_SIZE;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const SENDER: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc0]);
    const TRACKER: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc1]);

    fn run_for(
        loss: f64,
        window: Duration,
    ) -> (Arc<SenderCounters>, Arc<DashMap<PeerAddr, DeliveryStatus>>, Arc<AtomicUsize>) {
        let hub = SimHub::new(SimLinkConfig {
            loss_probability: loss,
        });
        let link = hub.endpoint(SENDER);
        let tracker_link = hub.endpoint(TRACKER);

        let received = Arc::new(AtomicUsize::new(0));
        let received_rx = received.clone();
        tracker_link
            .start_receive(Box::new(move |_, payload| {
                assert_eq!(payload.len(), WIRE_SIZE);
                received_rx.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let counters = Arc::new(SenderCounters::new());
        let mut tx = Transmitter::new(
            link,
            SimImu::stationary([0.0; 3], 0.05),
            TransmitterConfig {
                period: Duration::from_millis(20),
                peers: vec![TRACKER],
            },
            counters.clone(),
            Arc::new(TraceRecorder::new()),
        );
        let outcomes = tx.outcomes();

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::spawn(move || tx.run(flag));
        thread::sleep(window);
        running.store(false, Ordering::Release);
        handle.join().unwrap();
        thread::sleep(Duration::from_millis(50)); // let the rx thread drain

        (counters, outcomes, received)
    }

    #[test]
    fn lossless_link_delivers_every_sample_to_the_peer() {
        let (counters, outcomes, received) = run_for(0.0, Duration::from_millis(300));
        let samples = counters.samples.load(Ordering::Relaxed);
        assert!(samples >= 5);
        assert_eq!(received.load(Ordering::SeqCst) as u64, samples);
        assert_eq!(
            outcomes.get(&TRACKER).map(|e| *e.value()),
            Some(DeliveryStatus::Delivered)
        );
        assert_eq!(counters.send_errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dead_air_reports_failures_without_retries_or_errors() {
        let (counters, outcomes, received) = run_for(1.0, Duration::from_millis(200));
        assert_eq!(received.load(Ordering::SeqCst), 0);
        assert!(counters.failed.load(Ordering::Relaxed) > 0);
        // send was still accepted each tick; loss is an outcome, not an error
        assert_eq!(counters.send_errors.load(Ordering::Relaxed), 0);
        assert_eq!(
            outcomes.get(&TRACKER).map(|e| *e.value()),
            Some(DeliveryStatus::Failed)
        );
    }
}
