//! Consumer node: receive handler → telemetry slot → periodic control loop → servos.
//!
//! The receive handler and the control loop are the node's only two execution
//! contexts; the slot is the only state they share. Everything else (axis
//! integrators, servo handles) is owned by the loop alone.

pub mod axis;
pub mod control_loop;
pub mod servo;
pub mod slot;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::link::{DatagramLink, LinkError};
use crate::telemetry::TelemetryRecord;
use crate::util::trace::{TraceEvent, TraceRecorder};

/// Tracker-side counters, shared between the receive handler and the loop.
#[derive(Default)]
pub struct TrackerCounters {
    pub packets_received: AtomicU64,
    pub packets_rejected: AtomicU64,
    pub ticks: AtomicU64,
    pub deadline_misses: AtomicU64,
}

impl TrackerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.packets_rejected.load(Ordering::Relaxed)
    }
}

/// Wire the link's receive thread to the slot. The handler's whole duty is
/// validate → decode → publish; anything longer belongs in the control loop.
pub fn attach_receiver<L: DatagramLink>(
    link: &L,
    slot: Arc<slot::TelemetrySlot>,
    counters: Arc<TrackerCounters>,
    trace: Arc<TraceRecorder>,
) -> Result<(), LinkError> {
    link.start_receive(Box::new(move |source, payload| {
        match TelemetryRecord::decode(payload) {
            Ok(record) => {
                let seq = slot.publish(record);
                counters.packets_received.fetch_add(1, Ordering::Relaxed);
                trace.record(TraceEvent::PacketReceived {
                    ts_ns: trace.now_ns(),
                    seq,
                    source,
                });
            }
            Err(e) => {
                counters.packets_rejected.fetch_add(1, Ordering::Relaxed);
                trace.record(TraceEvent::PacketRejected {
                    ts_ns: trace.now_ns(),
                    len: payload.len(),
                });
                debug!("[tracker] dropped payload from {source}: {e}");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::sim::{SimHub, SimLinkConfig};
    use crate::link::PeerAddr;
    use std::thread;
    use std::time::{Duration, Instant};

    const SENDER: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc0]);
    const TRACKER: PeerAddr = PeerAddr([0x00, 0x4b, 0x12, 0x2f, 0xc8, 0xc1]);

    #[test]
    fn receive_handler_publishes_valid_and_rejects_undersized() {
        let hub = SimHub::new(SimLinkConfig::default());
        let sender = hub.endpoint(SENDER);
        let tracker_link = hub.endpoint(TRACKER);

        let slot = Arc::new(slot::TelemetrySlot::new());
        let counters = Arc::new(TrackerCounters::new());
        let trace = Arc::new(TraceRecorder::new());
        attach_receiver(&tracker_link, slot.clone(), counters.clone(), trace).unwrap();

        let record = TelemetryRecord {
            accel: [0.0, 0.0, 9.81],
            gyro: [1.0, 0.0, -3.0],
        };
        sender.send(TRACKER, &record.encode()).unwrap();
        sender.send(TRACKER, &[1, 2, 3]).unwrap(); // malformed, must be dropped

        let deadline = Instant::now() + Duration::from_secs(2);
        while counters.rejected() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(counters.received(), 1);
        assert_eq!(counters.rejected(), 1);
        let update = slot.snapshot();
        assert_eq!(update.record, record);
        assert_eq!(update.seq, 1);
    }
}
