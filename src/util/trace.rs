//! trace.rs
//! Non-blocking event trace with background CSV export.
//!
//! Producers (send loop, receive handler, control loop) push into a bounded
//! lock-free queue and return immediately; a consumer thread drains the queue,
//! batches rows, and flushes periodically. Queue-full drops are counted, never
//! blocked on: the receive handler runs above the control loop and must not wait.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Serialize;

use crate::link::PeerAddr;

const TRACE_CAPACITY: usize = 16_384;
const DRAIN_BATCH: usize = 256;
const CONSUMER_POLL_MS: u64 = 5;
const FLUSH_BATCHES: usize = 8;

#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// Producer tick: one sample fanned out to `peers` link targets.
    SampleSent {
        ts_ns: u64,
        seq: u64,
        peers: u32,
        rejected: u32,
    },
    /// Asynchronous send-completion outcome for one peer.
    Delivery {
        ts_ns: u64,
        peer: PeerAddr,
        delivered: bool,
    },
    /// Consumer receive handler published a record into the slot.
    PacketReceived { ts_ns: u64, seq: u64, source: PeerAddr },
    /// Payload failed the length check and was dropped before decode.
    PacketRejected { ts_ns: u64, len: usize },
    /// One control-loop iteration.
    ControlTick {
        ts_ns: u64,
        seq: u64,
        pan_deg: f32,
        tilt_deg: f32,
        freshness: &'static str,
    },
}

#[derive(Debug, Serialize)]
struct CsvRow {
    ts_ns: u64,
    seq: u64,
    event: &'static str,
    detail: String,
    value: f64,
}

impl TraceEvent {
    fn to_row(&self) -> CsvRow {
        match *self {
            TraceEvent::SampleSent {
                ts_ns,
                seq,
                peers,
                rejected,
            } => CsvRow {
                ts_ns,
                seq,
                event: "sample_sent",
                detail: format!("peers={peers} rejected={rejected}"),
                value: peers as f64,
            },
            TraceEvent::Delivery {
                ts_ns,
                peer,
                delivered,
            } => CsvRow {
                ts_ns,
                seq: 0,
                event: "delivery",
                detail: peer.to_string(),
                value: if delivered { 1.0 } else { 0.0 },
            },
            TraceEvent::PacketReceived { ts_ns, seq, source } => CsvRow {
                ts_ns,
                seq,
                event: "packet_received",
                detail: source.to_string(),
                value: 0.0,
            },
            TraceEvent::PacketRejected { ts_ns, len } => CsvRow {
                ts_ns,
                seq: 0,
                event: "packet_rejected",
                detail: format!("len={len}"),
                value: len as f64,
            },
            TraceEvent::ControlTick {
                ts_ns,
                seq,
                pan_deg,
                tilt_deg,
                freshness,
            } => CsvRow {
                ts_ns,
                seq,
                event: "control_tick",
                detail: format!("pan={pan_deg:.2} tilt={tilt_deg:.2} {freshness}"),
                value: pan_deg as f64,
            },
        }
    }
}

pub struct TraceRecorder {
    queue: Arc<ArrayQueue<TraceEvent>>,
    run_start: Instant,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(TRACE_CAPACITY)),
            run_start: Instant::now(),
            dropped: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            consumer: Mutex::new(None),
        }
    }

    /// Nanoseconds since recorder creation; the common timebase for all rows.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    /// Lock-free push; drops (and counts) when the queue is full.
    #[inline]
    pub fn record(&self, event: TraceEvent) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Spawn the consumer thread draining the queue into `output_csv`.
    pub fn start_exporter(&self, output_csv: PathBuf) {
        let queue = self.queue.clone();
        let running = self.running.clone();
        let dropped = self.dropped.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            let file = match File::create(&output_csv) {
                Ok(f) => f,
                Err(e) => {
                    error!("failed to create trace csv {:?}: {}", output_csv, e);
                    return;
                }
            };
            let mut wtr = Writer::from_writer(BufWriter::new(file));
            let mut flush_counter = 0usize;

            while running.load(Ordering::SeqCst) {
                let mut any = false;
                for _ in 0..DRAIN_BATCH {
                    match queue.pop() {
                        Some(event) => {
                            any = true;
                            wtr.serialize(event.to_row()).ok();
                        }
                        None => break,
                    }
                }
                if any {
                    flush_counter += 1;
                    if flush_counter >= FLUSH_BATCHES {
                        wtr.flush().ok();
                        flush_counter = 0;
                    }
                } else {
                    thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                }
            }

            // Final drain after shutdown is requested.
            while let Some(event) = queue.pop() {
                wtr.serialize(event.to_row()).ok();
            }
            wtr.flush().ok();
            debug!(
                "[trace] exporter exiting, dropped={}",
                dropped.load(Ordering::Relaxed)
            );
        });

        *self.consumer.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.consumer.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TraceRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_export_to_csv() {
        let dir = std::env::temp_dir().join("gimbal_tracker_trace_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("trace.csv");

        let recorder = TraceRecorder::new();
        recorder.start_exporter(path.clone());
        for seq in 1..=20 {
            recorder.record(TraceEvent::ControlTick {
                ts_ns: recorder.now_ns(),
                seq,
                pan_deg: 90.0,
                tilt_deg: 90.0,
                freshness: "fresh",
            });
        }
        recorder.stop();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 21); // header + 20 rows
        assert!(contents.contains("control_tick"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn queue_overflow_is_counted_not_blocking() {
        let recorder = TraceRecorder::new();
        // No exporter running, so the queue eventually fills.
        for _ in 0..(TRACE_CAPACITY + 10) {
            recorder.record(TraceEvent::PacketRejected { ts_ns: 0, len: 3 });
        }
        assert_eq!(recorder.dropped(), 10);
    }
}
