//! slot.rs
//! Single most-recent-sample mailbox between the link's receive thread and the
//! control loop. Publish swaps in a freshly allocated cell; snapshot is a wait-free
//! pointer load, so the reader can never observe a half-written record.
//! A new arrival unconditionally overwrites; the loop only ever wants the latest
//! sample, so anything in between is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::telemetry::TelemetryRecord;

/// One published cell: the record plus receive-side metadata.
#[derive(Debug, Clone)]
pub struct TelemetryUpdate {
    pub record: TelemetryRecord,
    /// Receiver-assigned, monotonically increasing. 0 = nothing ever arrived.
    pub seq: u64,
    /// None only for the initial zero cell.
    pub received_at: Option<Instant>,
}

/// Link-health classification of the slot contents, driven by the age of the
/// last publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Lost,
}

impl Freshness {
    pub fn label(self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessConfig {
    pub stale_after: Duration,
    pub lost_after: Duration,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_millis(300),
            lost_after: Duration::from_secs(2),
        }
    }
}

/// Writer: the receive handler only. Reader: the control loop only.
pub struct TelemetrySlot {
    cell: ArcSwap<TelemetryUpdate>,
    seq: AtomicU64,
}

impl TelemetrySlot {
    pub fn new() -> Self {
        Self {
            cell: ArcSwap::from_pointee(TelemetryUpdate {
                record: TelemetryRecord::ZERO,
                seq: 0,
                received_at: None,
            }),
            seq: AtomicU64::new(0),
        }
    }

    /// Called from the receive thread. Must not block: builds the new cell off to
    /// the side and publishes it with a single pointer store. Returns the seq
    /// assigned to this publication.
    pub fn publish(&self, record: TelemetryRecord) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.cell.store(Arc::new(TelemetryUpdate {
            record,
            seq,
            received_at: Some(Instant::now()),
        }));
        seq
    }

    /// Called from the control loop. Wait-free; returns the most recent fully
    /// published cell, or the zero cell if nothing has ever arrived.
    pub fn snapshot(&self) -> Arc<TelemetryUpdate> {
        self.cell.load_full()
    }

    pub fn freshness(&self, now: Instant, cfg: &FreshnessConfig) -> Freshness {
        match self.snapshot().received_at {
            None => Freshness::Lost,
            Some(at) => {
                let age = now.saturating_duration_since(at);
                if age < cfg.stale_after {
                    Freshness::Fresh
                } else if age < cfg.lost_after {
                    Freshness::Stale
                } else {
                    Freshness::Lost
                }
            }
        }
    }
}

impl Default for TelemetrySlot {
    fn default() -> Self {
        Self::new()
    }
}
