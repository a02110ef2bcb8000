//! control_loop.rs
//! The periodic consumer loop: snapshot the slot, run both axis transforms, command
//! the servos. Scheduled with SpinSleeper at a fixed period; integration uses the
//! measured inter-tick interval, so a late wakeup costs resolution, not calibration.
//! On telemetry loss the configured fail-safe takes over instead of integrating
//! arbitrarily old rates forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::tracker::TrackerCounters;
use crate::tracker::axis::{AxisConfig, AxisController};
use crate::tracker::servo::{Actuator, ServoError};
use crate::tracker::slot::{Freshness, FreshnessConfig, TelemetrySlot};
use crate::util::trace::{TraceEvent, TraceRecorder};

/// What to do while the slot is classified Lost.
#[derive(Debug, Clone, Copy)]
pub enum FailSafe {
    /// Freeze both integrators; servos hold their last position.
    Hold,
    /// Drift both axes back to center at the given rate.
    Recenter { rate_deg_per_sec: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct ControlConfig {
    pub period: Duration,
    pub freshness: FreshnessConfig,
    pub failsafe: FailSafe,
    pub pan: AxisConfig,
    pub tilt: AxisConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            freshness: FreshnessConfig::default(),
            failsafe: FailSafe::Hold,
            pan: AxisConfig::pan(),
            tilt: AxisConfig::tilt(),
        }
    }
}

pub struct ControlLoop<A: Actuator> {
    cfg: ControlConfig,
    slot: Arc<TelemetrySlot>,
    pan: AxisController,
    tilt: AxisController,
    pan_servo: A,
    tilt_servo: A,
    counters: Arc<TrackerCounters>,
    trace: Arc<TraceRecorder>,
    last_freshness: Freshness,
}

impl<A: Actuator> ControlLoop<A> {
    /// Attaches both servos (they snap to their start positions) and arms the loop.
    pub fn new(
        cfg: ControlConfig,
        slot: Arc<TelemetrySlot>,
        mut pan_servo: A,
        mut tilt_servo: A,
        counters: Arc<TrackerCounters>,
        trace: Arc<TraceRecorder>,
    ) -> Result<Self, ServoError> {
        pan_servo.attach()?;
        tilt_servo.attach()?;
        Ok(Self {
            pan: AxisController::new(cfg.pan),
            tilt: AxisController::new(cfg.tilt),
            cfg,
            slot,
            pan_servo,
            tilt_servo,
            counters,
            trace,
            last_freshness: Freshness::Lost,
        })
    }

    pub fn positions(&self) -> (f32, f32) {
        (self.pan.position(), self.tilt.position())
    }

    /// Periodic loop; exits when `running` clears. Late wakeups are counted as
    /// deadline misses and the schedule resynchronizes on the next period.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        let period = self.cfg.period;
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

        let mut next_deadline = Instant::now() + period;
        let mut last_tick = Instant::now();

        info!("[control] loop started, period {:?}", period);
        while running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            } else {
                self.counters.deadline_misses.fetch_add(1, Ordering::Relaxed);
            }

            let tick = Instant::now();
            let dt = tick.duration_since(last_tick);
            last_tick = tick;

            self.step(tick, dt);
            next_deadline += period;
        }
        info!("[control] loop stopped");
    }

    /// One control iteration, separated from the scheduler so the transform is
    /// testable with an explicit clock.
    pub fn step(&mut self, now: Instant, dt: Duration) {
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let update = self.slot.snapshot();
        let freshness = self.slot.freshness(now, &self.cfg.freshness);
        self.note_freshness(freshness);

        match freshness {
            Freshness::Lost => match self.cfg.failsafe {
                FailSafe::Hold => {}
                FailSafe::Recenter { rate_deg_per_sec } => {
                    self.pan.recenter(rate_deg_per_sec, dt);
                    self.tilt.recenter(rate_deg_per_sec, dt);
                }
            },
            // Stale records are still the best information available; keep
            // tracking them until the loss threshold declares the link gone.
            Freshness::Fresh | Freshness::Stale => {
                self.pan.integrate(update.record.rate(self.pan.axis()), dt);
                self.tilt.integrate(update.record.rate(self.tilt.axis()), dt);
            }
        }

        let pan_deg = self.pan.servo_angle();
        let tilt_deg = self.tilt.servo_angle();
        self.pan_servo.write(pan_deg);
        self.tilt_servo.write(tilt_deg);

        self.trace.record(TraceEvent::ControlTick {
            ts_ns: self.trace.now_ns(),
            seq: update.seq,
            pan_deg,
            tilt_deg,
            freshness: freshness.label(),
        });
        debug!(
            "[control] seq={} pan={:.2} tilt={:.2} ({})",
            update.seq,
            pan_deg,
            tilt_deg,
            freshness.label()
        );
    }

    fn note_freshness(&mut self, freshness: Freshness) {
        if freshness == self.last_freshness {
            return;
        }
        match freshness {
            Freshness::Fresh => info!("[control] telemetry fresh"),
            Freshness::Stale => warn!("[control] telemetry stale, tracking last record"),
            Freshness::Lost => warn!("[control] telemetry lost, fail-safe engaged"),
        }
        self.last_freshness = freshness;
    }
}
