//! servo.rs
//! Actuator seam: one rotational degree of freedom that accepts an angle in
//! [0, 180] and holds it until the next write. The physical PWM driver lives
//! behind this trait; the simulation records the commanded angle instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;
use thiserror::Error;

pub const SERVO_MIN_DEG: f32 = 0.0;
pub const SERVO_MAX_DEG: f32 = 180.0;
pub const SERVO_RANGE_DEG: f32 = SERVO_MAX_DEG - SERVO_MIN_DEG;

#[derive(Debug, Error)]
pub enum ServoError {
    #[error("servo '{0}' failed to attach")]
    AttachFailed(&'static str),
}

pub trait Actuator {
    /// One-time bind to the physical channel; snaps to the start position.
    fn attach(&mut self) -> Result<(), ServoError>;

    /// Command an angle. Idempotent, immediate, unacknowledged. Out-of-range
    /// input saturates at the mechanical limits.
    fn write(&mut self, deg: f32);
}

/// Simulated servo holding the last commanded angle in an atomic, so the
/// simulation harness and tests can observe it from other threads.
pub struct SimServo {
    name: &'static str,
    start_deg: f32,
    angle_bits: Arc<AtomicU32>,
    attached: bool,
}

impl SimServo {
    pub fn new(name: &'static str, start_deg: f32) -> Self {
        Self {
            name,
            start_deg,
            angle_bits: Arc::new(AtomicU32::new(start_deg.to_bits())),
            attached: false,
        }
    }

    /// Read-side handle for observers; valid for the life of the servo.
    pub fn probe(&self) -> ServoProbe {
        ServoProbe {
            angle_bits: self.angle_bits.clone(),
        }
    }
}

impl Actuator for SimServo {
    fn attach(&mut self) -> Result<(), ServoError> {
        self.attached = true;
        self.write(self.start_deg);
        Ok(())
    }

    fn write(&mut self, deg: f32) {
        if !self.attached {
            warn!("[{}] write before attach ignored", self.name);
            return;
        }
        let deg = deg.clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
        self.angle_bits.store(deg.to_bits(), Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ServoProbe {
    angle_bits: Arc<AtomicU32>,
}

impl ServoProbe {
    pub fn angle(&self) -> f32 {
        f32::from_bits(self.angle_bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_snaps_to_start_position() {
        let mut servo = SimServo::new("pan", 0.0);
        let probe = servo.probe();
        servo.attach().unwrap();
        assert_eq!(probe.angle(), 0.0);
    }

    #[test]
    fn write_holds_last_angle_and_saturates() {
        let mut servo = SimServo::new("tilt", 90.0);
        let probe = servo.probe();
        servo.attach().unwrap();

        servo.write(45.5);
        assert_eq!(probe.angle(), 45.5);
        servo.write(200.0);
        assert_eq!(probe.angle(), 180.0);
        servo.write(-10.0);
        assert_eq!(probe.angle(), 0.0);
    }

    #[test]
    fn write_before_attach_is_ignored() {
        let mut servo = SimServo::new("pan", 30.0);
        let probe = servo.probe();
        servo.write(120.0);
        assert_eq!(probe.angle(), 30.0);
    }
}
