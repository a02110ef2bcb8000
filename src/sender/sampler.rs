//! sampler.rs
//! Sample source seam: one (accel, gyro) reading per poll. The physical IMU driver
//! lives behind the trait; `SimImu` stands in with bias + noise + an optional
//! scripted motion profile for the paired simulation and tests.

use crate::telemetry::TelemetryRecord;

pub const GRAVITY_M_S2: f32 = 9.81;

pub trait SampleSource {
    /// Assumed always available once constructed; per-read failure is not part
    /// of this contract.
    fn poll(&mut self) -> TelemetryRecord;
}

/// Scripted rate profile: tick counter in, gyro rates (deg/s) out.
pub type MotionProfile = Box<dyn FnMut(u64) -> [f32; 3] + Send>;

pub struct SimImu {
    tick: u64,
    gyro_bias: [f32; 3],
    noise: f32,
    motion: Option<MotionProfile>,
}

impl SimImu {
    /// A sensor at rest: gravity on Z, small constant gyro bias, uniform noise.
    pub fn stationary(gyro_bias: [f32; 3], noise: f32) -> Self {
        Self {
            tick: 0,
            gyro_bias,
            noise,
            motion: None,
        }
    }

    pub fn with_motion(mut self, motion: MotionProfile) -> Self {
        self.motion = Some(motion);
        self
    }

    fn jitter(&self) -> f32 {
        if self.noise > 0.0 {
            rand::random_range(-self.noise..self.noise)
        } else {
            0.0
        }
    }
}

impl SampleSource for SimImu {
    fn poll(&mut self) -> TelemetryRecord {
        let tick = self.tick;
        self.tick += 1;

        let base = match self.motion.as_mut() {
            Some(motion) => motion(tick),
            None => [0.0; 3],
        };

        let mut gyro = [0.0f32; 3];
        for i in 0..3 {
            gyro[i] = base[i] + self.gyro_bias[i] + self.jitter();
        }
        TelemetryRecord {
            accel: [self.jitter(), self.jitter(), GRAVITY_M_S2 + self.jitter()],
            gyro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_imu_reads_only_bias_and_noise() {
        let mut imu = SimImu::stationary([0.05, -0.05, 0.08], 0.05);
        for _ in 0..100 {
            let sample = imu.poll();
            for rate in sample.gyro {
                // bias + noise stays inside the deadzone band for a sensor at rest
                assert!(rate.abs() < 0.2, "rate {rate}");
            }
            assert!((sample.accel[2] - GRAVITY_M_S2).abs() < 0.1);
        }
    }

    #[test]
    fn motion_profile_drives_the_gyro_rates() {
        let mut imu = SimImu::stationary([0.0; 3], 0.0)
            .with_motion(Box::new(|tick| [0.0, 0.0, tick as f32]));
        assert_eq!(imu.poll().gyro[2], 0.0);
        assert_eq!(imu.poll().gyro[2], 1.0);
        assert_eq!(imu.poll().gyro[2], 2.0);
    }
}
