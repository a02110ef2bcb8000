//! axis.rs
//! Per-axis control math: deadzone filter → rate integration → clamp → servo map.
//! The integrator is time-delta aware (`rate * gain_per_sec * dt`), so loop timing
//! drift changes nothing but resolution; the gain constant is calibrated in
//! degrees-per-degree-per-second, not per-iteration.

use std::time::Duration;

use crate::telemetry::GyroAxis;
use crate::tracker::servo::SERVO_RANGE_DEG;

#[derive(Debug, Clone, Copy)]
pub struct AxisConfig {
    /// Which gyro component this axis tracks. Fixed wiring, not computed.
    pub axis: GyroAxis,
    /// Sign encodes the mechanical inversion between the two mounts.
    pub gain_per_sec: f32,
    /// Rates below this magnitude are bias noise and integrate to drift if kept.
    pub deadzone: f32,
    pub min_deg: f32,
    pub max_deg: f32,
}

impl AxisConfig {
    /// Pan follows yaw (gyro Z), upright mount.
    pub fn pan() -> Self {
        Self {
            axis: GyroAxis::Z,
            gain_per_sec: 1.0,
            deadzone: 0.2,
            min_deg: -15.0,
            max_deg: 15.0,
        }
    }

    /// Tilt follows roll (gyro X); the tilt horn is mounted mirrored, hence the
    /// negative gain.
    pub fn tilt() -> Self {
        Self {
            gain_per_sec: -1.0,
            axis: GyroAxis::X,
            ..Self::pan()
        }
    }
}

/// Owned exclusively by the control loop; one instance per actuated axis.
pub struct AxisController {
    cfg: AxisConfig,
    position: f32,
}

impl AxisController {
    pub fn new(cfg: AxisConfig) -> Self {
        Self { cfg, position: 0.0 }
    }

    #[inline]
    pub fn axis(&self) -> GyroAxis {
        self.cfg.axis
    }

    /// Accumulated angle estimate in deg, already clamped.
    #[inline]
    pub fn position(&self) -> f32 {
        self.position
    }

    /// One control iteration: filter the rate, integrate over the measured
    /// interval, clamp before anything downstream can see the value.
    pub fn integrate(&mut self, rate: f32, dt: Duration) -> f32 {
        let rate = if rate.abs() < self.cfg.deadzone { 0.0 } else { rate };
        self.position += rate * self.cfg.gain_per_sec * dt.as_secs_f32();
        self.position = self.position.clamp(self.cfg.min_deg, self.cfg.max_deg);
        self.position
    }

    /// Fail-safe drift back toward center at `rate_deg_per_sec`, saturating at 0.
    pub fn recenter(&mut self, rate_deg_per_sec: f32, dt: Duration) {
        let step = rate_deg_per_sec.abs() * dt.as_secs_f32();
        if self.position.abs() <= step {
            self.position = 0.0;
        } else {
            self.position -= step * self.position.signum();
        }
    }

    /// Linear map onto the servo's native range, inverted to match the sender's
    /// mechanical convention: max_deg → 0°, min_deg → 180°.
    pub fn servo_angle(&self) -> f32 {
        (self.cfg.max_deg - self.position) / (self.cfg.max_deg - self.cfg.min_deg)
            * SERVO_RANGE_DEG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(10);

    fn pan() -> AxisController {
        AxisController::new(AxisConfig::pan())
    }

    #[test]
    fn rates_below_deadzone_leave_position_unchanged() {
        let mut axis = pan();
        axis.integrate(5.0, DT);
        let before = axis.position();
        for rate in [0.0, 0.05, -0.1, 0.199, -0.199] {
            axis.integrate(rate, DT);
            assert_eq!(axis.position(), before);
        }
    }

    #[test]
    fn position_stays_within_bounds_under_adversarial_rates() {
        let mut axis = pan();
        let rates = [1e6, -1e6, 500.0, f32::MAX / 1e6, -42.0, 9999.0];
        for i in 0..10_000 {
            let pos = axis.integrate(rates[i % rates.len()], DT);
            assert!((-15.0..=15.0).contains(&pos), "iteration {i}: {pos}");
        }
    }

    #[test]
    fn servo_map_endpoints_are_exact_and_inverted() {
        let mut axis = pan();
        axis.integrate(1e9, Duration::from_secs(1)); // saturate at max
        assert_eq!(axis.position(), 15.0);
        assert_eq!(axis.servo_angle(), 0.0);

        axis.integrate(-1e9, Duration::from_secs(1)); // saturate at min
        assert_eq!(axis.position(), -15.0);
        assert_eq!(axis.servo_angle(), 180.0);
    }

    #[test]
    fn servo_map_is_monotonically_decreasing_in_position() {
        let mut axis = pan();
        let mut last = axis.servo_angle();
        // walk position from 0 up to the clamp; mapped angle must only decrease
        for _ in 0..40 {
            axis.integrate(50.0, DT);
            let angle = axis.servo_angle();
            assert!(angle <= last);
            last = angle;
        }
    }

    #[test]
    fn centered_position_maps_to_servo_midpoint() {
        assert_eq!(pan().servo_angle(), 90.0);
    }

    #[test]
    fn zero_rate_holds_arbitrary_position_without_recentering() {
        let mut axis = pan();
        axis.integrate(7.5, Duration::from_secs(1));
        let held = axis.position();
        assert!(held > 0.0);
        for _ in 0..100 {
            axis.integrate(0.0, DT);
        }
        assert_eq!(axis.position(), held);
    }

    /// Constant rate ramp: 10 deg/s at 50 ms per tick is 0.5 deg per iteration,
    /// so the +15 clamp is reached at iteration 30 and the output saturates there.
    #[test]
    fn constant_rate_ramps_then_saturates_at_clamp() {
        let dt = Duration::from_millis(50);
        let mut axis = pan();
        for i in 1..=50 {
            let pos = axis.integrate(10.0, dt);
            let expected = (i as f32 * 0.5).min(15.0);
            assert!((pos - expected).abs() < 1e-3, "iteration {i}: {pos}");
            // one iteration past the threshold the clamp is exact, rounding aside
            if i >= 31 {
                assert_eq!(pos, 15.0);
                assert_eq!(axis.servo_angle(), 0.0);
            }
        }
    }

    /// The stock 10 ms loop gives the historical 0.01 deg per unit rate per tick.
    #[test]
    fn default_period_matches_per_tick_calibration() {
        let mut axis = pan();
        axis.integrate(10.0, DT);
        assert!((axis.position() - 0.1).abs() < 1e-4);
    }

    #[test]
    fn tilt_gain_inverts_the_rate_sign() {
        let mut tilt = AxisController::new(AxisConfig::tilt());
        tilt.integrate(10.0, DT);
        assert!(tilt.position() < 0.0);
    }

    #[test]
    fn recenter_decays_toward_zero_without_overshoot() {
        let mut axis = pan();
        axis.integrate(5.0, Duration::from_secs(1));
        assert_eq!(axis.position(), 5.0);

        for _ in 0..99 {
            axis.recenter(1.0, Duration::from_millis(50));
        }
        assert!((axis.position() - 0.05).abs() < 1e-3);
        axis.recenter(1.0, Duration::from_millis(50));
        axis.recenter(1.0, Duration::from_millis(50));
        assert_eq!(axis.position(), 0.0);
    }
}
