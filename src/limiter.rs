// Velocity, acceleration and jerk limiting for one command axis

use crate::config::Limits;

/// Stateless per-axis limiter. The caller supplies the two previously
/// dispatched values, so the limiter holds configuration only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedLimiter {
    limits: Limits,
}

impl SpeedLimiter {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Limit `requested` given the values dispatched one (`previous`) and two
    /// (`previous_previous`) periods ago.
    ///
    /// Stages run velocity, then acceleration, then jerk, each one starting
    /// from the previous stage's output. `dt <= 0` disables limiting for the
    /// cycle.
    pub fn limit(&self, requested: f64, previous: f64, previous_previous: f64, dt: f64) -> f64 {
        if dt <= 0.0 || !dt.is_finite() {
            return requested;
        }

        let mut v = requested;
        if self.limits.has_velocity_limits {
            v = self.limit_velocity(v);
        }
        if self.limits.has_acceleration_limits {
            v = self.limit_acceleration(v, previous, dt);
        }
        if self.limits.has_jerk_limits {
            v = self.limit_jerk(v, previous, previous_previous, dt);
        }
        v
    }

    pub fn limit_velocity(&self, v: f64) -> f64 {
        v.clamp(self.limits.min_velocity, self.limits.max_velocity)
    }

    pub fn limit_acceleration(&self, v: f64, previous: f64, dt: f64) -> f64 {
        let accel = (v - previous) / dt;
        let accel = accel.clamp(self.limits.min_acceleration, self.limits.max_acceleration);
        previous + accel * dt
    }

    pub fn limit_jerk(&self, v: f64, previous: f64, previous_previous: f64, dt: f64) -> f64 {
        let accel = (v - previous) / dt;
        let previous_accel = (previous - previous_previous) / dt;
        let jerk = ((accel - previous_accel) / dt).clamp(self.limits.min_jerk, self.limits.max_jerk);
        previous + (previous_accel + jerk * dt) * dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn all_limits() -> Limits {
        Limits {
            has_velocity_limits: true,
            has_acceleration_limits: true,
            has_jerk_limits: true,
            min_velocity: -1.0,
            max_velocity: 2.0,
            min_acceleration: -3.0,
            max_acceleration: 1.0,
            min_jerk: -5.0,
            max_jerk: 5.0,
        }
    }

    #[test]
    fn test_disabled_limits_pass_through() {
        let limiter = SpeedLimiter::default();
        assert_eq!(limiter.limit(42.0, 0.0, 0.0, 0.01), 42.0);
    }

    #[test]
    fn test_steady_command_is_unchanged() {
        let limiter = SpeedLimiter::new(all_limits());
        for v in [-1.0, -0.3, 0.0, 0.7, 2.0] {
            assert!((limiter.limit(v, v, v, 0.01) - v).abs() < TOL, "v = {}", v);
        }
    }

    #[test]
    fn test_non_positive_dt_skips_limiting() {
        let limiter = SpeedLimiter::new(all_limits());
        assert_eq!(limiter.limit(10.0, 0.0, 0.0, 0.0), 10.0);
        assert_eq!(limiter.limit(10.0, 0.0, 0.0, -0.1), 10.0);
    }

    #[test]
    fn test_velocity_clamp() {
        let limiter = SpeedLimiter::new(Limits {
            has_velocity_limits: true,
            min_velocity: -1.0,
            max_velocity: 2.0,
            ..Default::default()
        });
        assert_eq!(limiter.limit(5.0, 0.0, 0.0, 0.1), 2.0);
        assert_eq!(limiter.limit(-5.0, 0.0, 0.0, 0.1), -1.0);
        assert_eq!(limiter.limit(1.5, 0.0, 0.0, 0.1), 1.5);
    }

    #[test]
    fn test_acceleration_clamp() {
        let limiter = SpeedLimiter::new(Limits {
            has_acceleration_limits: true,
            min_acceleration: -3.0,
            max_acceleration: 1.0,
            ..Default::default()
        });
        // +1 m/s^2 over 0.1 s allows +0.1
        assert!((limiter.limit(1.0, 0.5, 0.5, 0.1) - 0.6).abs() < TOL);
        // -3 m/s^2 over 0.1 s allows -0.3
        assert!((limiter.limit(-1.0, 0.5, 0.5, 0.1) - 0.2).abs() < TOL);
    }

    #[test]
    fn test_jerk_clamp() {
        let limiter = SpeedLimiter::new(Limits {
            has_jerk_limits: true,
            min_jerk: -5.0,
            max_jerk: 5.0,
            ..Default::default()
        });
        // Previously cruising, asking for a step: acceleration may only grow by
        // jerk * dt = 0.5 m/s^2, i.e. the value by 0.05
        let v = limiter.limit(1.0, 0.0, 0.0, 0.1);
        assert!((v - 0.05).abs() < TOL, "got {}", v);

        // Previously accelerating at 1 m/s^2, the ramp continues
        let v = limiter.limit(0.2, 0.1, 0.0, 0.1);
        assert!((v - 0.2).abs() < TOL, "got {}", v);
    }

    #[test]
    fn test_stages_compose() {
        let limiter = SpeedLimiter::new(all_limits());
        // Velocity clamps 10 -> 2, acceleration then allows only +0.1 from 0
        // and jerk only +0.05 from a standstill
        let v = limiter.limit(10.0, 0.0, 0.0, 0.1);
        assert!((v - 0.05).abs() < TOL, "got {}", v);
    }
}
