// Dead-reckoning odometry for the Ackermann base
//
// Pose is integrated with a second-order (midpoint) scheme: position advances
// along the mean of the heading before and after the step. Velocities are
// smoothed with a fixed-size rolling mean.

use std::f64::consts::PI;
use std::time::Duration;

use super::VehicleGeometry;
use super::kinematics::curvature;

/// Steps shorter than this (seconds) integrate pose but skip velocity estimation
const MIN_VELOCITY_DT: f64 = 1e-4;

/// Fixed-capacity moving average with a running sum.
#[derive(Debug, Clone)]
pub struct RollingMean {
    samples: Box<[f64]>,
    next: usize,
    len: usize,
    sum: f64,
}

impl RollingMean {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)].into_boxed_slice(),
            next: 0,
            len: 0,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        let capacity = self.samples.len();
        if self.len == capacity {
            self.sum -= self.samples[self.next];
        } else {
            self.len += 1;
        }
        self.samples[self.next] = value;
        self.sum += value;
        self.next = (self.next + 1) % capacity;

        // Re-sum once per lap so floating-point error cannot accumulate
        if self.next == 0 {
            self.sum = self.samples.iter().sum();
        }
    }

    /// Mean of the samples in the window, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.sum / self.len as f64
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
        self.sum = 0.0;
    }
}

/// Wrap an angle to (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI { wrapped - 2.0 * PI } else { wrapped }
}

/// Pose and velocity estimate in the frame where [`Odometry::init`] was called.
///
/// Heading is continuous and is only wrapped by [`normalize_angle`] when
/// published.
#[derive(Debug, Clone)]
pub struct Odometry {
    geometry: VehicleGeometry,
    initialized: bool,
    timestamp: Duration,

    x: f64,
    y: f64,
    heading: f64,
    linear: f64,
    angular: f64,

    /// Last rear wheel travel in meters, `None` until the first sample
    last_wheel_travel: Option<f64>,

    linear_window: RollingMean,
    angular_window: RollingMean,
}

impl Odometry {
    pub fn new(geometry: VehicleGeometry, velocity_rolling_window_size: usize) -> Self {
        Self {
            geometry,
            initialized: false,
            timestamp: Duration::ZERO,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            linear: 0.0,
            angular: 0.0,
            last_wheel_travel: None,
            linear_window: RollingMean::new(velocity_rolling_window_size),
            angular_window: RollingMean::new(velocity_rolling_window_size),
        }
    }

    /// Reset to the origin and start tracking from `time`.
    pub fn init(&mut self, time: Duration) {
        self.initialized = true;
        self.timestamp = time;
        self.x = 0.0;
        self.y = 0.0;
        self.heading = 0.0;
        self.linear = 0.0;
        self.angular = 0.0;
        self.last_wheel_travel = None;
        self.linear_window.clear();
        self.angular_window.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Closed-loop update from the rear wheel angle and front steer angle.
    ///
    /// `gain` scales the wheel travel to centre-line travel (see
    /// [`super::odometry_gain`]). Returns true if the velocity estimates were
    /// refreshed. Non-finite inputs leave the state untouched. The first
    /// sample after [`Odometry::init`] only seeds the wheel reference.
    pub fn update(&mut self, wheel_position: f64, steer_angle: f64, time: Duration, gain: f64) -> bool {
        if !self.initialized {
            return false;
        }
        if !(wheel_position.is_finite() && steer_angle.is_finite() && gain.is_finite()) {
            return false;
        }

        let wheel_travel = wheel_position * self.geometry.wheel_radius;
        let Some(last) = self.last_wheel_travel.replace(wheel_travel) else {
            self.timestamp = time;
            return false;
        };

        let distance = (wheel_travel - last) * gain;
        let rotation = distance * curvature(steer_angle, self.geometry.wheelbase);
        self.integrate(distance, rotation);

        let dt = time.saturating_sub(self.timestamp).as_secs_f64();
        if dt < MIN_VELOCITY_DT {
            return false;
        }
        self.timestamp = time;

        self.linear_window.push(distance / dt);
        self.angular_window.push(rotation / dt);
        self.linear = self.linear_window.mean();
        self.angular = self.angular_window.mean();
        true
    }

    /// Open-loop update that integrates commanded velocities directly.
    pub fn update_open_loop(&mut self, linear: f64, angular: f64, time: Duration) {
        if !self.initialized || !(linear.is_finite() && angular.is_finite()) {
            return;
        }

        let dt = time.saturating_sub(self.timestamp).as_secs_f64();
        self.timestamp = time;

        self.linear = linear;
        self.angular = angular;
        self.integrate(linear * dt, angular * dt);
    }

    /// Midpoint integration of one step of travel `distance` and yaw change `rotation`
    fn integrate(&mut self, distance: f64, rotation: f64) {
        let direction = self.heading + rotation * 0.5;
        self.x += distance * direction.cos();
        self.y += distance * direction.sin();
        self.heading += rotation;
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn linear_velocity(&self) -> f64 {
        self.linear
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular
    }
}
