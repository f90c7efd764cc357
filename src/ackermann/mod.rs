// Ackermann vehicle model
//
// Provides:
// - Inverse kinematics (body command -> wheel speeds and steer angles)
// - Forward helpers used by odometry (turning radius, wheel gain)
// - Dead-reckoning odometry with rolling-window velocity estimates

pub mod kinematics;
pub mod odometry;

pub use kinematics::{body_to_setpoints, odometry_gain, steer_angles, turning_radius};
pub use odometry::{Odometry, RollingMean, normalize_angle};

use crate::config::GeometryConfig;

/// Vehicle dimensions in meters. All three are strictly positive once built
/// from a validated [`GeometryConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleGeometry {
    /// Lateral wheel separation (h)
    pub track_width: f64,
    /// Front to rear axle distance (l)
    pub wheelbase: f64,
    pub wheel_radius: f64,
}

impl VehicleGeometry {
    pub fn new(track_width: f64, wheelbase: f64, wheel_radius: f64) -> Self {
        Self {
            track_width,
            wheelbase,
            wheel_radius,
        }
    }

    /// Dimensions as configured, used to synthesize commands
    pub fn nominal(config: &GeometryConfig) -> Self {
        Self::new(config.track_width, config.wheelbase, config.wheel_radius)
    }

    /// Dimensions with calibration multipliers applied, used by odometry
    pub fn calibrated(config: &GeometryConfig) -> Self {
        Self::new(
            config.track_width * config.track_width_multiplier,
            config.wheelbase * config.wheelbase_multiplier,
            config.wheel_radius * config.wheel_radius_multiplier,
        )
    }
}
