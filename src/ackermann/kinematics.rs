// Ackermann inverse kinematics for a 4-wheel, front-steered base
// Converts a body command (speed, nominal steer angle) into per-wheel speeds
// and per-wheel steer angles, all wheels turning about one common centre.

use std::f64::consts::FRAC_PI_2;

use super::VehicleGeometry;
use crate::messages::WheelSetpoints;

/// Below this, angles, radii and denominators count as zero and the
/// straight-travel solution is used instead.
pub const EPSILON: f64 = 1e-6;

/// Signed turning radius of the rear axle centre for a steer angle.
///
/// Positive radius means the centre of rotation is on the left. Returns
/// `None` for straight travel and for degenerate angles where the radius
/// vanishes or is not finite.
pub fn turning_radius(steer: f64, wheelbase: f64) -> Option<f64> {
    if !steer.is_finite() || steer.abs() < EPSILON {
        return None;
    }
    let r = wheelbase * (FRAC_PI_2 - steer).tan();
    if !r.is_finite() || r.abs() < EPSILON {
        return None;
    }
    Some(r)
}

/// Yaw change per meter travelled for a steer angle (`tan(steer) / l`).
pub fn curvature(steer: f64, wheelbase: f64) -> f64 {
    if !steer.is_finite() || steer.cos().abs() < EPSILON {
        return 0.0;
    }
    steer.tan() / wheelbase
}

/// Left and right front steer angles for nominal angle `theta`.
///
/// The inner wheel (left when `theta > 0`) gets the tighter angle
/// `atan(2l sin|theta| / (2l cos(theta) - h sin|theta|))`, the outer one
/// the same with `+ h sin|theta|`. Both take the sign of `theta`.
pub fn steer_angles(theta: f64, geometry: &VehicleGeometry) -> (f64, f64) {
    if !theta.is_finite() || theta.abs() < EPSILON {
        return (0.0, 0.0);
    }

    let l2 = 2.0 * geometry.wheelbase;
    let h = geometry.track_width;
    let sin = theta.abs().sin();
    let cos = theta.cos();

    let inner_den = l2 * cos - h * sin;
    let outer_den = l2 * cos + h * sin;
    if inner_den.abs() < EPSILON || outer_den.abs() < EPSILON {
        return (0.0, 0.0);
    }

    let inner = (l2 * sin / inner_den).atan();
    let outer = (l2 * sin / outer_den).atan();

    if theta > 0.0 {
        (inner, outer)
    } else {
        (-outer, -inner)
    }
}

/// Speeds along the inner and outer wheel arcs relative to the axle centre,
/// as `[rear_inner, rear_outer, front_inner, front_outer]`.
fn arc_ratios(radius: f64, geometry: &VehicleGeometry) -> [f64; 4] {
    let r = radius.abs();
    let half_track = geometry.track_width / 2.0;
    let l = geometry.wheelbase;

    let rear_inner = r - half_track;
    let rear_outer = r + half_track;
    let front_inner = rear_inner.hypot(l);
    let front_outer = rear_outer.hypot(l);

    [rear_inner, rear_outer, front_inner, front_outer].map(|arc| arc / r)
}

/// Convert a body command into wheel setpoints.
///
/// # Arguments
/// * `linear` - Forward speed in m/s of the rear axle centre
/// * `theta` - Nominal steer angle in rad (positive = turn left)
/// * `geometry` - Vehicle dimensions
///
/// # Returns
/// Wheel angular speeds in rad/s and steer angles in rad
pub fn body_to_setpoints(linear: f64, theta: f64, geometry: &VehicleGeometry) -> WheelSetpoints {
    let (steer_left, steer_right) = steer_angles(theta, geometry);
    let wheel_vel = linear / geometry.wheel_radius; // omega = v / r

    let Some(radius) = turning_radius(theta, geometry.wheelbase) else {
        return WheelSetpoints {
            rear_left: wheel_vel,
            rear_right: wheel_vel,
            front_left: wheel_vel,
            front_right: wheel_vel,
            steer_left,
            steer_right,
            steer: theta,
        };
    };

    let [rear_inner, rear_outer, front_inner, front_outer] =
        arc_ratios(radius, geometry).map(|ratio| ratio * wheel_vel);

    // The inner side of the turn is the side the centre of rotation is on
    let (rear_left, rear_right, front_left, front_right) = if radius > 0.0 {
        (rear_inner, rear_outer, front_inner, front_outer)
    } else {
        (rear_outer, rear_inner, front_outer, front_inner)
    };

    WheelSetpoints {
        rear_left,
        rear_right,
        front_left,
        front_right,
        steer_left,
        steer_right,
        steer: theta,
    }
}

/// Ratio of the measured rear wheel's arc radius to the centre radius,
/// `|r - h/2| / |r|`, used to scale wheel travel for odometry. Straight
/// travel has a gain of 1.
pub fn odometry_gain(steer: f64, geometry: &VehicleGeometry) -> f64 {
    match turning_radius(steer, geometry.wheelbase) {
        Some(r) => (r - geometry.track_width / 2.0).abs() / r.abs(),
        None => 1.0,
    }
}
