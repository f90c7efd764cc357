// Define message types exchanged on the bus

use std::sync::Arc;

use serde::{Deserialize, Serialize};

// Command from teleop/planner -> runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward speed (m/s)
    pub linear: f64,
    /// Turn rate request (rad), used as the nominal steering angle
    pub angular: f64,
    /// Identifies the publishing node for the single-publisher policy
    #[serde(default)]
    pub source: Option<String>,
}

// Joint feedback from hardware/sim -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointState {
    /// Cumulative rear wheel angle (rad)
    pub wheel_position: f64,
    /// Measured front steer angle (rad)
    pub steer_position: f64,
}

/// Actuation output from runtime -> hardware
///
/// Wheel speeds are in rad/s, steer angles in rad. `steer` is the
/// single-axle (bicycle model) angle for consumers that only drive one
/// steering joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSetpoints {
    pub rear_left: f64,
    pub rear_right: f64,
    pub front_left: f64,
    pub front_right: f64,
    pub steer_left: f64,
    pub steer_right: f64,
    pub steer: f64,
}

impl WheelSetpoints {
    /// All wheels stopped, all steering centred
    pub fn brake() -> Self {
        Self::default()
    }

    pub fn wheel_speeds(&self) -> [f64; 4] {
        [self.rear_left, self.rear_right, self.front_left, self.front_right]
    }

    pub fn is_finite(&self) -> bool {
        self.wheel_speeds().iter().all(|v| v.is_finite())
            && self.steer_left.is_finite()
            && self.steer_right.is_finite()
            && self.steer.is_finite()
    }
}

/// Odometry snapshot published at the configured rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometrySnapshot {
    /// Controller time (s)
    pub stamp: f64,
    /// Shared with the controller so building a snapshot never allocates
    pub odom_frame_id: Arc<str>,
    pub base_frame_id: Arc<str>,
    pub x: f64,
    pub y: f64,
    /// Heading normalized to (-pi, pi]
    pub heading: f64,
    /// Yaw quaternion as [x, y, z, w]
    pub orientation: [f64; 4],
    pub linear_velocity: f64,
    pub angular_velocity: f64,
    /// Whether the publisher should also broadcast the odom -> base transform
    pub publish_tf: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerHealth {
    Ok,
    CmdStale,
    Braking,
}
