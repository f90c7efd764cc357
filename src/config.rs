// Loop rate, topics, and controller parameters
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 100;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "ackermann/cmd_vel"; // velocity commands
pub const TOPIC_JOINT_STATE: &str = "ackermann/state/joints"; // wheel + steer feedback
pub const TOPIC_SETPOINTS: &str = "ackermann/rt/setpoints"; // actuation
pub const TOPIC_ODOM: &str = "ackermann/odom"; // odometry snapshots
pub const TOPIC_HEALTH: &str = "ackermann/state/health"; // health status

/// Errors raised while loading or validating a [`ControllerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Full controller configuration, usually read from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub geometry: GeometryConfig,
    pub odometry: OdometryConfig,
    pub command: CommandConfig,
    pub linear: LimiterConfig,
    pub angular: LimiterConfig,
}

/// Vehicle dimensions in meters plus calibration multipliers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Lateral distance between the left and right wheels
    pub track_width: f64,
    /// Longitudinal distance between the front and rear axles
    pub wheelbase: f64,
    pub wheel_radius: f64,
    pub track_width_multiplier: f64,
    pub wheelbase_multiplier: f64,
    pub wheel_radius_multiplier: f64,
    /// Applied to the measured steer angle before odometry integration
    pub steer_pos_multiplier: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        // Zero dimensions force the caller to configure the vehicle
        Self {
            track_width: 0.0,
            wheelbase: 0.0,
            wheel_radius: 0.0,
            track_width_multiplier: 1.0,
            wheelbase_multiplier: 1.0,
            wheel_radius_multiplier: 1.0,
            steer_pos_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    /// Integrate commanded velocities instead of joint feedback
    pub open_loop: bool,
    /// Odometry snapshot rate (Hz)
    pub publish_rate: f64,
    pub velocity_rolling_window_size: usize,
    pub base_frame_id: String,
    pub odom_frame_id: String,
    pub enable_odom_tf: bool,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            open_loop: false,
            publish_rate: 50.0,
            velocity_rolling_window_size: 10,
            base_frame_id: "base_link".to_string(),
            odom_frame_id: "odom".to_string(),
            enable_odom_tf: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Commands older than this (seconds) are replaced by a brake
    pub cmd_vel_timeout: f64,
    pub allow_multiple_cmd_vel_publishers: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            cmd_vel_timeout: 0.5,
            allow_multiple_cmd_vel_publishers: true,
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.cmd_vel_timeout).unwrap_or(Duration::ZERO)
    }
}

/// Per-axis velocity, acceleration and jerk bounds.
///
/// A `min_*` bound left out of the file mirrors its `max_*` counterpart
/// (`min = -max`), which is resolved by [`LimiterConfig::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub has_velocity_limits: bool,
    pub has_acceleration_limits: bool,
    pub has_jerk_limits: bool,
    pub min_velocity: Option<f64>,
    pub max_velocity: f64,
    pub min_acceleration: Option<f64>,
    pub max_acceleration: f64,
    pub min_jerk: Option<f64>,
    pub max_jerk: f64,
}

/// [`LimiterConfig`] with every bound filled in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Limits {
    pub has_velocity_limits: bool,
    pub has_acceleration_limits: bool,
    pub has_jerk_limits: bool,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
    pub min_jerk: f64,
    pub max_jerk: f64,
}

impl LimiterConfig {
    pub fn resolve(&self) -> Limits {
        Limits {
            has_velocity_limits: self.has_velocity_limits,
            has_acceleration_limits: self.has_acceleration_limits,
            has_jerk_limits: self.has_jerk_limits,
            min_velocity: self.min_velocity.unwrap_or(-self.max_velocity),
            max_velocity: self.max_velocity,
            min_acceleration: self.min_acceleration.unwrap_or(-self.max_acceleration),
            max_acceleration: self.max_acceleration,
            min_jerk: self.min_jerk.unwrap_or(-self.max_jerk),
            max_jerk: self.max_jerk,
        }
    }
}

impl ControllerConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter the controller divides by or sizes buffers with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        positive("geometry.track_width", g.track_width)?;
        positive("geometry.wheelbase", g.wheelbase)?;
        positive("geometry.wheel_radius", g.wheel_radius)?;
        positive("geometry.track_width_multiplier", g.track_width_multiplier)?;
        positive("geometry.wheelbase_multiplier", g.wheelbase_multiplier)?;
        positive("geometry.wheel_radius_multiplier", g.wheel_radius_multiplier)?;
        finite("geometry.steer_pos_multiplier", g.steer_pos_multiplier)?;
        positive("odometry.publish_rate", self.odometry.publish_rate)?;

        if self.odometry.velocity_rolling_window_size == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "odometry.velocity_rolling_window_size",
                value: 0.0,
                reason: "must be at least 1",
            });
        }

        let timeout = self.command.cmd_vel_timeout;
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "command.cmd_vel_timeout",
                value: timeout,
                reason: "must be a non-negative number of seconds",
            });
        }

        validate_limits("linear", &self.linear.resolve())?;
        validate_limits("angular", &self.angular.resolve())?;
        Ok(())
    }

    pub fn publish_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.odometry.publish_rate).unwrap_or(Duration::ZERO)
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be finite",
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be greater than zero",
        })
    }
}

fn validate_limits(axis: &'static str, limits: &Limits) -> Result<(), ConfigError> {
    let bounds = [
        (limits.has_velocity_limits, limits.min_velocity, limits.max_velocity),
        (limits.has_acceleration_limits, limits.min_acceleration, limits.max_acceleration),
        (limits.has_jerk_limits, limits.min_jerk, limits.max_jerk),
    ];
    for (enabled, min, max) in bounds {
        if enabled && !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(ConfigError::InvalidParameter {
                name: axis,
                value: min,
                reason: "enabled limit needs finite bounds with min <= max",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
        [geometry]
        track_width = 0.5
        wheelbase = 1.0
        wheel_radius = 0.1
        wheel_radius_multiplier = 1.02

        [command]
        cmd_vel_timeout = 0.25
        allow_multiple_cmd_vel_publishers = false

        [linear]
        has_velocity_limits = true
        max_velocity = 2.0
    "#;

    #[test]
    fn test_parse_valid_config() {
        let config = ControllerConfig::from_toml(VALID).unwrap();
        assert_eq!(config.geometry.track_width, 0.5);
        assert_eq!(config.geometry.wheel_radius_multiplier, 1.02);
        assert_eq!(config.geometry.wheelbase_multiplier, 1.0);
        assert_eq!(config.command.timeout(), Duration::from_millis(250));
        assert!(!config.command.allow_multiple_cmd_vel_publishers);
        // Untouched sections keep their defaults
        assert_eq!(config.odometry.velocity_rolling_window_size, 10);
        assert_eq!(config.odometry.odom_frame_id, "odom");
        assert!(!config.angular.has_velocity_limits);
    }

    #[test]
    fn test_min_bound_mirrors_max() {
        let config = ControllerConfig::from_toml(VALID).unwrap();
        let limits = config.linear.resolve();
        assert_eq!(limits.min_velocity, -2.0);
        assert_eq!(limits.max_velocity, 2.0);

        let explicit = LimiterConfig {
            min_velocity: Some(-0.5),
            max_velocity: 2.0,
            ..Default::default()
        };
        assert_eq!(explicit.resolve().min_velocity, -0.5);
    }

    #[test]
    fn test_missing_geometry_is_rejected() {
        let err = ControllerConfig::from_toml("[odometry]\nopen_loop = true\n").unwrap_err();
        match err {
            ConfigError::InvalidParameter { name, .. } => assert_eq!(name, "geometry.track_width"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let raw = format!("{VALID}\n[odometry]\nvelocity_rolling_window_size = 0\n");
        assert!(matches!(
            ControllerConfig::from_toml(&raw),
            Err(ConfigError::InvalidParameter {
                name: "odometry.velocity_rolling_window_size",
                ..
            })
        ));
    }

    #[test]
    fn test_inverted_limits_are_rejected() {
        let raw = r#"
            [geometry]
            track_width = 0.5
            wheelbase = 1.0
            wheel_radius = 0.1

            [angular]
            has_acceleration_limits = true
            min_acceleration = 1.0
            max_acceleration = -1.0
        "#;
        assert!(ControllerConfig::from_toml(raw).is_err());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            ControllerConfig::from_toml("[geometry\ntrack_width = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();
        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.geometry.wheelbase, 1.0);

        let missing = ControllerConfig::load(Path::new("/nonexistent/ackermann.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = ControllerConfig::from_toml(include_str!("../config/ackermann.toml")).unwrap();
        assert!(config.linear.has_acceleration_limits);
        assert_eq!(config.angular.resolve().min_velocity, -0.6);
    }

    #[test]
    fn test_publish_period() {
        let config = ControllerConfig::default();
        assert_eq!(config.publish_period(), Duration::from_millis(20));
    }
}
