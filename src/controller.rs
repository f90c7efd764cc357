// Fixed-period Ackermann controller
//
// Each period: refresh odometry, read the latest command, brake if it is
// stale, limit it, and synthesize wheel setpoints. The step never fails and
// never blocks; anything that would produce a non-finite setpoint becomes a
// brake instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ackermann::kinematics::curvature;
use crate::ackermann::{Odometry, VehicleGeometry, body_to_setpoints, normalize_angle, odometry_gain};
use crate::command::{Command, CommandInput, CommandReader, command_channel};
use crate::config::{ConfigError, ControllerConfig};
use crate::limiter::SpeedLimiter;
use crate::messages::{ControllerHealth, JointState, OdometrySnapshot, WheelSetpoints};
use crate::throttle::Throttle;

/// Result of one control period
#[derive(Debug, Clone)]
pub struct ControlOutput {
    pub setpoints: WheelSetpoints,
    /// Present when the odometry publish period has elapsed
    pub odometry: Option<OdometrySnapshot>,
    pub health: ControllerHealth,
}

pub struct Controller {
    geometry: VehicleGeometry,
    odom_geometry: VehicleGeometry,
    odometry: Odometry,
    commands: CommandReader,

    limiter_lin: SpeedLimiter,
    limiter_ang: SpeedLimiter,
    /// Commands dispatched one and two periods ago
    last0_cmd: Command,
    last1_cmd: Command,

    open_loop: bool,
    steer_pos_multiplier: f64,
    cmd_vel_timeout: Duration,
    publish_period: Duration,
    last_state_publish_time: Duration,
    odom_frame_id: Arc<str>,
    base_frame_id: Arc<str>,
    enable_odom_tf: bool,

    running: bool,
    health: ControllerHealth,
    debug_throttle: Throttle,
}

impl Controller {
    /// Validate `config` and build the controller together with the producer
    /// side of its command channel.
    pub fn new(config: &ControllerConfig) -> Result<(Self, CommandInput), ConfigError> {
        config.validate()?;

        let geometry = VehicleGeometry::nominal(&config.geometry);
        let odom_geometry = VehicleGeometry::calibrated(&config.geometry);
        let window = config.odometry.velocity_rolling_window_size;

        info!(
            "Wheel separation will be multiplied by {}, wheelbase by {}, wheel radius by {}, steer pos by {}",
            config.geometry.track_width_multiplier,
            config.geometry.wheelbase_multiplier,
            config.geometry.wheel_radius_multiplier,
            config.geometry.steer_pos_multiplier
        );
        info!(
            "Odometry params: wheel separation {}, wheelbase {}, wheel radius {}, rolling window {}",
            odom_geometry.track_width, odom_geometry.wheelbase, odom_geometry.wheel_radius, window
        );
        info!(
            "Velocity commands will be considered old if they are older than {}s",
            config.command.cmd_vel_timeout
        );
        info!(
            "Allow multiple cmd_vel publishers is {}",
            if config.command.allow_multiple_cmd_vel_publishers { "enabled" } else { "disabled" }
        );
        info!(
            "Odometry is {}, published at {}Hz",
            if config.odometry.open_loop { "open loop" } else { "closed loop" },
            config.odometry.publish_rate
        );

        let (writer, commands) = command_channel();
        let input = CommandInput::new(writer, &config.command);

        let controller = Self {
            geometry,
            odom_geometry,
            odometry: Odometry::new(odom_geometry, window),
            commands,
            limiter_lin: SpeedLimiter::new(config.linear.resolve()),
            limiter_ang: SpeedLimiter::new(config.angular.resolve()),
            last0_cmd: Command::default(),
            last1_cmd: Command::default(),
            open_loop: config.odometry.open_loop,
            steer_pos_multiplier: config.geometry.steer_pos_multiplier,
            cmd_vel_timeout: config.command.timeout(),
            publish_period: config.publish_period(),
            last_state_publish_time: Duration::ZERO,
            odom_frame_id: Arc::from(config.odometry.odom_frame_id.as_str()),
            base_frame_id: Arc::from(config.odometry.base_frame_id.as_str()),
            enable_odom_tf: config.odometry.enable_odom_tf,
            running: false,
            health: ControllerHealth::Braking,
            debug_throttle: Throttle::new(Duration::from_secs(10)),
        };
        Ok((controller, input))
    }

    /// Begin accepting commands. Resets odometry to the origin at `time`.
    pub fn start(&mut self, time: Duration) -> WheelSetpoints {
        self.last_state_publish_time = time;
        self.odometry.init(time);
        self.last0_cmd = Command::stopped(time);
        self.last1_cmd = Command::stopped(time);
        self.running = true;
        self.health = ControllerHealth::CmdStale; // stale until the first command
        self.commands.set_running(true);
        info!("Controller started");
        self.brake()
    }

    /// Stop accepting commands and brake.
    pub fn stop(&mut self) -> WheelSetpoints {
        self.running = false;
        self.commands.set_running(false);
        self.health = ControllerHealth::Braking;
        info!("Controller stopped");
        self.brake()
    }

    fn brake(&self) -> WheelSetpoints {
        WheelSetpoints::brake()
    }

    /// Run one control period ending at `time`.
    ///
    /// `joints` is the latest wheel/steer feedback; it is ignored in open-loop
    /// mode and a missing sample skips this period's odometry update.
    pub fn update(&mut self, time: Duration, period: Duration, joints: Option<JointState>) -> ControlOutput {
        if !self.running {
            return ControlOutput {
                setpoints: self.brake(),
                odometry: None,
                health: ControllerHealth::Braking,
            };
        }

        self.update_odometry(time, joints);
        let odometry = self.poll_publish(time);

        // Retrieve the current command, brake if it timed out or never arrived
        let cmd = self.commands.read_latest();
        let age = time.saturating_sub(cmd.stamp);
        let (setpoints, dispatched) = if cmd.is_unset() || age > self.cmd_vel_timeout {
            if self.health != ControllerHealth::CmdStale {
                warn!("Command stale ({:?} old), braking", age);
            }
            self.health = ControllerHealth::CmdStale;
            (self.brake(), Command::stopped(cmd.stamp))
        } else {
            if self.health != ControllerHealth::Ok {
                info!("Fresh command received, resuming");
            }
            self.health = ControllerHealth::Ok;
            self.limit_and_synthesize(cmd, period)
        };

        self.last1_cmd = self.last0_cmd;
        self.last0_cmd = dispatched;

        if self.debug_throttle.ready(time) {
            debug!(
                "theta: {:.3}, steer left: {:.3}, steer right: {:.3}",
                dispatched.angular, setpoints.steer_left, setpoints.steer_right
            );
            debug!(
                "wheel speeds rl: {:.3}, rr: {:.3}, fl: {:.3}, fr: {:.3}",
                setpoints.rear_left, setpoints.rear_right, setpoints.front_left, setpoints.front_right
            );
        }

        ControlOutput {
            setpoints,
            odometry,
            health: self.health,
        }
    }

    /// Limit velocities, accelerations and jerks, then map to wheel setpoints
    fn limit_and_synthesize(&self, cmd: Command, period: Duration) -> (WheelSetpoints, Command) {
        let dt = period.as_secs_f64();
        let linear = self
            .limiter_lin
            .limit(cmd.linear, self.last0_cmd.linear, self.last1_cmd.linear, dt);
        let angular = self
            .limiter_ang
            .limit(cmd.angular, self.last0_cmd.angular, self.last1_cmd.angular, dt);

        let setpoints = body_to_setpoints(linear, angular, &self.geometry);
        let dispatched = Command::new(linear, angular, cmd.stamp);
        if !setpoints.is_finite() {
            warn!("Non-finite setpoint for command {:?}, braking", dispatched);
            return (self.brake(), Command::stopped(cmd.stamp));
        }
        (setpoints, dispatched)
    }

    fn update_odometry(&mut self, time: Duration, joints: Option<JointState>) {
        if self.open_loop {
            // The command's angular field is a steer angle; integrate the yaw rate it produces
            let cmd = self.last0_cmd;
            let yaw_rate = cmd.linear * curvature(cmd.angular, self.odom_geometry.wheelbase);
            self.odometry.update_open_loop(cmd.linear, yaw_rate, time);
            return;
        }

        let Some(joints) = joints else {
            return;
        };
        let steer = joints.steer_position * self.steer_pos_multiplier;
        let gain = odometry_gain(steer, &self.odom_geometry);
        self.odometry.update(joints.wheel_position, steer, time, gain);
    }

    /// Emit a snapshot when one publish period has passed, on a fixed grid
    fn poll_publish(&mut self, time: Duration) -> Option<OdometrySnapshot> {
        if self.last_state_publish_time + self.publish_period >= time {
            return None;
        }
        self.last_state_publish_time += self.publish_period;
        Some(self.snapshot(time))
    }

    /// Current odometry estimate
    pub fn snapshot(&self, time: Duration) -> OdometrySnapshot {
        let heading = self.odometry.heading();
        let half = heading / 2.0;
        OdometrySnapshot {
            stamp: time.as_secs_f64(),
            odom_frame_id: Arc::clone(&self.odom_frame_id),
            base_frame_id: Arc::clone(&self.base_frame_id),
            x: self.odometry.x(),
            y: self.odometry.y(),
            heading: normalize_angle(heading),
            orientation: [0.0, 0.0, half.sin(), half.cos()],
            linear_velocity: self.odometry.linear_velocity(),
            angular_velocity: self.odometry.angular_velocity(),
            publish_tf: self.enable_odom_tf,
        }
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    pub fn health(&self) -> ControllerHealth {
        self.health
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Command dispatched in the most recent period
    pub fn last_command(&self) -> Command {
        self.last0_cmd
    }
}
