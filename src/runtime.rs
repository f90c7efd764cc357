// Fixed-rate control loop wired to Zenoh
// Commands arrive on their own task and are handed over through the command
// channel, so the loop never waits on the network for its inputs.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use zenoh::pubsub::Publisher;

use crate::config::{
    ControllerConfig, LOOP_HZ, TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_JOINT_STATE, TOPIC_ODOM,
    TOPIC_SETPOINTS,
};
use crate::controller::Controller;
use crate::messages::{JointState, VelocityCommand, WheelSetpoints};
use crate::throttle::Throttle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn put_json<T: Serialize>(publisher: &Publisher<'_>, value: &T) -> Result<(), BoxError> {
    let json = serde_json::to_string(value)?;
    publisher.put(json).await?;
    Ok(())
}

/// Log a failed publish from inside the loop, at most once per throttle
/// period. Returns true when the failure was logged.
fn report_publish(result: Result<(), BoxError>, topic: &str, throttle: &mut Throttle, now: Duration) -> bool {
    match result {
        Err(e) if throttle.ready(now) => {
            warn!("Failed to publish on {}: {}", topic, e);
            true
        }
        _ => false,
    }
}

pub async fn run(config: ControllerConfig) -> Result<(), BoxError> {
    // Refuse to start on bad parameters before touching the network
    let (mut controller, mut input) = Controller::new(&config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let cmd_subscriber = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let joint_subscriber = session.declare_subscriber(TOPIC_JOINT_STATE).await?;
    let pub_setpoints = session.declare_publisher(TOPIC_SETPOINTS).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let clock = Instant::now();

    // Command producer: parse, stamp and hand over each command as it arrives
    tokio::spawn(async move {
        while let Ok(sample) = cmd_subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityCommand>(&payload) {
                Ok(cmd) => {
                    if let Err(e) = input.submit(&cmd, clock.elapsed()) {
                        warn!("Rejected command {:?}: {}", cmd, e);
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }
        info!("Command subscriber closed");
    });

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_tick = clock.elapsed();
    let mut publish_throttle = Throttle::new(Duration::from_secs(1));
    let started = put_json(&pub_setpoints, &controller.start(last_tick)).await;
    report_publish(started, TOPIC_SETPOINTS, &mut publish_throttle, last_tick);

    info!(
        "Runtime started: {}Hz loop, {}s command timeout",
        LOOP_HZ, config.command.cmd_vel_timeout
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_VEL, TOPIC_JOINT_STATE);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_SETPOINTS, TOPIC_ODOM, TOPIC_HEALTH
    );

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        let now = clock.elapsed();
        let period = now.saturating_sub(last_tick);
        last_tick = now;

        // 1. Drain joint feedback (non-blocking), keep latest
        let mut joints = None;
        while let Ok(Some(sample)) = joint_subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<JointState>(&payload) {
                Ok(state) => joints = Some(state),
                Err(e) => warn!("Failed to parse joint state: {}", e),
            }
        }

        // 2. Run the control period (includes watchdog logic)
        let output = controller.update(now, period, joints);

        // 3. Publish actuation, odometry and health. Failures must not end the
        // loop before the shutdown brake below.
        let sent = put_json(&pub_setpoints, &output.setpoints).await;
        report_publish(sent, TOPIC_SETPOINTS, &mut publish_throttle, now);
        if let Some(odometry) = &output.odometry {
            let sent = put_json(&pub_odom, odometry).await;
            report_publish(sent, TOPIC_ODOM, &mut publish_throttle, now);
        }
        let sent = put_json(&pub_health, &output.health).await;
        report_publish(sent, TOPIC_HEALTH, &mut publish_throttle, now);
    }

    let brake: WheelSetpoints = controller.stop();
    put_json(&pub_setpoints, &brake).await?;
    put_json(&pub_health, &controller.health()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failure_is_logged_and_throttled() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        let failed = || -> Result<(), BoxError> { Err("session closed".into()) };

        assert!(report_publish(failed(), TOPIC_SETPOINTS, &mut throttle, Duration::from_millis(10)));
        assert!(!report_publish(failed(), TOPIC_HEALTH, &mut throttle, Duration::from_millis(20)));
        assert!(report_publish(failed(), TOPIC_SETPOINTS, &mut throttle, Duration::from_millis(1020)));
    }

    #[test]
    fn test_successful_publish_is_silent() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(!report_publish(Ok(()), TOPIC_ODOM, &mut throttle, Duration::from_millis(10)));
        // Nothing consumed the throttle
        assert!(throttle.ready(Duration::from_millis(10)));
    }
}
