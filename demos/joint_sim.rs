// Joint simulator: integrates wheel setpoints and reports joint feedback
//
// Usage: cargo run --example joint_sim
// Stands in for the base hardware so the runtime can run closed-loop odometry
// without a robot attached.

use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use ackermann_zenoh_runtime::config::{LOOP_HZ, TOPIC_JOINT_STATE, TOPIC_SETPOINTS};
use ackermann_zenoh_runtime::messages::{JointState, WheelSetpoints};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let subscriber = session.declare_subscriber(TOPIC_SETPOINTS).await?;
    let publisher = session.declare_publisher(TOPIC_JOINT_STATE).await?;

    let mut setpoints = WheelSetpoints::brake();
    let mut state = JointState {
        wheel_position: 0.0,
        steer_position: 0.0,
    };

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut last = Instant::now();
    info!("Simulating joints: {} -> {}", TOPIC_SETPOINTS, TOPIC_JOINT_STATE);

    loop {
        tick.tick().await;

        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<WheelSetpoints>(&payload) {
                Ok(latest) => setpoints = latest,
                Err(e) => warn!("Failed to parse setpoints: {}", e),
            }
        }

        // Ideal actuators: wheels spin at the setpoint, steering snaps to it
        let dt = last.elapsed().as_secs_f64();
        last = Instant::now();
        state.wheel_position += setpoints.rear_right * dt;
        state.steer_position = setpoints.steer;

        publisher.put(serde_json::to_string(&state)?).await?;
    }
}
