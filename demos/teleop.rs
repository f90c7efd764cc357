// Keyboard teleop: W/S drive, A/D steer, R/F speed, Space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use ackermann_zenoh_runtime::config::TOPIC_CMD_VEL;
use ackermann_zenoh_runtime::messages::VelocityCommand;

const SPEEDS: [f64; 3] = [0.2, 0.5, 1.0]; // m/s
const STEER_STEP: f64 = 0.05; // rad per key press
const MAX_STEER: f64 = 0.6; // rad

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_VEL).await?;

    info!("Controls: W/S=drive, A/D=steer, Space=stop, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Steering holds its angle between presses, like a real wheel
    let mut linear = 0.0;
    let mut steer: f64 = 0.0;

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => linear = SPEEDS[speed_idx],
                    KeyCode::Char('s') if pressed => linear = -SPEEDS[speed_idx],
                    KeyCode::Char(' ') if pressed => {
                        linear = 0.0;
                        steer = 0.0;
                    }

                    KeyCode::Char('a') if pressed => {
                        steer = (steer + STEER_STEP).min(MAX_STEER);
                    }
                    KeyCode::Char('d') if pressed => {
                        steer = (steer - STEER_STEP).max(-MAX_STEER);
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let cmd = VelocityCommand {
            linear,
            angular: steer,
            source: Some("teleop".to_string()),
        };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
