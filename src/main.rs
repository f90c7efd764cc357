use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ackermann_zenoh_runtime::config::ControllerConfig;

#[derive(Debug, Parser)]
#[command(version, about = "Ackermann steering controller runtime")]
struct Args {
    /// Controller configuration (TOML)
    #[arg(short, long, default_value = "config/ackermann.toml")]
    config: PathBuf,

    /// Integrate commanded velocities instead of joint feedback
    #[arg(long)]
    open_loop: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match ControllerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    config.odometry.open_loop |= args.open_loop;

    if let Err(e) = ackermann_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
