// One-shot command line driver: connect, run one motion, report, close
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use create_drive::{NoiseConfig, RobotSession, SessionConfig, Target};

#[derive(Parser, Debug)]
#[command(name = "create-drive", about = "Drive a Create base or its simulation")]
struct Cli {
    /// Serial port of the robot; simulate when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// JSON session config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control loop rate (1-20 Hz)
    #[arg(long)]
    hz: Option<u32>,

    /// Wheelbase in meters
    #[arg(long)]
    wheelbase: Option<f64>,

    /// Hardware version (1 or 2)
    #[arg(long = "hw")]
    hardware_version: Option<u8>,

    /// Simulated linear velocity noise (relative std dev)
    #[arg(long, default_value_t = 0.0)]
    sigma_v: f64,

    /// Simulated angular velocity noise (relative std dev)
    #[arg(long, default_value_t = 0.0)]
    sigma_omega: f64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Drive forward (cm)
    Forward { cm: f64 },
    /// Drive backward (cm)
    Backward { cm: f64 },
    /// Rotate by a signed angle (deg)
    Rotate { deg: f64 },
    /// Turn left (deg)
    Left { deg: f64 },
    /// Turn right (deg)
    Right { deg: f64 },
    /// Hold a velocity (m/s, rad/s) for a number of ticks, then stop
    Velocity {
        #[arg(allow_hyphen_values = true)]
        linear: f64,
        #[arg(allow_hyphen_values = true)]
        angular: f64,
        #[arg(long, default_value_t = 10)]
        ticks: u32,
    },
    /// Print bump and odometry readings
    Sensors,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("create-drive error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> create_drive::Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(hz) = cli.hz {
        config.update_hz = hz;
    }
    if let Some(wheelbase) = cli.wheelbase {
        config.wheelbase = wheelbase;
    }
    if let Some(version) = cli.hardware_version {
        config.hardware_version = version.try_into()?;
    }
    if cli.sigma_v > 0.0 || cli.sigma_omega > 0.0 {
        config.noise = NoiseConfig {
            sigma_v: cli.sigma_v,
            sigma_omega: cli.sigma_omega,
            ..config.noise
        };
    }

    let target = match cli.port {
        Some(port) => Target::Serial(port),
        None => Target::Simulated,
    };
    let mut robot = RobotSession::connect(config, target)?;

    match cli.action {
        Action::Forward { cm } => report(robot.drive_forward(cm)?, "cm"),
        Action::Backward { cm } => report(robot.drive_backward(cm)?, "cm"),
        Action::Rotate { deg } => report(robot.rotate(deg)?, "deg"),
        Action::Left { deg } => report(robot.turn_left(deg)?, "deg"),
        Action::Right { deg } => report(robot.turn_right(deg)?, "deg"),
        Action::Velocity {
            linear,
            angular,
            ticks,
        } => {
            for _ in 0..ticks {
                robot.set_velocity(linear, angular)?;
            }
            robot.stop()?;
        }
        Action::Sensors => {
            info!("Bumped: {}", robot.is_bumped()?);
            if robot.config().hardware_version == create_drive::HardwareVersion::V1 {
                info!("Distance: {:.1} cm", robot.distance_sensor()?);
                info!("Angle: {:.1} deg", robot.angle_sensor()?);
            } else {
                let (angle, distance) = robot.angle_and_distance_sensor()?;
                info!("Angle: {:.1} deg, distance: {:.1} cm", angle, distance);
            }
        }
    }

    if let Some(pose) = robot.pose() {
        info!(
            "Final pose: x={:.3} m, y={:.3} m, heading={:.1} deg",
            pose.x,
            pose.y,
            pose.heading.to_degrees()
        );
    }
    robot.close()
}

fn report(outcome: create_drive::MotionOutcome, unit: &str) {
    if outcome.stopped_early {
        info!("Stopped early after {:.1} {}", outcome.covered, unit);
    } else {
        info!("Reached target: {:.1} {}", outcome.covered, unit);
    }
}
