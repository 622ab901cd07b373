// Keyboard teleop: W/S drive, A/D turn, R/F speed, Q quit
//
// Usage: teleop [port]   (simulation when no port is given)
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use create_drive::{RobotSession, Target};

const SPEEDS: [f64; 3] = [0.05, 0.15, 0.3]; // m/s
const TURN_SPEEDS: [f64; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT: Duration = Duration::from_millis(300); // Stop after this long with no input

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let target = match std::env::args().nth(1) {
        Some(port) => Target::Serial(port),
        None => Target::Simulated,
    };
    let mut robot = RobotSession::builder().update_hz(20).connect(target)?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&mut robot);
    disable_raw_mode()?;

    robot.stop()?;
    robot.close()?;
    result
}

fn run_teleop(robot: &mut RobotSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut speed_idx: usize = 0;
    let mut linear = 0.0;
    let mut angular = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // set_velocity below already waits out the tick, so only peek here
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        linear = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        linear = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        angular = TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        angular = -TURN_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => return Ok(()),

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > INPUT_TIMEOUT {
            linear = 0.0;
            angular = 0.0;
        }

        // Rescaled on hardware, rejected in simulation; keep driving either way
        if let Err(e) = robot.set_velocity(linear, angular) {
            info!("Command rejected: {}", e);
            robot.stop()?;
        }
        if robot.is_bumped()? {
            info!("Bump!");
        }
    }
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
