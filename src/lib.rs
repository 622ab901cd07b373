//! Drive a two-wheeled differential-drive robot, real or simulated, through
//! one blocking control surface: set velocity, drive a distance, rotate an
//! angle, read odometry, detect bumps.
//!
//! ```no_run
//! use create_drive::{RobotSession, Target};
//!
//! let mut robot = RobotSession::builder()
//!     .update_hz(10)
//!     .hardware_version(2)
//!     .connect(Target::Serial("/dev/ttyUSB0".into()))?;
//! robot.drive_forward(50.0)?;
//! robot.turn_left(90.0)?;
//! robot.close()?;
//! # Ok::<(), create_drive::Error>(())
//! ```

pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod messages;
pub mod pacing;
pub mod session;

pub use config::{HardwareVersion, LinkConfig, NoiseConfig, SessionConfig};
pub use controller::MotionController;
pub use error::{Error, Result};
pub use messages::{MotionOutcome, MotionState, Pose, VelocityCommand};
pub use session::{RobotSession, SessionBuilder, Target};
