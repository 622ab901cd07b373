// Error types shared by every layer of the drive stack

use crate::config::MAX_WHEEL_SPEED_MM_S;

/// Errors raised while configuring, connecting to, or driving the robot
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Wheel speed overflow: left={left} right={right} mm/s exceeds ±{limit} mm/s")]
    WheelSpeedOverflow { left: i32, right: i32, limit: i16 },

    #[error("Value {0} does not fit a signed 16-bit field")]
    FieldOverflow(i32),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read of sensor packet {packet}: expected {expected} bytes, got {received} after {attempts} attempts")]
    ShortRead {
        packet: u8,
        expected: usize,
        received: usize,
        attempts: u32,
    },

    #[error("Safety limit: requested {requested:.3} m exceeds the {limit:.1} m bound")]
    SafetyLimit { requested: f64, limit: f64 },
}

impl Error {
    /// True for failures of the byte stream itself (open, I/O, short reads)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Serial(_) | Error::Io(_) | Error::ShortRead { .. }
        )
    }

    pub(crate) fn wheel_overflow(left: i32, right: i32) -> Self {
        Error::WheelSpeedOverflow {
            left,
            right,
            limit: MAX_WHEEL_SPEED_MM_S,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Configuration(format!("invalid session config: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
