// Rates, physical constants, and session configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Control loop frequency bounds (Hz)
pub const MIN_UPDATE_HZ: u32 = 1;
pub const MAX_UPDATE_HZ: u32 = 20;
pub const DEFAULT_UPDATE_HZ: u32 = 10;

// Distance between wheel contact points (meters)
pub const DEFAULT_WHEELBASE: f64 = 0.235;

// Wheel speed envelope accepted by DriveDirect (mm/s)
pub const MAX_WHEEL_SPEED_MM_S: i16 = 500;

// No single blocking motion may cover more than this (meters)
pub const MAX_TRAVEL_M: f64 = 10.0;

// Speeds used by the blocking motion primitives
pub const BASE_LINEAR_SPEED: f64 = 0.1; // m/s
pub const BASE_ANGULAR_SPEED: f64 = std::f64::consts::FRAC_PI_4; // rad/s

// Loops stop once within this much of the target
pub const DISTANCE_TOLERANCE: f64 = 0.005; // meters
pub const ANGLE_TOLERANCE: f64 = 1.0 * std::f64::consts::PI / 180.0; // radians

// Version 2 wheel encoders
pub const ENCODER_COUNTS_PER_REV: f64 = 508.8;
pub const WHEEL_DIAMETER_MM: f64 = 72.0;

// Serial link defaults
pub const V1_BAUDRATE: u32 = 57_600;
pub const V2_BAUDRATE: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_READ_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 20;
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Robot generation; decides which odometry packets exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HardwareVersion {
    V1,
    V2,
}

impl HardwareVersion {
    pub fn default_baudrate(self) -> u32 {
        match self {
            HardwareVersion::V1 => V1_BAUDRATE,
            HardwareVersion::V2 => V2_BAUDRATE,
        }
    }
}

impl TryFrom<u8> for HardwareVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(HardwareVersion::V1),
            2 => Ok(HardwareVersion::V2),
            other => Err(Error::Configuration(format!(
                "unsupported hardware version {} (expected 1 or 2)",
                other
            ))),
        }
    }
}

impl From<HardwareVersion> for u8 {
    fn from(version: HardwareVersion) -> u8 {
        match version {
            HardwareVersion::V1 => 1,
            HardwareVersion::V2 => 2,
        }
    }
}

/// Multiplicative Gaussian noise on simulated velocities.
/// Zero sigmas keep the simulation deterministic; seed 0 draws from entropy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub sigma_v: f64,
    pub sigma_omega: f64,
    pub seed: u64,
}

/// Serial link tuning for the hardware backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Falls back to the version default when unset
    pub baud_rate: Option<u32>,
    pub read_timeout_ms: u64,
    /// Full request/read cycles before a short sensor read becomes an error
    pub read_attempts: u32,
    pub retry_delay_ms: u64,
    /// Pause after mode changes during the handshake
    pub settle_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Zero waits and a small retry budget, for tests against a mock link
    pub fn immediate() -> Self {
        Self {
            baud_rate: None,
            read_timeout_ms: 0,
            read_attempts: 3,
            retry_delay_ms: 0,
            settle_ms: 0,
        }
    }
}

/// Everything a session needs to know before it connects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub update_hz: u32,
    pub wheelbase: f64,
    pub hardware_version: HardwareVersion,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub link: LinkConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_hz: DEFAULT_UPDATE_HZ,
            wheelbase: DEFAULT_WHEELBASE,
            hardware_version: HardwareVersion::V2,
            noise: NoiseConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(update_hz: u32, wheelbase: f64, hardware_version: u8) -> Result<Self> {
        let config = Self {
            update_hz,
            wheelbase,
            hardware_version: HardwareVersion::try_from(hardware_version)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON session file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_update_hz(self.update_hz)?;
        if !(self.wheelbase.is_finite() && self.wheelbase > 0.0) {
            return Err(Error::Configuration(format!(
                "wheelbase must be a positive length, got {}",
                self.wheelbase
            )));
        }
        let sigma_ok = |sigma: f64| sigma.is_finite() && sigma >= 0.0;
        if !(sigma_ok(self.noise.sigma_v) && sigma_ok(self.noise.sigma_omega)) {
            return Err(Error::Configuration(
                "noise standard deviations must be finite and non-negative".to_string(),
            ));
        }
        if self.link.read_attempts == 0 {
            return Err(Error::Configuration(
                "read_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        period_for(self.update_hz)
    }

    pub fn baud_rate(&self) -> u32 {
        self.link
            .baud_rate
            .unwrap_or_else(|| self.hardware_version.default_baudrate())
    }
}

pub fn validate_update_hz(hz: u32) -> Result<()> {
    if !(MIN_UPDATE_HZ..=MAX_UPDATE_HZ).contains(&hz) {
        return Err(Error::Configuration(format!(
            "update rate {} Hz outside [{}, {}]",
            hz, MIN_UPDATE_HZ, MAX_UPDATE_HZ
        )));
    }
    Ok(())
}

pub fn period_for(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_rate_bounds() {
        assert!(SessionConfig::new(1, 0.235, 1).is_ok());
        assert!(SessionConfig::new(20, 0.235, 2).is_ok());
        assert!(matches!(
            SessionConfig::new(0, 0.235, 2),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            SessionConfig::new(21, 0.235, 2),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_hardware_version_rejected() {
        assert!(matches!(
            SessionConfig::new(10, 0.235, 3),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_wheelbase() {
        assert!(SessionConfig::new(10, 0.0, 2).is_err());
        assert!(SessionConfig::new(10, f64::NAN, 2).is_err());
    }

    #[test]
    fn test_bad_noise() {
        for sigma in [-0.1, f64::NAN, f64::INFINITY] {
            let mut config = SessionConfig::default();
            config.noise.sigma_v = sigma;
            assert!(config.validate().is_err());

            let mut config = SessionConfig::default();
            config.noise.sigma_omega = sigma;
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_period() {
        let config = SessionConfig::new(5, 0.235, 2).unwrap();
        assert_eq!(config.period(), Duration::from_millis(200));
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
            "update_hz": 20,
            "wheelbase": 0.26,
            "hardware_version": 1,
            "noise": { "sigma_v": 0.05 }
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hardware_version, HardwareVersion::V1);
        assert_eq!(config.noise.sigma_v, 0.05);
        assert_eq!(config.noise.sigma_omega, 0.0);
        assert_eq!(config.link, LinkConfig::default());
        assert_eq!(config.baud_rate(), V1_BAUDRATE);
        config.validate().unwrap();

        let bad = r#"{ "update_hz": 5, "wheelbase": 0.2, "hardware_version": 7 }"#;
        assert!(serde_json::from_str::<SessionConfig>(bad).is_err());
    }
}
