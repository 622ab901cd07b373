// Public robot session: picks a backend once, converts units at the boundary
//
// Callers speak centimeters and degrees; everything below this file works in
// meters and radians.

use tracing::{info, warn};

use crate::config::{HardwareVersion, LinkConfig, NoiseConfig, SessionConfig, validate_update_hz};
use crate::controller::MotionController;
use crate::drive::{Backend, CreateDrive, SerialTransport, SimulatedDrive, Transport};
use crate::error::Result;
use crate::messages::{MotionOutcome, MotionState, Pose};

type PoseObserver = Box<dyn FnMut(&Pose) + Send>;

/// Which backend a session drives
pub enum Target {
    Simulated,
    /// Serial port path, e.g. `/dev/ttyUSB0`
    Serial(String),
    /// An already open byte stream
    Transport(Box<dyn Transport>),
}

/// Configures and connects a [`RobotSession`]
pub struct SessionBuilder {
    update_hz: u32,
    wheelbase: f64,
    hardware_version: u8,
    noise: NoiseConfig,
    link: LinkConfig,
    start_pose: Pose,
    observer: Option<PoseObserver>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            update_hz: defaults.update_hz,
            wheelbase: defaults.wheelbase,
            hardware_version: defaults.hardware_version.into(),
            noise: defaults.noise,
            link: defaults.link,
            start_pose: Pose::default(),
            observer: None,
        }
    }
}

impl SessionBuilder {
    pub fn update_hz(mut self, hz: u32) -> Self {
        self.update_hz = hz;
        self
    }

    pub fn wheelbase(mut self, meters: f64) -> Self {
        self.wheelbase = meters;
        self
    }

    /// 1 or 2; anything else fails at connect
    pub fn hardware_version(mut self, version: u8) -> Self {
        self.hardware_version = version;
        self
    }

    pub fn noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    pub fn link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Simulation only
    pub fn start_pose(mut self, pose: Pose) -> Self {
        self.start_pose = pose;
        self
    }

    /// Simulation only: called with every new pose
    pub fn pose_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&Pose) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn connect(self, target: Target) -> Result<RobotSession> {
        let config = SessionConfig {
            update_hz: self.update_hz,
            wheelbase: self.wheelbase,
            hardware_version: HardwareVersion::try_from(self.hardware_version)?,
            noise: self.noise,
            link: self.link,
        };
        config.validate()?;

        let backend: Box<dyn Backend> = match target {
            Target::Simulated => {
                let mut sim = SimulatedDrive::with_pose(self.start_pose, config.noise);
                if let Some(observer) = self.observer {
                    sim.set_pose_observer(observer);
                }
                Box::new(sim)
            }
            Target::Serial(path) => {
                let transport =
                    SerialTransport::open(&path, config.baud_rate(), config.link.read_timeout())?;
                Box::new(CreateDrive::connect(
                    Box::new(transport),
                    config.hardware_version,
                    config.wheelbase,
                    config.link.clone(),
                )?)
            }
            Target::Transport(transport) => Box::new(CreateDrive::connect(
                transport,
                config.hardware_version,
                config.wheelbase,
                config.link.clone(),
            )?),
        };

        info!(
            "Session ready: {} Hz, wheelbase {:.3} m, hardware {:?}",
            config.update_hz, config.wheelbase, config.hardware_version
        );
        Ok(RobotSession {
            controller: MotionController::new(backend, config.period(), config.wheelbase),
            config,
            closed: false,
        })
    }
}

/// One robot, one backend, for the lifetime of the session
pub struct RobotSession {
    controller: MotionController,
    config: SessionConfig,
    closed: bool,
}

impl RobotSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Connect using a validated config (e.g. loaded from JSON)
    pub fn connect(config: SessionConfig, target: Target) -> Result<Self> {
        RobotSession::builder()
            .update_hz(config.update_hz)
            .wheelbase(config.wheelbase)
            .hardware_version(config.hardware_version.into())
            .noise(config.noise)
            .link(config.link)
            .connect(target)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> MotionState {
        self.controller.state()
    }

    /// Simulated pose, `None` on hardware
    pub fn pose(&self) -> Option<Pose> {
        self.controller.pose()
    }

    pub fn resume_control(&mut self) -> Result<()> {
        self.controller.resume_control()
    }

    /// One paced tick at `linear` m/s and `angular` rad/s
    pub fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<()> {
        self.controller.set_velocity(linear, angular).map(|_| ())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.controller.stop()
    }

    /// Outcome `covered` is in centimeters
    pub fn drive_forward(&mut self, distance_cm: f64) -> Result<MotionOutcome> {
        self.drive_cm(distance_cm.abs())
    }

    pub fn drive_backward(&mut self, distance_cm: f64) -> Result<MotionOutcome> {
        self.drive_cm(-distance_cm.abs())
    }

    fn drive_cm(&mut self, distance_cm: f64) -> Result<MotionOutcome> {
        let outcome = self.controller.drive_distance(distance_cm / 100.0)?;
        Ok(MotionOutcome {
            covered: outcome.covered * 100.0,
            ..outcome
        })
    }

    /// Positive turns the same way as a positive angular velocity.
    /// Outcome `covered` is in degrees.
    pub fn rotate(&mut self, angle_deg: f64) -> Result<MotionOutcome> {
        let outcome = self.controller.rotate_angle(angle_deg.to_radians())?;
        Ok(MotionOutcome {
            covered: outcome.covered.to_degrees(),
            ..outcome
        })
    }

    pub fn turn_left(&mut self, angle_deg: f64) -> Result<MotionOutcome> {
        self.rotate(angle_deg.abs())
    }

    pub fn turn_right(&mut self, angle_deg: f64) -> Result<MotionOutcome> {
        self.rotate(-angle_deg.abs())
    }

    pub fn is_bumped(&mut self) -> Result<bool> {
        self.controller.is_bumped()
    }

    /// Centimeters since the last read
    pub fn distance_sensor(&mut self) -> Result<f64> {
        Ok(self.controller.distance_delta()? * 100.0)
    }

    /// Degrees since the last read
    pub fn angle_sensor(&mut self) -> Result<f64> {
        Ok(self.controller.angle_delta()?.to_degrees())
    }

    /// (degrees, centimeters) since the last read
    pub fn angle_and_distance_sensor(&mut self) -> Result<(f64, f64)> {
        let (angle, distance) = self.controller.angle_and_distance_delta()?;
        Ok((angle.to_degrees(), distance * 100.0))
    }

    pub fn set_update_rate(&mut self, hz: u32) -> Result<()> {
        validate_update_hz(hz)?;
        self.config.update_hz = hz;
        self.controller.set_period(self.config.period());
        info!("Update rate set to {} Hz", hz);
        Ok(())
    }

    /// Release the backend. Dropping the session does the same.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing session");
        self.controller.close()
    }
}

impl Drop for RobotSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to close session cleanly: {}", e);
        }
    }
}
