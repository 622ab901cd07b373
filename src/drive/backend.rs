// Capability surface shared by the simulated and hardware drives
//
// The session picks one implementation at construction time and the motion
// controller only ever talks to it through this trait.

use std::time::Duration;

use super::kinematics::WheelSpeeds;
use crate::error::Result;
use crate::messages::{Pose, VelocityCommand};

/// What happens when a command asks a wheel for more than the envelope allows.
///
/// The two backends deliberately disagree: the simulation treats overflow as
/// a programming error and rejects it, while the real robot rescales the
/// command and logs a warning. Do not unify these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    Reject,
    Rescale,
}

pub trait Backend: Send {
    fn overflow_policy(&self) -> OverflowPolicy;

    /// Actuate one control tick. `wheels` has already passed the overflow
    /// policy; `command` is the body velocity it was derived from.
    fn apply_velocity(
        &mut self,
        command: VelocityCommand,
        wheels: WheelSpeeds,
        dt: Duration,
    ) -> Result<()>;

    /// Meters traveled since the last distance read
    fn read_distance_delta(&mut self) -> Result<f64>;

    /// Radians turned since the last angle read
    fn read_angle_delta(&mut self) -> Result<f64>;

    /// (radians, meters) since the last read, from one sample
    fn read_combined(&mut self) -> Result<(f64, f64)>;

    /// Instantaneous bumper sample
    fn is_bumped(&mut self) -> Result<bool>;

    /// Put the robot back under command after it may have been lifted
    fn resume_control(&mut self) -> Result<()>;

    /// True when odometry must come from [`Backend::read_combined`]
    fn encoder_odometry(&self) -> bool {
        false
    }

    /// Pose snapshot, for backends that model one
    fn pose(&self) -> Option<Pose> {
        None
    }

    /// Release the device. Called at most once by the owner.
    fn close(&mut self) -> Result<()>;
}
