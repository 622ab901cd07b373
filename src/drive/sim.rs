// Kinematic stand-in for the robot
//
// Integrates the commanded body velocity into a pose each tick and keeps
// distance/angle accumulators that play the role of the odometry sensors.

use std::time::Duration;

use tracing::{debug, info};

use super::backend::{Backend, OverflowPolicy};
use super::kinematics::{WheelSpeeds, integrate_pose};
use super::noise::NoiseGenerator;
use crate::config::NoiseConfig;
use crate::error::Result;
use crate::messages::{Pose, VelocityCommand};

type PoseObserver = Box<dyn FnMut(&Pose) + Send>;

pub struct SimulatedDrive {
    pose: Pose,
    distance: f64,
    angle: f64,
    noise_config: NoiseConfig,
    noise: NoiseGenerator,
    observer: Option<PoseObserver>,
}

impl SimulatedDrive {
    pub fn new(noise_config: NoiseConfig) -> Self {
        Self::with_pose(Pose::default(), noise_config)
    }

    pub fn with_pose(pose: Pose, noise_config: NoiseConfig) -> Self {
        info!(
            "Simulated drive at ({:.3}, {:.3}, {:.3} rad), noise sigma_v={} sigma_omega={}",
            pose.x, pose.y, pose.heading, noise_config.sigma_v, noise_config.sigma_omega
        );
        Self {
            pose,
            distance: 0.0,
            angle: 0.0,
            noise: NoiseGenerator::new(noise_config.seed),
            noise_config,
            observer: None,
        }
    }

    /// Receive every pose the simulation produces, e.g. to draw it
    pub fn set_pose_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&Pose) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn current_pose(&self) -> Pose {
        self.pose
    }
}

impl Backend for SimulatedDrive {
    fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::Reject
    }

    fn apply_velocity(
        &mut self,
        command: VelocityCommand,
        _wheels: WheelSpeeds,
        dt: Duration,
    ) -> Result<()> {
        let dt = dt.as_secs_f64();
        let linear = self.noise.perturb(command.linear, self.noise_config.sigma_v);
        let angular = self
            .noise
            .perturb(command.angular, self.noise_config.sigma_omega);

        self.pose = integrate_pose(self.pose, linear, angular, dt);
        self.distance += linear * dt;
        self.angle += angular * dt;

        debug!(
            "Sim pose x={:.4} y={:.4} heading={:.4}",
            self.pose.x, self.pose.y, self.pose.heading
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.pose);
        }
        Ok(())
    }

    fn read_distance_delta(&mut self) -> Result<f64> {
        Ok(std::mem::take(&mut self.distance))
    }

    fn read_angle_delta(&mut self) -> Result<f64> {
        Ok(std::mem::take(&mut self.angle))
    }

    fn read_combined(&mut self) -> Result<(f64, f64)> {
        let angle = self.read_angle_delta()?;
        let distance = self.read_distance_delta()?;
        Ok((angle, distance))
    }

    // No collision model
    fn is_bumped(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn resume_control(&mut self) -> Result<()> {
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        Some(self.pose)
    }

    fn close(&mut self) -> Result<()> {
        self.observer = None;
        info!("Simulated drive closed");
        Ok(())
    }
}
