// Blocking motion primitives built on a single paced velocity write
//
// setVelocity is the only path that reaches Backend::apply_velocity. The
// drive and rotate loops repeat it once per tick while polling odometry,
// until the target is reached or something aborts them.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{
    ANGLE_TOLERANCE, BASE_ANGULAR_SPEED, BASE_LINEAR_SPEED, DISTANCE_TOLERANCE, MAX_TRAVEL_M,
};
use crate::drive::backend::{Backend, OverflowPolicy};
use crate::drive::kinematics::{
    WheelSpeeds, normalize_angle, scale_rates, wheel_rates_for, wheel_speeds_for,
};
use crate::error::{Error, Result};
use crate::messages::{MotionOutcome, MotionState, Pose, VelocityCommand};
use crate::pacing::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Odometry {
    Distance,
    Angle,
}

pub struct MotionController {
    backend: Box<dyn Backend>,
    limiter: RateLimiter,
    wheelbase: f64,
    linear_speed: f64,
    angular_speed: f64,
    state: MotionState,
}

impl MotionController {
    pub fn new(backend: Box<dyn Backend>, period: Duration, wheelbase: f64) -> Self {
        Self {
            backend,
            limiter: RateLimiter::new(period),
            wheelbase,
            linear_speed: BASE_LINEAR_SPEED,
            angular_speed: BASE_ANGULAR_SPEED,
            state: MotionState::Idle,
        }
    }

    /// Speeds the blocking loops command (m/s, rad/s); magnitudes only
    pub fn set_base_speeds(&mut self, linear: f64, angular: f64) {
        self.linear_speed = linear.abs();
        self.angular_speed = angular.abs();
    }

    pub fn set_period(&mut self, period: Duration) {
        self.limiter.set_period(period);
    }

    pub fn period(&self) -> Duration {
        self.limiter.period()
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn pose(&self) -> Option<Pose> {
        self.backend.pose()
    }

    /// Command one tick of body velocity (m/s, rad/s).
    ///
    /// Overflow handling depends on the backend: the simulation rejects a
    /// command that needs more than the wheel envelope, the hardware rescales
    /// it and warns. Returns the wheel speeds actually applied.
    pub fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<WheelSpeeds> {
        if !(linear.is_finite() && angular.is_finite()) {
            return Err(Error::Configuration(format!(
                "velocity must be finite, got linear={} angular={}",
                linear, angular
            )));
        }
        let (left_mm, right_mm) = wheel_rates_for(linear, angular, self.wheelbase);

        let wheels = match self.backend.overflow_policy() {
            OverflowPolicy::Reject => {
                let requested = wheel_speeds_for(linear, angular, self.wheelbase);
                if requested.exceeds_bound() {
                    return Err(Error::wheel_overflow(left_mm as i32, right_mm as i32));
                }
                requested
            }
            OverflowPolicy::Rescale => {
                let (wheels, scaled) = scale_rates(left_mm, right_mm);
                if scaled {
                    warn!(
                        "Wheel speeds {:.0}/{:.0} mm/s out of range, rescaled to {}/{}",
                        left_mm, right_mm, wheels.left, wheels.right
                    );
                }
                wheels
            }
        };

        self.limiter.tick();
        self.backend.apply_velocity(
            VelocityCommand::new(linear, angular),
            wheels,
            self.limiter.period(),
        )?;
        Ok(wheels)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.set_velocity(0.0, 0.0).map(|_| ())
    }

    /// Drive straight for `target` meters (negative drives backward)
    pub fn drive_distance(&mut self, target: f64) -> Result<MotionOutcome> {
        self.drive_distance_until(target, || false)
    }

    /// Like [`Self::drive_distance`], also stopping as soon as `abort` returns true
    pub fn drive_distance_until<F>(&mut self, target: f64, mut abort: F) -> Result<MotionOutcome>
    where
        F: FnMut() -> bool,
    {
        check_travel(target.abs())?;
        let sign = direction(target);
        info!("Driving {:.3} m", target);

        let command = VelocityCommand::new(sign * self.linear_speed, 0.0);
        let outcome = self.run_motion(
            target.abs(),
            DISTANCE_TOLERANCE,
            command,
            Odometry::Distance,
            &mut abort,
        )?;
        Ok(MotionOutcome {
            covered: sign * outcome.covered,
            ..outcome
        })
    }

    /// Turn in place by `target` radians, taking the short way round
    pub fn rotate_angle(&mut self, target: f64) -> Result<MotionOutcome> {
        self.rotate_angle_until(target, || false)
    }

    pub fn rotate_angle_until<F>(&mut self, target: f64, mut abort: F) -> Result<MotionOutcome>
    where
        F: FnMut() -> bool,
    {
        check_travel(target.abs() * self.wheelbase / 2.0)?;
        let normalized = normalize_angle(target);
        let sign = direction(normalized);
        info!(
            "Rotating {:.4} rad (requested {:.4} rad)",
            normalized, target
        );

        let command = VelocityCommand::new(0.0, sign * self.angular_speed);
        let outcome = self.run_motion(
            normalized.abs(),
            ANGLE_TOLERANCE,
            command,
            Odometry::Angle,
            &mut abort,
        )?;
        Ok(MotionOutcome {
            covered: sign * outcome.covered,
            ..outcome
        })
    }

    /// Shared Idle -> Moving -> {Reached, Aborted} loop. Always ends by
    /// commanding zero velocity, including when a tick fails.
    fn run_motion(
        &mut self,
        goal: f64,
        tolerance: f64,
        command: VelocityCommand,
        odometry: Odometry,
        abort: &mut dyn FnMut() -> bool,
    ) -> Result<MotionOutcome> {
        self.backend.resume_control()?;
        // Discard whatever accumulated before this motion
        self.poll(odometry)?;

        self.state = MotionState::Moving;
        let result = self.motion_loop(goal, tolerance, command, odometry, abort);
        let stopped = self.stop();

        match result {
            Ok(outcome) => {
                stopped?;
                self.state = if outcome.stopped_early {
                    MotionState::Aborted
                } else {
                    MotionState::Reached
                };
                info!(
                    "Motion {:?}: covered {:.4} of {:.4}",
                    self.state, outcome.covered, goal
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(stop_err) = stopped {
                    warn!("Failed to stop after motion error: {}", stop_err);
                }
                self.state = MotionState::Aborted;
                Err(e)
            }
        }
    }

    fn motion_loop(
        &mut self,
        goal: f64,
        tolerance: f64,
        command: VelocityCommand,
        odometry: Odometry,
        abort: &mut dyn FnMut() -> bool,
    ) -> Result<MotionOutcome> {
        let mut covered = 0.0;
        loop {
            if covered >= goal - tolerance {
                return Ok(MotionOutcome {
                    covered,
                    stopped_early: false,
                });
            }
            if abort() {
                info!("Motion aborted by caller");
                return Ok(MotionOutcome {
                    covered,
                    stopped_early: true,
                });
            }
            if self.backend.is_bumped()? {
                info!("Bump detected, aborting motion");
                return Ok(MotionOutcome {
                    covered,
                    stopped_early: true,
                });
            }

            self.set_velocity(command.linear, command.angular)?;
            covered += self.poll(odometry)?.abs();
            debug!("Covered {:.4} / {:.4}", covered, goal);
        }
    }

    fn poll(&mut self, odometry: Odometry) -> Result<f64> {
        if self.backend.encoder_odometry() {
            let (angle, distance) = self.backend.read_combined()?;
            return Ok(match odometry {
                Odometry::Distance => distance,
                Odometry::Angle => angle,
            });
        }
        match odometry {
            Odometry::Distance => self.backend.read_distance_delta(),
            Odometry::Angle => self.backend.read_angle_delta(),
        }
    }

    /// Meters since the last read
    pub fn distance_delta(&mut self) -> Result<f64> {
        self.backend.read_distance_delta()
    }

    /// Radians since the last read
    pub fn angle_delta(&mut self) -> Result<f64> {
        self.backend.read_angle_delta()
    }

    /// (radians, meters) since the last read
    pub fn angle_and_distance_delta(&mut self) -> Result<(f64, f64)> {
        self.backend.read_combined()
    }

    pub fn is_bumped(&mut self) -> Result<bool> {
        self.backend.is_bumped()
    }

    pub fn resume_control(&mut self) -> Result<()> {
        self.backend.resume_control()
    }

    pub fn close(&mut self) -> Result<()> {
        self.backend.close()
    }
}

fn direction(value: f64) -> f64 {
    if value < 0.0 { -1.0 } else { 1.0 }
}

fn check_travel(meters: f64) -> Result<()> {
    if !(meters <= MAX_TRAVEL_M) {
        return Err(Error::SafetyLimit {
            requested: meters,
            limit: MAX_TRAVEL_M,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HardwareVersion, LinkConfig, NoiseConfig};
    use crate::drive::{CreateDrive, MockTransport, SimulatedDrive};
    use std::f64::consts::PI;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    const WHEELBASE: f64 = 0.235;
    const FAST: Duration = Duration::from_millis(50);

    fn sim_controller() -> MotionController {
        MotionController::new(
            Box::new(SimulatedDrive::new(NoiseConfig::default())),
            FAST,
            WHEELBASE,
        )
    }

    /// v1 robot that reports 10 mm per distance request and bumps after
    /// `bump_after` bumper samples
    fn bumping_robot(bump_after: usize) -> MockTransport {
        let samples = Arc::new(Mutex::new(0usize));
        MockTransport::with_responder(move |request| match request {
            [142, 7] => {
                let mut n = samples.lock().unwrap();
                *n += 1;
                vec![if *n > bump_after { 0x01 } else { 0x00 }]
            }
            [142, 19] => 10i16.to_be_bytes().to_vec(),
            [142, 20] => 0i16.to_be_bytes().to_vec(),
            _ => Vec::new(),
        })
    }

    fn hardware_controller(mock: &MockTransport, version: HardwareVersion) -> MotionController {
        let drive = CreateDrive::connect(
            Box::new(mock.clone()),
            version,
            WHEELBASE,
            LinkConfig::immediate(),
        )
        .unwrap();
        MotionController::new(Box::new(drive), FAST, WHEELBASE)
    }

    #[test]
    fn test_sim_drive_reaches_target() {
        let mut controller = sim_controller();
        let outcome = controller.drive_distance(0.05).unwrap();
        assert!(!outcome.stopped_early);
        assert!((outcome.covered - 0.05).abs() <= DISTANCE_TOLERANCE + 1e-9);
        assert_eq!(controller.state(), MotionState::Reached);

        let pose = controller.pose().unwrap();
        assert!((pose.x - outcome.covered).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-12);
    }

    #[test]
    fn test_sim_drive_backward() {
        let mut controller = sim_controller();
        let outcome = controller.drive_distance(-0.03).unwrap();
        assert!(outcome.covered < 0.0);
        assert!(controller.pose().unwrap().x < 0.0);
    }

    #[test]
    fn test_safety_limit() {
        let mut controller = sim_controller();
        let err = controller.drive_distance(10.5).unwrap_err();
        assert!(matches!(err, Error::SafetyLimit { .. }));
        assert_eq!(controller.pose().unwrap(), Pose::default());
        assert_eq!(controller.state(), MotionState::Idle);

        assert!(controller.drive_distance(f64::NAN).is_err());
        // 200 rad of arc on a 0.235 m base is well past 10 m
        assert!(matches!(
            controller.rotate_angle(200.0),
            Err(Error::SafetyLimit { .. })
        ));
    }

    #[test]
    fn test_zero_distance_is_immediate() {
        let mut controller = sim_controller();
        let outcome = controller.drive_distance(0.0).unwrap();
        assert_eq!(outcome.covered, 0.0);
        assert!(!outcome.stopped_early);
    }

    #[test]
    fn test_caller_abort() {
        let mut controller = sim_controller();
        let mut polls = 0;
        let outcome = controller
            .drive_distance_until(1.0, || {
                polls += 1;
                polls > 2
            })
            .unwrap();
        assert!(outcome.stopped_early);
        assert!(outcome.covered > 0.0 && outcome.covered < 0.1);
        assert_eq!(controller.state(), MotionState::Aborted);
    }

    #[test]
    fn test_rotate_wraps_three_pi_to_pi() {
        let mut controller = sim_controller();
        controller.set_base_speeds(BASE_LINEAR_SPEED, 3.0);
        let outcome = controller.rotate_angle(3.0 * PI).unwrap();
        assert!(!outcome.stopped_early);
        // Turned the positive way, about half a revolution
        assert!(outcome.covered > 0.0);
        assert!((outcome.covered - PI).abs() < ANGLE_TOLERANCE + 3.0 * FAST.as_secs_f64());
    }

    #[test]
    fn test_rotate_short_way() {
        let mut controller = sim_controller();
        controller.set_base_speeds(BASE_LINEAR_SPEED, 3.0);
        // -3π/2 is the same heading as +π/2
        let outcome = controller.rotate_angle(-1.5 * PI).unwrap();
        assert!(outcome.covered > 0.0);
        assert!(outcome.covered < PI);
        let heading = controller.pose().unwrap().heading;
        assert!(heading > 0.0);
    }

    #[test]
    fn test_sim_rejects_overflow() {
        let mut controller = sim_controller();
        let err = controller.set_velocity(1.0, 0.0).unwrap_err();
        assert!(matches!(
            err,
            Error::WheelSpeedOverflow {
                left: 1000,
                right: 1000,
                limit: 500
            }
        ));
        assert_eq!(controller.pose().unwrap(), Pose::default());
    }

    #[test]
    fn test_hardware_rescales_overflow() {
        let mock = bumping_robot(usize::MAX);
        let mut controller = hardware_controller(&mock, HardwareVersion::V1);
        mock.clear_writes();

        let wheels = controller.set_velocity(1.0, 0.0).unwrap();
        assert_eq!(wheels, WheelSpeeds::new(500, 500));
        assert_eq!(mock.writes(), vec![vec![145, 0x01, 0xF4, 0x01, 0xF4]]);
    }

    #[test]
    fn test_hardware_rescale_keeps_turn_ratio() {
        let mock = bumping_robot(usize::MAX);
        let mut controller = hardware_controller(&mock, HardwareVersion::V1);

        let wheels = controller.set_velocity(100.0, 400.0).unwrap();
        assert_eq!(wheels, WheelSpeeds::new(500, 180));
    }

    #[test]
    fn test_non_finite_velocity_rejected() {
        let mut controller = sim_controller();
        for (linear, angular) in [(f64::NAN, 0.0), (0.1, f64::INFINITY)] {
            let err = controller.set_velocity(linear, angular).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
        }
        assert_eq!(controller.pose().unwrap(), Pose::default());
    }

    #[test]
    fn test_hardware_bump_aborts_drive() {
        let mock = bumping_robot(3);
        let mut controller = hardware_controller(&mock, HardwareVersion::V1);
        mock.clear_writes();

        let outcome = controller.drive_distance(1.0).unwrap();
        assert!(outcome.stopped_early);
        assert!((outcome.covered - 0.03).abs() < 1e-9);
        assert_eq!(controller.state(), MotionState::Aborted);

        let writes = mock.writes();
        // Resume control first, zero velocity last
        assert_eq!(writes[0], vec![128]);
        assert_eq!(writes[1], vec![131]);
        assert_eq!(writes.last().unwrap(), &vec![145, 0, 0, 0, 0]);
        let forward = writes.iter().filter(|w| w[..] == [145, 0, 100, 0, 100]).count();
        assert_eq!(forward, 3);
    }

    #[test]
    fn test_hardware_v2_uses_encoders() {
        let counts = Arc::new(Mutex::new(0i16));
        let ticks = Arc::clone(&counts);
        let mock = MockTransport::with_responder(move |request| match request {
            [142, 7] => vec![0],
            [142, 101] => {
                let mut c = ticks.lock().unwrap();
                let reply = [c.to_be_bytes(), c.to_be_bytes()].concat();
                // Each request sees both wheels 50 counts further on
                *c = c.wrapping_add(50);
                let mut frame = reply;
                frame.resize(28, 0);
                frame
            }
            _ => Vec::new(),
        });
        let mut controller = hardware_controller(&mock, HardwareVersion::V2);
        let outcome = controller.drive_distance(0.02).unwrap();
        assert!(!outcome.stopped_early);
        assert!(outcome.covered >= 0.02 - DISTANCE_TOLERANCE);
        assert!(mock.writes().iter().all(|w| w[..] != [142, 19]));
    }

    #[test]
    fn test_set_velocity_is_paced() {
        let mut controller = MotionController::new(
            Box::new(SimulatedDrive::new(NoiseConfig::default())),
            Duration::from_millis(200),
            WHEELBASE,
        );
        controller.set_velocity(0.1, 0.0).unwrap();
        let start = Instant::now();
        controller.set_velocity(0.1, 0.0).unwrap();
        assert!(start.elapsed() + Duration::from_millis(5) >= Duration::from_millis(200));
    }

    #[test]
    fn test_unsupported_combined_on_v1() {
        let mock = bumping_robot(usize::MAX);
        let mut controller = hardware_controller(&mock, HardwareVersion::V1);
        assert!(matches!(
            controller.angle_and_distance_delta(),
            Err(Error::Unsupported(_))
        ));
        assert!((controller.distance_delta().unwrap() - 0.01).abs() < 1e-12);
    }
}
