// Differential-drive kinematics for the two-wheeled base
// Converts body-frame velocities (linear, angular) to wheel speeds and back,
// and integrates the simulated pose.

use std::f64::consts::{PI, TAU};

use crate::config::MAX_WHEEL_SPEED_MM_S;
use crate::messages::{Pose, VelocityCommand};

/// Wheel speed commands in mm/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelSpeeds {
    pub left: i16,
    pub right: i16,
}

impl WheelSpeeds {
    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// True if either wheel is outside the DriveDirect envelope
    pub fn exceeds_bound(&self) -> bool {
        let bound = MAX_WHEEL_SPEED_MM_S as i32;
        (self.left as i32).abs() > bound || (self.right as i32).abs() > bound
    }
}

/// Solve the 2x2 differential-drive map for (left, right) wheel rates in mm/s.
///
/// `(left + right) / 2 = linear` and `(left - right) / wheelbase = angular`,
/// so a positive angular rate speeds up the left wheel.
pub fn wheel_rates_for(linear: f64, angular: f64, wheelbase: f64) -> (f64, f64) {
    let half_turn = angular * wheelbase / 2.0;
    ((linear + half_turn) * 1000.0, (linear - half_turn) * 1000.0)
}

/// [`wheel_rates_for`] as integer wheel speeds. Results truncate toward zero;
/// anything past the i16 range saturates.
pub fn wheel_speeds_for(linear: f64, angular: f64, wheelbase: f64) -> WheelSpeeds {
    let (left_mm, right_mm) = wheel_rates_for(linear, angular, wheelbase);

    // `as` truncates toward zero and saturates at the i16 limits
    WheelSpeeds {
        left: left_mm as i16,
        right: right_mm as i16,
    }
}

/// Inverse of [`wheel_speeds_for`], treating the wheel speeds as exact
pub fn velocity_for(speeds: WheelSpeeds, wheelbase: f64) -> VelocityCommand {
    let left = speeds.left as f64 / 1000.0;
    let right = speeds.right as f64 / 1000.0;
    VelocityCommand {
        linear: (left + right) / 2.0,
        angular: (left - right) / wheelbase,
    }
}

/// Rescale both wheels so the faster one sits exactly at the bound.
///
/// Returns the (possibly unchanged) speeds and whether scaling happened.
/// Only the hardware path uses this; the simulated path rejects the same
/// overflow instead.
pub fn clamp_or_scale(speeds: WheelSpeeds) -> (WheelSpeeds, bool) {
    scale_rates(speeds.left as f64, speeds.right as f64)
}

/// [`clamp_or_scale`] on unrounded rates from [`wheel_rates_for`].
///
/// The ratio comes from the raw rates, so commands far past the i16 range
/// keep their left/right proportion.
pub fn scale_rates(left: f64, right: f64) -> (WheelSpeeds, bool) {
    let bound = MAX_WHEEL_SPEED_MM_S as f64;
    if left.trunc().abs() <= bound && right.trunc().abs() <= bound {
        return (WheelSpeeds::new(left as i16, right as i16), false);
    }

    let scale = bound / left.abs().max(right.abs());

    let scaled = WheelSpeeds {
        left: scale_wheel(left, scale),
        right: scale_wheel(right, scale),
    };
    (scaled, true)
}

fn scale_wheel(speed: f64, scale: f64) -> i16 {
    let bound = MAX_WHEEL_SPEED_MM_S as f64;
    // The dominant wheel can land a hair off the bound in floating point
    (speed * scale).round().clamp(-bound, bound) as i16
}

/// Wrap an angle into (-π, π]
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// Advance a pose by one step using the midpoint heading.
///
/// x/y move along `heading + angular*dt/2`, which tracks arcs far better than
/// stepping along the start heading.
pub fn integrate_pose(pose: Pose, linear: f64, angular: f64, dt: f64) -> Pose {
    let dtheta = angular * dt;
    let mid_heading = pose.heading + dtheta / 2.0;
    let step = linear * dt;

    Pose {
        x: pose.x + step * mid_heading.cos(),
        y: pose.y + step * mid_heading.sin(),
        heading: normalize_angle(pose.heading + dtheta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHEELBASE: f64 = 0.235;

    #[test]
    fn test_zero_velocity() {
        let wheels = wheel_speeds_for(0.0, 0.0, WHEELBASE);
        assert_eq!(wheels, WheelSpeeds::zero());
    }

    #[test]
    fn test_forward_motion() {
        let wheels = wheel_speeds_for(0.2, 0.0, WHEELBASE);
        assert_eq!(wheels.left, 200);
        assert_eq!(wheels.right, 200);
    }

    #[test]
    fn test_positive_angular_speeds_up_left() {
        let wheels = wheel_speeds_for(0.0, 1.0, WHEELBASE);
        assert!(wheels.left > 0 && wheels.right < 0);
        assert_eq!(wheels.left, -wheels.right);
    }

    #[test]
    fn test_truncates_toward_zero() {
        // 0.1235 m/s -> 123.5 mm/s -> 123; negative side truncates up
        assert_eq!(wheel_speeds_for(0.1235, 0.0, WHEELBASE).left, 123);
        assert_eq!(wheel_speeds_for(-0.1235, 0.0, WHEELBASE).left, -123);
    }

    #[test]
    fn test_inverse_recovers_command() {
        // Values chosen so the mm/s results are whole numbers
        let cases = [(0.1, 0.0), (0.0, 2.0), (0.25, -1.0), (-0.3, 0.8)];
        for (linear, angular) in cases {
            let wheels = wheel_speeds_for(linear, angular, 0.25);
            assert!(!wheels.exceeds_bound());
            let back = velocity_for(wheels, 0.25);
            assert!(
                (back.linear - linear).abs() < 1e-3,
                "linear {} -> {}",
                linear,
                back.linear
            );
            assert!(
                (back.angular - angular).abs() < 1e-2,
                "angular {} -> {}",
                angular,
                back.angular
            );
        }
    }

    #[test]
    fn test_clamp_passthrough() {
        let speeds = WheelSpeeds::new(500, -500);
        assert_eq!(clamp_or_scale(speeds), (speeds, false));
    }

    #[test]
    fn test_clamp_scales_proportionally() {
        let (scaled, was_scaled) = clamp_or_scale(WheelSpeeds::new(1000, 400));
        assert!(was_scaled);
        assert_eq!(scaled, WheelSpeeds::new(500, 200));

        let (scaled, _) = clamp_or_scale(WheelSpeeds::new(-300, -750));
        assert_eq!(scaled, WheelSpeeds::new(-200, -500));
    }

    #[test]
    fn test_clamp_handles_i16_min() {
        let (scaled, was_scaled) = clamp_or_scale(WheelSpeeds::new(i16::MIN, 0));
        assert!(was_scaled);
        assert_eq!(scaled, WheelSpeeds::new(-500, 0));
    }

    #[test]
    fn test_scale_keeps_ratio_past_i16() {
        // 147 m/s and 53 m/s: both far past what an i16 can hold
        let (left, right) = wheel_rates_for(100.0, 400.0, WHEELBASE);
        let (scaled, was_scaled) = scale_rates(left, right);
        assert!(was_scaled);
        assert_eq!(scaled, WheelSpeeds::new(500, 180));
    }

    #[test]
    fn test_scale_rates_truncates_in_range() {
        assert_eq!(
            scale_rates(500.9, -499.7),
            (WheelSpeeds::new(500, -499), false)
        );
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert_eq!(normalize_angle(0.5), 0.5);
    }

    #[test]
    fn test_straight_step_is_exact() {
        let pose = Pose::new(1.0, -2.0, 0.7);
        let next = integrate_pose(pose, 0.3, 0.0, 1.0);
        assert_eq!(next.x, 1.0 + 0.3 * 0.7f64.cos());
        assert_eq!(next.y, -2.0 + 0.3 * 0.7f64.sin());
        assert_eq!(next.heading, 0.7);
    }

    #[test]
    fn test_step_uses_midpoint_heading() {
        let pose = Pose::default();
        let next = integrate_pose(pose, 1.0, PI / 2.0, 1.0);
        // Midpoint heading is π/4
        assert!((next.x - (PI / 4.0).cos()).abs() < 1e-12);
        assert!((next.y - (PI / 4.0).sin()).abs() < 1e-12);
        assert!((next.heading - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_heading_wraps() {
        let pose = Pose::new(0.0, 0.0, 3.0);
        let next = integrate_pose(pose, 0.0, 1.0, 1.0);
        assert!(next.heading <= PI && next.heading > -PI);
        assert!((next.heading - (4.0 - TAU)).abs() < 1e-12);
    }
}
