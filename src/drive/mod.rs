// Drive layer for the two-wheeled base
//
// Provides:
// - Differential-drive kinematics and pose integration
// - Open Interface wire codec (two's complement fields, rollover deltas)
// - The Backend capability trait with simulated and hardware implementations
// - The byte-stream transport seam (serial port, in-memory mock)

pub mod backend;
pub mod codec;
pub mod create;
pub mod kinematics;
pub mod mock;
mod noise;
pub mod sim;
pub mod transport;

pub use backend::{Backend, OverflowPolicy};
pub use create::{Command, CreateDrive, EncoderState, Opcode, SensorPacket};
pub use kinematics::{
    WheelSpeeds, clamp_or_scale, integrate_pose, scale_rates, wheel_rates_for, wheel_speeds_for,
};
pub use mock::MockTransport;
pub use noise::NoiseGenerator;
pub use sim::SimulatedDrive;
pub use transport::{SerialTransport, Transport};
