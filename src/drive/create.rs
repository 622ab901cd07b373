// Create Open Interface over a serial byte stream
//
// Commands: one opcode byte followed by a fixed number of payload bytes.
// Sensor replies: raw packet bytes, big-endian for multi-byte fields.

use std::f64::consts::PI;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backend::{Backend, OverflowPolicy};
use super::codec::{decode_i16, encode_i16, rollover_delta};
use super::kinematics::WheelSpeeds;
use super::transport::Transport;
use crate::config::{ENCODER_COUNTS_PER_REV, HardwareVersion, LinkConfig, WHEEL_DIAMETER_MM};
use crate::error::{Error, Result};
use crate::messages::VelocityCommand;

/// Wheel travel per encoder count (mm)
const MM_PER_COUNT: f64 = PI * WHEEL_DIAMETER_MM / ENCODER_COUNTS_PER_REV;

/// Bump right | bump left in packet 7
const BUMP_MASK: u8 = 0b0000_0011;

/// Opcode table
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Start = 128,
    Safe = 131,
    Led = 139,
    Song = 140,
    Play = 141,
    Sensors = 142,
    DriveDirect = 145,
    Stop = 173,
}

/// Sensor packets this driver reads
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPacket {
    BumpsAndWheelDrops = 7, // 1 byte
    Distance = 19,          // 2 bytes, signed mm
    Angle = 20,             // 2 bytes, signed degrees
    EncoderGroup = 101,     // 28 bytes, encoders first
}

impl SensorPacket {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Reply length in bytes
    pub fn reply_len(self) -> usize {
        match self {
            SensorPacket::BumpsAndWheelDrops => 1,
            SensorPacket::Distance | SensorPacket::Angle => 2,
            SensorPacket::EncoderGroup => 28,
        }
    }
}

/// A single command frame
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Safe,
    Led { bits: u8, color: u8, intensity: u8 },
    /// Notes are (MIDI note, duration in 1/64 s)
    Song { index: u8, notes: Vec<(u8, u8)> },
    Play { index: u8 },
    Sensors(SensorPacket),
    DriveDirect(WheelSpeeds),
    Stop,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Start => Opcode::Start,
            Command::Safe => Opcode::Safe,
            Command::Led { .. } => Opcode::Led,
            Command::Song { .. } => Opcode::Song,
            Command::Play { .. } => Opcode::Play,
            Command::Sensors(_) => Opcode::Sensors,
            Command::DriveDirect(_) => Opcode::DriveDirect,
            Command::Stop => Opcode::Stop,
        }
    }

    /// Serialize to the bytes sent on the wire
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut frame = vec![self.opcode() as u8];
        match self {
            Command::Start | Command::Safe | Command::Stop => {}
            Command::Led {
                bits,
                color,
                intensity,
            } => frame.extend_from_slice(&[*bits, *color, *intensity]),
            Command::Song { index, notes } => {
                let count = u8::try_from(notes.len())
                    .map_err(|_| Error::FieldOverflow(notes.len() as i32))?;
                frame.extend_from_slice(&[*index, count]);
                for &(note, duration) in notes {
                    frame.extend_from_slice(&[note, duration]);
                }
            }
            Command::Play { index } => frame.push(*index),
            Command::Sensors(packet) => frame.push(packet.id()),
            Command::DriveDirect(speeds) => {
                // Right wheel first
                frame.extend_from_slice(&encode_i16(speeds.right as i32)?);
                frame.extend_from_slice(&encode_i16(speeds.left as i32)?);
            }
        }
        Ok(frame)
    }
}

/// Last encoder counts seen, for rollover-safe deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderState {
    pub prev_left: i16,
    pub prev_right: i16,
}

/// Hardware backend for the Create base
pub struct CreateDrive {
    transport: Box<dyn Transport>,
    version: HardwareVersion,
    wheelbase: f64,
    link: LinkConfig,
    encoders: Option<EncoderState>,
    closed: bool,
}

impl CreateDrive {
    /// Run the connection handshake on an already open link.
    ///
    /// On failure the link is dropped (and so closed) before the error
    /// is returned.
    pub fn connect(
        transport: Box<dyn Transport>,
        version: HardwareVersion,
        wheelbase: f64,
        link: LinkConfig,
    ) -> Result<Self> {
        let mut drive = Self {
            transport,
            version,
            wheelbase,
            link,
            encoders: None,
            closed: false,
        };

        if let Err(e) = drive.handshake() {
            warn!("Handshake failed, releasing link: {}", e);
            // Nothing was commanded yet, so there is nothing to stop
            drive.closed = true;
            return Err(e);
        }

        info!("Create {:?} connected", version);
        Ok(drive)
    }

    fn handshake(&mut self) -> Result<()> {
        info!("Starting Open Interface");
        self.send(&Command::Start)?;
        self.settle();

        info!("Entering safe mode");
        self.send(&Command::Safe)?;
        self.settle();

        if let Err(e) = self.greet() {
            warn!("LED/song greeting failed (ignored): {}", e);
        }

        if self.version == HardwareVersion::V2 {
            let (left, right) = self.read_encoder_counts()?;
            debug!("Seeded encoders: left={}, right={}", left, right);
            self.encoders = Some(EncoderState {
                prev_left: left,
                prev_right: right,
            });
        }
        Ok(())
    }

    /// Green power LED and a short beep
    fn greet(&mut self) -> Result<()> {
        self.send(&Command::Led {
            bits: 0,
            color: 0,
            intensity: 255,
        })?;
        self.send(&Command::Song {
            index: 0,
            notes: vec![(72, 16)],
        })?;
        self.send(&Command::Play { index: 0 })
    }

    fn settle(&self) {
        let pause = self.link.settle();
        if !pause.is_zero() {
            sleep(pause);
        }
    }

    pub fn encoder_state(&self) -> Option<EncoderState> {
        self.encoders
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        self.transport.write(&frame)?;
        self.transport.flush()
    }

    /// Read until `len` bytes arrived or the link goes quiet
    fn read_frame(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.transport.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Request a packet, re-requesting on short replies up to the attempt cap
    fn request_packet(&mut self, packet: SensorPacket) -> Result<Vec<u8>> {
        let expected = packet.reply_len();
        let attempts = self.link.read_attempts;
        let mut received = 0;

        for attempt in 1..=attempts {
            self.transport.clear_input()?;
            self.send(&Command::Sensors(packet))?;
            let data = self.read_frame(expected)?;
            if data.len() == expected {
                return Ok(data);
            }

            received = data.len();
            warn!(
                packet = packet.id(),
                attempt, received, expected, "Short sensor read, retrying"
            );
            let delay = self.link.retry_delay();
            if !delay.is_zero() {
                sleep(delay);
            }
        }

        Err(Error::ShortRead {
            packet: packet.id(),
            expected,
            received,
            attempts,
        })
    }

    fn read_encoder_counts(&mut self) -> Result<(i16, i16)> {
        let data = self.request_packet(SensorPacket::EncoderGroup)?;
        Ok((decode_i16(data[0], data[1]), decode_i16(data[2], data[3])))
    }

    fn require(&self, version: HardwareVersion, what: &str) -> Result<()> {
        if self.version != version {
            return Err(Error::Unsupported(format!(
                "{} is not available on hardware version {}",
                what,
                u8::from(self.version)
            )));
        }
        Ok(())
    }
}

impl Backend for CreateDrive {
    fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::Rescale
    }

    fn apply_velocity(
        &mut self,
        _command: VelocityCommand,
        wheels: WheelSpeeds,
        _dt: Duration,
    ) -> Result<()> {
        debug!(
            "Drive direct: left={} right={} mm/s",
            wheels.left, wheels.right
        );
        self.send(&Command::DriveDirect(wheels))
    }

    fn read_distance_delta(&mut self) -> Result<f64> {
        self.require(HardwareVersion::V1, "distance packet")?;
        let data = self.request_packet(SensorPacket::Distance)?;
        Ok(decode_i16(data[0], data[1]) as f64 / 1000.0)
    }

    fn read_angle_delta(&mut self) -> Result<f64> {
        self.require(HardwareVersion::V1, "angle packet")?;
        let data = self.request_packet(SensorPacket::Angle)?;
        Ok((decode_i16(data[0], data[1]) as f64).to_radians())
    }

    fn read_combined(&mut self) -> Result<(f64, f64)> {
        self.require(HardwareVersion::V2, "encoder odometry")?;
        let (left, right) = self.read_encoder_counts()?;

        let prev = self.encoders.unwrap_or(EncoderState {
            prev_left: left,
            prev_right: right,
        });
        let left_mm = rollover_delta(left, prev.prev_left) as f64 * MM_PER_COUNT;
        let right_mm = rollover_delta(right, prev.prev_right) as f64 * MM_PER_COUNT;
        self.encoders = Some(EncoderState {
            prev_left: left,
            prev_right: right,
        });

        let distance = (left_mm + right_mm) / 2.0 / 1000.0;
        let angle = (left_mm - right_mm) / 1000.0 / self.wheelbase;
        Ok((angle, distance))
    }

    fn is_bumped(&mut self) -> Result<bool> {
        let data = self.request_packet(SensorPacket::BumpsAndWheelDrops)?;
        Ok(data[0] & BUMP_MASK != 0)
    }

    fn resume_control(&mut self) -> Result<()> {
        debug!("Re-asserting safe mode");
        self.send(&Command::Start)?;
        self.send(&Command::Safe)?;
        self.settle();
        Ok(())
    }

    fn encoder_odometry(&self) -> bool {
        self.version == HardwareVersion::V2
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Stopping wheels and closing Open Interface");
        self.send(&Command::DriveDirect(WheelSpeeds::zero()))?;
        self.send(&Command::Stop)
    }
}

impl Drop for CreateDrive {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to stop robot on drop: {}", e);
        }
    }
}
