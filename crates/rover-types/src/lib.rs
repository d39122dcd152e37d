use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Motion state of the drive base as seen by viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Stopped,
    Forward,
    Left,
    Right,
    Reverse,
}

impl Direction {
    /// The (left, right) motor outputs that realise this direction.
    pub fn motor_outputs(self) -> (MotorDirection, MotorDirection) {
        use MotorDirection::{Backward, Forward, Stopped};
        match self {
            Direction::Stopped => (Stopped, Stopped),
            Direction::Forward => (Forward, Forward),
            Direction::Left => (Forward, Stopped),
            Direction::Right => (Stopped, Forward),
            Direction::Reverse => (Backward, Backward),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Stopped => write!(f, "stopped"),
            Direction::Forward => write!(f, "forward"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// Output of a single H-bridge motor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorDirection {
    #[default]
    Stopped,
    Forward,
    Backward,
}

/// Commanded motion direction plus the duty cycle applied to both enable
/// lines.  Speed persists across direction changes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub direction: Direction,
    /// Duty cycle in `[0, 1]`.
    pub speed: f32,
}

/// [`ActuatorState`] together with the motor outputs actually applied, read
/// under the same lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveSnapshot {
    pub direction: Direction,
    pub speed: f32,
    pub left: MotorDirection,
    pub right: MotorDirection,
}

impl DriveSnapshot {
    /// `true` when both motor outputs match what `direction` requires.
    pub fn is_consistent(&self) -> bool {
        self.direction.motor_outputs() == (self.left, self.right)
    }
}

/// Motor speed as an integer percentage, validated to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct SpeedPercent(u8);

impl SpeedPercent {
    pub const MAX: u8 = 100;

    pub fn new(percent: i64) -> Result<Self, RoverError> {
        Self::try_from(percent)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// PWM duty cycle in `[0, 1]`.
    pub fn duty_cycle(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl TryFrom<i64> for SpeedPercent {
    type Error = RoverError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v) if v <= Self::MAX => Ok(Self(v)),
            _ => Err(RoverError::InvalidCommand(format!(
                "speed must be within 0..=100, got {value}"
            ))),
        }
    }
}

impl From<SpeedPercent> for u8 {
    fn from(speed: SpeedPercent) -> Self {
        speed.0
    }
}

/// A teleop command accepted from a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum DriveCommand {
    Stop,
    Forward,
    Left,
    Right,
    Reverse,
    Speed { value: SpeedPercent },
}

impl DriveCommand {
    /// The direction this command switches to, or `None` for speed updates.
    pub fn direction(self) -> Option<Direction> {
        match self {
            DriveCommand::Stop => Some(Direction::Stopped),
            DriveCommand::Forward => Some(Direction::Forward),
            DriveCommand::Left => Some(Direction::Left),
            DriveCommand::Right => Some(Direction::Right),
            DriveCommand::Reverse => Some(Direction::Reverse),
            DriveCommand::Speed { .. } => None,
        }
    }
}

/// One normalised gas sensor reading.
///
/// Serialises as `{"gas": <int>}`.  Values outside `0..=100` are possible
/// when the raw input was out of range; they are passed through unclamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorSample {
    pub gas: i64,
}

impl SensorSample {
    pub fn new(gas: i64) -> Self {
        Self { gas }
    }
}

/// One encoded (JPEG) video frame.  Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame(Bytes);

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

/// Error type shared by every rover crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Invalid Command: {0}")]
    InvalidCommand(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Capture Failure on {camera}: {details}")]
    CaptureFailure { camera: String, details: String },

    #[error("Broadcaster Closed: {0}")]
    Closed(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

impl RoverError {
    pub fn hardware(component: impl Into<String>, details: impl std::fmt::Display) -> Self {
        RoverError::HardwareFault {
            component: component.into(),
            details: details.to_string(),
        }
    }
}

impl From<std::io::Error> for RoverError {
    fn from(e: std::io::Error) -> Self {
        RoverError::Io(e.to_string())
    }
}
