//! `Motor` trait for the two drive-base H-bridge channels.
//!
//! The `ActuatorController` in `rover-runtime` is the only caller; it holds
//! both motors behind one lock, so implementations need no locking of their
//! own.

use rover_types::{MotorDirection, RoverError};

/// One H-bridge motor channel.
pub trait Motor: Send + Sync {
    /// Stable identifier, e.g. `"left_motor"`.
    fn id(&self) -> &str;

    /// Drive the channel in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the driver call fails.
    fn set(&mut self, direction: MotorDirection) -> Result<(), RoverError>;

    /// The most recently applied output.
    fn direction(&self) -> MotorDirection;
}
