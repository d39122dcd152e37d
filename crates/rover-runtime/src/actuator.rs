//! [`ActuatorController`] – the drive-base state machine.
//!
//! Owns the two motor channels, their PWM enable lines and the
//! [`ActuatorState`].  All commands go through one mutex that is held for the
//! full application of a command, including the implicit stop that precedes
//! every direction change:
//!
//! | Command | Left motor | Right motor |
//! |---|---|---|
//! | `stop` | stopped | stopped |
//! | `forward` | forward | forward |
//! | `left` | forward | stopped |
//! | `right` | stopped | forward |
//! | `reverse` | backward | backward |
//!
//! Speed is independent of direction: `set_speed` only touches the enable
//! lines and direction changes never touch them.

use std::sync::{Mutex, MutexGuard};

use rover_hal::{Motor, PwmOutput};
use rover_types::{
    ActuatorState, Direction, DriveCommand, DriveSnapshot, MotorDirection, RoverError,
    SpeedPercent,
};
use tracing::{info, instrument, warn};

/// The drive-base hardware handed to the controller.
pub struct DriveTrain {
    pub left: Box<dyn Motor>,
    pub right: Box<dyn Motor>,
    pub left_enable: Box<dyn PwmOutput>,
    pub right_enable: Box<dyn PwmOutput>,
}

struct Inner {
    drive: DriveTrain,
    state: ActuatorState,
}

/// Serialises direction and speed commands over a [`DriveTrain`].
pub struct ActuatorController {
    inner: Mutex<Inner>,
}

impl ActuatorController {
    /// Take ownership of `drive`.  The initial state is stopped at speed 0;
    /// no hardware call is made until the first command.
    pub fn new(drive: DriveTrain) -> Self {
        Self {
            inner: Mutex::new(Inner {
                drive,
                state: ActuatorState::default(),
            }),
        }
    }

    /// Apply one command atomically with respect to every other command.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when a driver call fails.  A
    /// failed direction change leaves both motors stopped.
    #[instrument(level = "debug", skip(self))]
    pub fn apply(&self, command: DriveCommand) -> Result<ActuatorState, RoverError> {
        let mut inner = self.lock()?;
        let state = match command {
            DriveCommand::Speed { value } => inner.set_speed(value)?,
            _ => {
                let target = command.direction().unwrap_or(Direction::Stopped);
                inner.change_direction(target)?
            }
        };
        info!(?command, direction = %state.direction, speed = state.speed, "drive command applied");
        Ok(state)
    }

    pub fn stop(&self) -> Result<ActuatorState, RoverError> {
        self.apply(DriveCommand::Stop)
    }

    pub fn forward(&self) -> Result<ActuatorState, RoverError> {
        self.apply(DriveCommand::Forward)
    }

    pub fn left(&self) -> Result<ActuatorState, RoverError> {
        self.apply(DriveCommand::Left)
    }

    pub fn right(&self) -> Result<ActuatorState, RoverError> {
        self.apply(DriveCommand::Right)
    }

    pub fn reverse(&self) -> Result<ActuatorState, RoverError> {
        self.apply(DriveCommand::Reverse)
    }

    /// Set both enable lines to `percent / 100`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::InvalidCommand`] for values outside `0..=100`
    /// without touching the hardware.
    pub fn set_speed(&self, percent: i64) -> Result<ActuatorState, RoverError> {
        let value = SpeedPercent::try_from(percent)?;
        self.apply(DriveCommand::Speed { value })
    }

    pub fn state(&self) -> Result<ActuatorState, RoverError> {
        Ok(self.lock()?.state)
    }

    /// State plus the outputs the motors report, read under one lock.
    pub fn snapshot(&self) -> Result<DriveSnapshot, RoverError> {
        let inner = self.lock()?;
        Ok(DriveSnapshot {
            direction: inner.state.direction,
            speed: inner.state.speed,
            left: inner.drive.left.direction(),
            right: inner.drive.right.direction(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RoverError> {
        self.inner
            .lock()
            .map_err(|_| RoverError::hardware("actuator_controller", "state lock poisoned"))
    }
}

impl Inner {
    fn halt(&mut self) -> Result<(), RoverError> {
        self.drive.left.set(MotorDirection::Stopped)?;
        self.drive.right.set(MotorDirection::Stopped)?;
        self.state.direction = Direction::Stopped;
        Ok(())
    }

    fn change_direction(&mut self, target: Direction) -> Result<ActuatorState, RoverError> {
        self.halt()?;
        if target == Direction::Stopped {
            return Ok(self.state);
        }

        let (left, right) = target.motor_outputs();
        let applied = self
            .drive
            .left
            .set(left)
            .and_then(|()| self.drive.right.set(right));
        if let Err(e) = applied {
            warn!(%target, error = %e, "direction change failed; holding motors stopped");
            // Secondary failures are dropped; `e` is reported.
            let _ = self.drive.left.set(MotorDirection::Stopped);
            let _ = self.drive.right.set(MotorDirection::Stopped);
            return Err(e);
        }

        self.state.direction = target;
        Ok(self.state)
    }

    fn set_speed(&mut self, speed: SpeedPercent) -> Result<ActuatorState, RoverError> {
        let duty = speed.duty_cycle();
        let previous = self.drive.left_enable.duty_cycle();
        self.drive.left_enable.set_duty_cycle(duty)?;
        if let Err(e) = self.drive.right_enable.set_duty_cycle(duty) {
            warn!(duty, error = %e, "speed change failed; restoring left enable line");
            let _ = self.drive.left_enable.set_duty_cycle(previous);
            return Err(e);
        }
        self.state.speed = duty;
        Ok(self.state)
    }
}
