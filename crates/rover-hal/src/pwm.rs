//! `PwmOutput` trait for motor enable lines.

use rover_types::RoverError;

/// A PWM output whose duty cycle sets motor speed.
pub trait PwmOutput: Send + Sync {
    /// Stable identifier, e.g. `"left_enable"`.
    fn id(&self) -> &str;

    /// Apply `duty` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when `duty` is outside `[0, 1]`
    /// or the driver call fails.
    fn set_duty_cycle(&mut self, duty: f32) -> Result<(), RoverError>;

    /// The most recently applied duty cycle.
    fn duty_cycle(&self) -> f32;
}

/// Reject duty cycles a PWM peripheral cannot represent.
pub fn check_duty_cycle(id: &str, duty: f32) -> Result<(), RoverError> {
    if (0.0..=1.0).contains(&duty) {
        Ok(())
    } else {
        Err(RoverError::hardware(
            id,
            format!("duty cycle {duty} outside [0, 1]"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_duty_cycle_accepts_unit_range() {
        assert!(check_duty_cycle("en", 0.0).is_ok());
        assert!(check_duty_cycle("en", 0.25).is_ok());
        assert!(check_duty_cycle("en", 1.0).is_ok());
    }

    #[test]
    fn check_duty_cycle_rejects_out_of_range() {
        assert!(matches!(
            check_duty_cycle("en", 1.5),
            Err(RoverError::HardwareFault { .. })
        ));
        assert!(check_duty_cycle("en", -0.01).is_err());
        assert!(check_duty_cycle("en", f32::NAN).is_err());
    }
}
