//! Simulated drivers for running the gateway without physical hardware.
//!
//! These let the full stack (broadcasters, HTTP server, actuator state
//! machine) run in headless tests and on a development machine.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sim::{SimCamera, SimSensor};
//! use rover_hal::{Camera, SensorSource};
//!
//! let mut camera = SimCamera::new("front", 8, 6);
//! assert_eq!(camera.capture().unwrap().data.len(), 8 * 6 * 3);
//!
//! let mut sensor = SimSensor::scripted("gas", vec![Some(100), None]);
//! assert_eq!(sensor.try_read().unwrap(), Some(100));
//! assert_eq!(sensor.try_read().unwrap(), None);
//! ```

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use rover_types::{MotorDirection, RoverError};
use tracing::debug;

use crate::camera::{Camera, CameraFrame};
use crate::motor::Motor;
use crate::pwm::{PwmOutput, check_duty_cycle};
use crate::sensor::SensorSource;

// ────────────────────────────────────────────────────────────────────────────
// Motor and PWM stubs
// ────────────────────────────────────────────────────────────────────────────

/// A simulated motor channel that records the last applied output.
pub struct SimMotor {
    id: String,
    direction: MotorDirection,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            direction: MotorDirection::Stopped,
        })
    }
}

impl Motor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set(&mut self, direction: MotorDirection) -> Result<(), RoverError> {
        debug!(motor = %self.id, ?direction, "sim motor");
        self.direction = direction;
        Ok(())
    }

    fn direction(&self) -> MotorDirection {
        self.direction
    }
}

/// A simulated PWM enable line.
pub struct SimPwm {
    id: String,
    duty: f32,
}

impl SimPwm {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            duty: 0.0,
        })
    }
}

impl PwmOutput for SimPwm {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_duty_cycle(&mut self, duty: f32) -> Result<(), RoverError> {
        check_duty_cycle(&self.id, duty)?;
        debug!(pwm = %self.id, duty, "sim pwm");
        self.duty = duty;
        Ok(())
    }

    fn duty_cycle(&self) -> f32 {
        self.duty
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera stub
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera producing a moving colour-bar test pattern.
///
/// Frames are paced at the configured rate like a real device read.  With
/// [`with_frame_limit`][Self::with_frame_limit] the camera "disconnects"
/// after `n` frames.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    interval: Option<Duration>,
    remaining: Option<u64>,
    tick: u32,
}

impl SimCamera {
    /// Unpaced camera; `capture` returns immediately.
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            interval: None,
            remaining: None,
            tick: 0,
        }
    }

    /// Pace `capture` to `fps` frames per second.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    /// Fail with [`RoverError::CaptureFailure`] after `frames` captures.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    fn render(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let band = ((x + self.tick) * 8 / self.width.max(1)) % 8;
                let shade = (y * 255 / self.height.max(1)) as u8;
                data.push(if band & 1 != 0 { 255 } else { shade });
                data.push(if band & 2 != 0 { 255 } else { shade });
                data.push(if band & 4 != 0 { 255 } else { shade });
            }
        }
        data
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, RoverError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(RoverError::CaptureFailure {
                    camera: self.id.clone(),
                    details: "simulated device returned no frame".to_string(),
                });
            }
            *remaining -= 1;
        }
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }
        self.tick = self.tick.wrapping_add(1);
        CameraFrame::rgb24(self.width, self.height, self.render())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor stub
// ────────────────────────────────────────────────────────────────────────────

/// A simulated raw sensor.
pub struct SimSensor {
    id: String,
    mode: SimSensorMode,
}

enum SimSensorMode {
    /// Fixed sequence of reads; exhausted scripts report no data.
    Scripted(VecDeque<Option<i64>>),
    /// Triangle wave over `0..=max`.
    Sweep { value: i64, step: i64, max: i64 },
}

impl SimSensor {
    pub fn scripted(id: impl Into<String>, reads: Vec<Option<i64>>) -> Self {
        Self {
            id: id.into(),
            mode: SimSensorMode::Scripted(reads.into()),
        }
    }

    /// Sweep up and down over `0..=max` in increments of `step`.
    pub fn sweep(id: impl Into<String>, max: i64, step: i64) -> Self {
        Self {
            id: id.into(),
            mode: SimSensorMode::Sweep {
                value: 0,
                step: step.max(1),
                max,
            },
        }
    }
}

impl SensorSource for SimSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn try_read(&mut self) -> Result<Option<i64>, RoverError> {
        match &mut self.mode {
            SimSensorMode::Scripted(reads) => Ok(reads.pop_front().flatten()),
            SimSensorMode::Sweep { value, step, max } => {
                let current = *value;
                let next = current + *step;
                if next > *max || next < 0 {
                    *step = -*step;
                }
                *value = (current + *step).clamp(0, *max);
                Ok(Some(current))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_motor_records_direction() {
        let mut motor = SimMotor::new("left_motor");
        assert_eq!(motor.direction(), MotorDirection::Stopped);
        motor.set(MotorDirection::Forward).unwrap();
        assert_eq!(motor.direction(), MotorDirection::Forward);
    }

    #[test]
    fn sim_pwm_rejects_out_of_range_duty() {
        let mut pwm = SimPwm::new("left_enable");
        pwm.set_duty_cycle(0.75).unwrap();
        assert!((pwm.duty_cycle() - 0.75).abs() < f32::EPSILON);
        assert!(pwm.set_duty_cycle(1.5).is_err());
        // Rejected values leave the previous duty cycle in place.
        assert!((pwm.duty_cycle() - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn sim_camera_frames_have_rgb24_layout() {
        let mut cam = SimCamera::new("front", 16, 8);
        let first = cam.capture().unwrap();
        let second = cam.capture().unwrap();
        assert_eq!(first.data.len(), first.expected_len());
        assert_ne!(first.data, second.data, "test pattern must move");
    }

    #[test]
    fn sim_camera_frame_limit_simulates_device_loss() {
        let mut cam = SimCamera::new("front", 4, 4).with_frame_limit(2);
        assert!(cam.capture().is_ok());
        assert!(cam.capture().is_ok());
        assert!(matches!(
            cam.capture(),
            Err(RoverError::CaptureFailure { .. })
        ));
    }

    #[test]
    fn scripted_sensor_replays_then_reports_no_data() {
        let mut sensor = SimSensor::scripted("gas", vec![Some(1), None, Some(3)]);
        assert_eq!(sensor.try_read().unwrap(), Some(1));
        assert_eq!(sensor.try_read().unwrap(), None);
        assert_eq!(sensor.try_read().unwrap(), Some(3));
        assert_eq!(sensor.try_read().unwrap(), None);
    }

    #[test]
    fn sweep_sensor_stays_in_range_and_turns_around() {
        let mut sensor = SimSensor::sweep("gas", 10, 4);
        let reads: Vec<i64> = (0..8).map(|_| sensor.try_read().unwrap().unwrap()).collect();
        assert!(reads.iter().all(|v| (0..=10).contains(v)));
        assert_eq!(&reads[..4], &[0, 4, 8, 4]);
    }
}
