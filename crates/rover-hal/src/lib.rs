//! `rover-hal` – hardware collaborators of the gateway.
//!
//! The gateway core only ever talks to the traits below; real GPIO, PWM,
//! camera and serial drivers implement them outside this workspace.  The
//! [`sim`] module provides stand-ins for headless runs and tests.
//!
//! # Modules
//!
//! - [`motor`] – [`Motor`]: one H-bridge channel (forward / backward / stop).
//! - [`pwm`] – [`PwmOutput`]: a motor enable line driven by a duty cycle.
//! - [`camera`] – [`Camera`]: raw RGB24 frame capture.
//! - [`sensor`] – [`SensorSource`]: non-blocking raw sensor reads, plus the
//!   [`SerialSensor`] line reader.
//! - [`sim`] – simulated drivers.

pub mod camera;
pub mod motor;
pub mod pwm;
pub mod sensor;
pub mod sim;

pub use camera::{Camera, CameraFrame};
pub use motor::Motor;
pub use pwm::PwmOutput;
pub use sensor::{SensorSource, SerialSensor};
