//! `rover-runtime` – the gateway's moving parts.
//!
//! # Modules
//!
//! - [`actuator`] – [`ActuatorController`]: serialises teleop commands over
//!   the drive train.  Every direction change is one locked stop-then-drive
//!   transition, so concurrent requests can never leave the two motors in a
//!   mixed state.
//! - [`capture`] – [`CaptureLoop`]: camera → [`FrameEncoder`] (resize + JPEG)
//!   → frame [`Broadcaster`][rover_middleware::Broadcaster].  A capture
//!   failure closes the video feed only.
//! - [`sensor`] – [`SensorLoop`]: polls the gas sensor on a fixed cadence,
//!   rescales raw ADC counts to a percentage with [`scale_reading`], and
//!   publishes only when data arrived.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod actuator;
pub mod capture;
pub mod sensor;
pub mod telemetry;

pub use actuator::{ActuatorController, DriveTrain};
pub use capture::{CaptureLoop, FrameEncoder};
pub use sensor::{scale_reading, SensorLoop, POLL_INTERVAL, RAW_MAX};
pub use telemetry::{init_tracing, TracerProviderGuard};
