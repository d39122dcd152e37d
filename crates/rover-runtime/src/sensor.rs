//! Gas sensor poll loop.
//!
//! Every [`POLL_INTERVAL`] the loop asks the [`SensorSource`] for one raw
//! reading.  A cycle without data publishes nothing, so viewers keep seeing
//! the previous sample; only before the first reading does `current()` fall
//! back to the zero sample.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rover_hal::SensorSource;
use rover_middleware::Broadcaster;
use rover_types::{RoverError, SensorSample};
use tracing::{error, info, trace};

/// Full-scale value of the 12-bit ADC.
pub const RAW_MAX: i64 = 4095;

/// Default cadence of the poll loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Map `raw` from `[0, raw_max]` onto `[0, 100]`, truncating toward zero.
///
/// Out-of-range input is not clamped: `raw_max * 2` maps to 200 and negative
/// input maps to a negative percentage.  Clamp at the call site if needed.
pub fn scale_reading(raw: i64, raw_max: i64) -> i64 {
    raw.saturating_mul(100) / raw_max.max(1)
}

/// The single producer feeding the sensor broadcaster.
pub struct SensorLoop {
    source: Box<dyn SensorSource>,
    readings: Broadcaster<SensorSample>,
    interval: Duration,
    raw_max: i64,
    shutdown: Arc<AtomicBool>,
}

impl SensorLoop {
    pub fn new(
        source: Box<dyn SensorSource>,
        readings: Broadcaster<SensorSample>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            readings,
            interval: POLL_INTERVAL,
            raw_max: RAW_MAX,
            shutdown,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Full-scale raw value; values below 1 are treated as 1.
    pub fn with_raw_max(mut self, raw_max: i64) -> Self {
        self.raw_max = raw_max.max(1);
        self
    }

    /// One poll cycle.  Publishes and returns the sample when the source had
    /// data.
    pub fn poll_once(&mut self) -> Result<Option<SensorSample>, RoverError> {
        let Some(raw) = self.source.try_read()? else {
            trace!(sensor = self.source.id(), "no sensor data this cycle");
            return Ok(None);
        };
        let sample = SensorSample::new(scale_reading(raw, self.raw_max));
        trace!(sensor = self.source.id(), raw, gas = sample.gas, "sensor sample");
        self.readings.publish(sample);
        Ok(Some(sample))
    }

    /// Poll until shutdown or until the sensor reports a hardware fault.
    /// The broadcaster is closed on exit.
    ///
    /// Returns the number of samples published.
    pub fn run(mut self) -> Result<u64, RoverError> {
        let sensor = self.source.id().to_string();
        info!(%sensor, interval_ms = self.interval.as_millis() as u64, "sensor loop started");
        let mut published = 0u64;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll_once() {
                Ok(Some(_)) => published += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(%sensor, error = %e, samples = published, "sensor failed; closing event feed");
                    self.readings.close();
                    return Err(e);
                }
            }
            thread::sleep(self.interval);
        }

        info!(%sensor, samples = published, "sensor loop stopped");
        self.readings.close();
        Ok(published)
    }

    /// Run the loop on a dedicated OS thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<u64, RoverError>>, RoverError> {
        thread::Builder::new()
            .name("rover-sensor".into())
            .spawn(move || self.run())
            .map_err(RoverError::from)
    }
}
