//! `SensorSource` trait and the serial-line gas sensor.
//!
//! The sensor microcontroller prints one ASCII decimal ADC reading per line
//! (`"2048\n"`).  A read is only attempted when bytes are already waiting, so
//! a poll never stalls the sensor loop for longer than the port timeout.

use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

use rover_types::RoverError;
use serialport::SerialPort;
use tracing::{debug, info, warn};

/// A sensor that can be polled without blocking.
pub trait SensorSource: Send {
    /// Stable identifier, e.g. `"gas_adc"`.
    fn id(&self) -> &str;

    /// Return the newest raw reading, or `None` when no data is available
    /// this cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when the underlying device fails.
    fn try_read(&mut self) -> Result<Option<i64>, RoverError>;
}

/// Parse one sensor line.  Surrounding whitespace and `\r\n` are ignored.
pub fn parse_raw_line(line: &str) -> Option<i64> {
    line.trim().parse::<i64>().ok()
}

/// Longest partial line kept between polls.  Anything longer is noise.
pub const MAX_LINE_BYTES: usize = 64;

/// Reassembles newline-terminated readings across polls.
///
/// A poll drains every complete line that is already waiting and keeps only
/// the newest reading, so a sensor printing faster than the poll cadence
/// never builds a backlog.  A line cut off by a read timeout stays buffered
/// and is completed on a later poll.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of an unfinished line carried over to the next poll.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Read from `reader` while `waiting` reports buffered input and return
    /// the newest well-formed reading, or `None` if no line completed.
    ///
    /// Malformed lines are logged and skipped.  End of input, timeouts and
    /// `WouldBlock` end the drain without an error.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] for any other I/O error.
    pub fn drain<R, F>(
        &mut self,
        id: &str,
        reader: &mut R,
        mut waiting: F,
    ) -> Result<Option<i64>, RoverError>
    where
        R: BufRead,
        F: FnMut(&R) -> Result<usize, RoverError>,
    {
        let mut newest = None;
        while waiting(reader)? > 0 {
            // On error `read_until` leaves the bytes it did read in `partial`.
            match reader.read_until(b'\n', &mut self.partial) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => break,
                Err(e) => return Err(RoverError::hardware(id, e)),
            }

            if self.partial.last() != Some(&b'\n') {
                continue;
            }

            let line = std::mem::take(&mut self.partial);
            match std::str::from_utf8(&line).ok().and_then(parse_raw_line) {
                Some(raw) => newest = Some(raw),
                None => warn!(
                    sensor = id,
                    line = %String::from_utf8_lossy(&line).trim(),
                    "discarding malformed sensor line"
                ),
            }
        }
        if self.partial.len() > MAX_LINE_BYTES {
            warn!(sensor = id, bytes = self.partial.len(), "discarding overlong sensor line");
            self.partial.clear();
        }
        Ok(newest)
    }
}

/// Gas sensor attached over a UART.
pub struct SerialSensor {
    id: String,
    reader: BufReader<Box<dyn SerialPort>>,
    lines: LineBuffer,
}

impl SerialSensor {
    /// Open `path` at `baud_rate`, 8N1, with a one second read timeout.
    pub fn open(id: impl Into<String>, path: &str, baud_rate: u32) -> Result<Self, RoverError> {
        let id = id.into();
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|e| RoverError::hardware(&id, format!("cannot open {path}: {e}")))?;

        info!(sensor = %id, path, baud_rate, "opened serial sensor");

        Ok(Self {
            id,
            reader: BufReader::new(port),
            lines: LineBuffer::new(),
        })
    }
}

/// Bytes readable without blocking: our buffer plus the driver's queue.
fn bytes_waiting(id: &str, reader: &BufReader<Box<dyn SerialPort>>) -> Result<usize, RoverError> {
    let pending = reader
        .get_ref()
        .bytes_to_read()
        .map_err(|e| RoverError::hardware(id, e))?;
    Ok(reader.buffer().len() + pending as usize)
}

impl SensorSource for SerialSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn try_read(&mut self) -> Result<Option<i64>, RoverError> {
        let id = self.id.as_str();
        let raw = self
            .lines
            .drain(id, &mut self.reader, |reader| bytes_waiting(id, reader))?;
        debug!(sensor = id, ?raw, carried = self.lines.pending(), "serial sensor read");
        Ok(raw)
    }
}
