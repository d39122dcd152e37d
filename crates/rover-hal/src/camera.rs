//! `Camera` trait and the raw frame it yields.
//!
//! Frames are uncompressed RGB24; resizing and JPEG encoding happen in the
//! capture loop, not in the driver.

use rover_types::RoverError;

/// Bytes per RGB24 pixel.
pub const RGB24_BYTES_PER_PIXEL: usize = 3;

/// One uncompressed frame, rows top to bottom, `R G B` per pixel.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Build a frame, checking that `data` covers exactly `width × height`
    /// pixels.
    pub fn rgb24(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RoverError> {
        let frame = Self {
            width,
            height,
            data,
        };
        if frame.data.len() != frame.expected_len() {
            return Err(RoverError::Serialization(format!(
                "{width}x{height} RGB24 frame needs {} bytes, got {}",
                frame.expected_len(),
                frame.data.len()
            )));
        }
        Ok(frame)
    }

    /// Byte length an RGB24 frame of this size must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB24_BYTES_PER_PIXEL
    }
}

/// A video device polled by the capture loop.
pub trait Camera: Send {
    /// Stable identifier, e.g. `"front_camera"`.
    fn id(&self) -> &str;

    /// Block until the device delivers the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::CaptureFailure`] when the device stops producing
    /// frames.  The capture loop treats this as terminal for the video feed.
    fn capture(&mut self) -> Result<CameraFrame, RoverError>;
}
