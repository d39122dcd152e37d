//! Video capture loop: camera → JPEG → frame broadcaster.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use rover_hal::{Camera, CameraFrame};
use rover_middleware::Broadcaster;
use rover_types::{Frame, RoverError};
use tracing::{error, info, warn};

/// Resizes raw RGB24 camera frames to the stream resolution and encodes
/// them as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    width: u32,
    height: u32,
    quality: u8,
}

impl FrameEncoder {
    /// `quality` is clamped to `1..=100`; zero dimensions are raised to 1.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn encode(&self, raw: CameraFrame) -> Result<Frame, RoverError> {
        let expected = raw.expected_len();
        let actual = raw.data.len();
        let (width, height) = (raw.width, raw.height);
        let image = RgbImage::from_raw(width, height, raw.data).ok_or_else(|| {
            RoverError::Serialization(format!(
                "{width}x{height} RGB24 frame needs {expected} bytes, got {actual}"
            ))
        })?;

        let image = if (width, height) == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(&image)
            .map_err(|e| RoverError::Serialization(format!("JPEG encode failed: {e}")))?;
        Ok(Frame::from(buffer))
    }
}

impl Default for FrameEncoder {
    /// 640×480 at quality 80.
    fn default() -> Self {
        Self::new(640, 480, 80)
    }
}

/// The single producer feeding the frame broadcaster.
pub struct CaptureLoop {
    camera: Box<dyn Camera>,
    encoder: FrameEncoder,
    frames: Broadcaster<Frame>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        encoder: FrameEncoder,
        frames: Broadcaster<Frame>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            camera,
            encoder,
            frames,
            shutdown,
        }
    }

    /// Capture, encode and publish until shutdown or until the camera stops
    /// producing frames.  The broadcaster is closed on exit either way, so
    /// every viewer sees `Closed` and disconnects.
    ///
    /// Returns the number of frames published.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::CaptureFailure`] when the camera fails.  There is
    /// no automatic restart.
    pub fn run(mut self) -> Result<u64, RoverError> {
        let camera = self.camera.id().to_string();
        info!(%camera, "capture loop started");
        let mut published = 0u64;

        while !self.shutdown.load(Ordering::Relaxed) {
            let raw = match self.camera.capture() {
                Ok(raw) => raw,
                Err(e) => {
                    error!(%camera, error = %e, frames = published, "capture failed; closing video feed");
                    self.frames.close();
                    if matches!(e, RoverError::CaptureFailure { .. }) {
                        return Err(e);
                    }
                    return Err(RoverError::CaptureFailure {
                        camera,
                        details: e.to_string(),
                    });
                }
            };

            match self.encoder.encode(raw) {
                Ok(frame) => {
                    self.frames.publish(frame);
                    published += 1;
                }
                Err(e) => warn!(%camera, error = %e, "dropping frame"),
            }
        }

        info!(%camera, frames = published, "capture loop stopped");
        self.frames.close();
        Ok(published)
    }

    /// Run the loop on a dedicated OS thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<u64, RoverError>>, RoverError> {
        thread::Builder::new()
            .name("rover-capture".into())
            .spawn(move || self.run())
            .map_err(RoverError::from)
    }
}
