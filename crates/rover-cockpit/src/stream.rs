//! Long-lived streaming responses: MJPEG video and Server-Sent Events.
//!
//! Each streaming connection owns one [`Subscription`].  The writer loop
//! waits on it, writes whatever value is current, and exits on the first
//! failed write or when the broadcaster closes.  Dropping the subscription
//! on exit unregisters the viewer; the producer never waits on a viewer.

use rover_middleware::Subscription;
use rover_types::{Frame, RoverError, SensorSample};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::http::write_stream_head;

/// Multipart boundary used by `/stream.mjpg`.
pub const BOUNDARY: &str = "FRAME";

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A write to the viewer failed.
    Disconnected,
    /// The producer closed the broadcaster.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Parts or events written before the stream ended.
    pub sent: u64,
    pub end: StreamEnd,
}

/// Serve `multipart/x-mixed-replace` JPEG parts until the viewer goes away
/// or the camera feed closes.
pub async fn stream_frames<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frames: Subscription<Frame>,
) -> StreamOutcome {
    let content_type = format!("multipart/x-mixed-replace; boundary={BOUNDARY}");
    pump(writer, &content_type, frames, |frame: Frame| {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        )
        .into_bytes();
        part.extend_from_slice(frame.as_bytes());
        part.extend_from_slice(b"\r\n");
        Ok(part)
    })
    .await
}

/// Serve one `data: {"gas": n}` event per published sample.
pub async fn stream_events<W: AsyncWrite + Unpin>(
    writer: &mut W,
    readings: Subscription<SensorSample>,
) -> StreamOutcome {
    pump(writer, "text/event-stream", readings, |sample: SensorSample| {
        let json = serde_json::to_string(&sample)
            .map_err(|e| RoverError::Serialization(e.to_string()))?;
        Ok(format!("data: {json}\n\n").into_bytes())
    })
    .await
}

async fn pump<W, T, F>(
    writer: &mut W,
    content_type: &str,
    mut subscription: Subscription<T>,
    render: F,
) -> StreamOutcome
where
    W: AsyncWrite + Unpin,
    T: Clone,
    F: Fn(T) -> Result<Vec<u8>, RoverError>,
{
    let mut sent = 0u64;
    if let Err(e) = write_stream_head(writer, content_type).await {
        debug!(error = %e, "viewer gone before stream head");
        return StreamOutcome {
            sent,
            end: StreamEnd::Disconnected,
        };
    }

    loop {
        let value = match subscription.next().await {
            Ok(value) => value,
            Err(e) => {
                debug!(reason = %e, sent, "stream closed by producer");
                let _ = writer.shutdown().await;
                return StreamOutcome {
                    sent,
                    end: StreamEnd::Closed,
                };
            }
        };

        let chunk = match render(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "skipping unrenderable value");
                continue;
            }
        };

        let written = async {
            writer.write_all(&chunk).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(error = %e, sent, "viewer disconnected");
            return StreamOutcome {
                sent,
                end: StreamEnd::Disconnected,
            };
        }
        sent += 1;
    }
}
