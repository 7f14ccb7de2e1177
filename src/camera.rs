// Live webcam frame source (enabled with the `camera` feature)

use crate::error::{BoothError, Result};
use crate::models::Frame;
use crate::sequencer::FrameSource;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tracing::{error, info};

/// A webcam opened through nokhwa
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    /// Opens the camera at `index`, falling back to the next index
    /// (some systems number devices from 1)
    pub fn open(index: u32) -> Result<Self> {
        // 640x480 at 30 FPS keeps frame grabs cheap
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(Resolution::new(640, 480), FrameFormat::YUYV, 30),
        ));

        let mut camera = Self::try_open_camera(index, requested_format)
            .or_else(|first| match fallback_index(index) {
                Some(next) => Self::try_open_camera(next, requested_format),
                None => Err(first),
            })
            .map_err(|e| {
                error!("Failed to initialize camera: {}", e);
                BoothError::CameraInit(format!(
                    "Could not open camera {index}. Make sure one is connected and not in use: {e}"
                ))
            })?;

        camera.open_stream()?;
        info!("Opened camera {}", camera.info().human_name());
        Ok(Self { camera })
    }

    fn try_open_camera(index: u32, requested_format: RequestedFormat) -> Result<Camera> {
        Camera::new(CameraIndex::Index(index), requested_format)
            .map_err(|e| BoothError::CameraInit(e.to_string()))
    }
}

/// Index tried when `index` fails to open; none past the last one
fn fallback_index(index: u32) -> Option<u32> {
    index.checked_add(1)
}

impl FrameSource for CameraSource {
    fn get_frame(&mut self) -> Result<Frame> {
        let frame_data = self.camera.frame().map_err(|e| {
            BoothError::CaptureUnavailable(format!("Failed to capture frame: {e}"))
        })?;

        let buffer = frame_data.decode_image::<RgbFormat>().map_err(|e| {
            BoothError::CaptureUnavailable(format!("Failed to decode frame: {e}"))
        })?;

        let (width, height) = (buffer.width(), buffer.height());
        Ok(Frame::new(buffer.into_raw(), width, height))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            error!("Error stopping camera stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_stops_at_last_index() {
        assert_eq!(fallback_index(0), Some(1));
        assert_eq!(fallback_index(u32::MAX), None);
    }
}
