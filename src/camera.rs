use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use anyhow::{anyhow, Context, Result};
use colored::*;

use crate::error::OverlayError;
use crate::types::FrameSize;

/// Anything that yields RGB frames of a fixed, known size.
pub trait FrameSource {
    fn frame_size(&self) -> FrameSize;
    fn capture(&mut self) -> Result<RgbImage>;
}

pub struct CameraSource {
    camera: Camera,
    size: FrameSize,
}

impl CameraSource {
    /// Opens the camera at `index` and starts streaming.
    ///
    /// Any failure to reach the device is reported as
    /// [`OverlayError::CameraAccess`].
    pub fn open(index: u32) -> Result<Self, OverlayError> {
        let cam_index = CameraIndex::Index(index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(cam_index, requested)
            .map_err(|e| OverlayError::CameraAccess(format!("camera {}: {}", index, e)))?;

        camera
            .open_stream()
            .map_err(|e| OverlayError::CameraAccess(format!("camera {} stream: {}", index, e)))?;

        let resolution = camera.resolution();
        let size = FrameSize::new(resolution.width(), resolution.height())?;

        println!("{}", format!("Opened camera: {}", camera.info().human_name()).green());
        println!("Format: {}", camera.camera_format());

        Ok(Self { camera, size })
    }

    pub fn name(&self) -> String {
        self.camera.info().human_name()
    }
}

impl FrameSource for CameraSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn capture(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame().map_err(|e| anyhow!(e)).context("Failed to get frame")?;
        let decoded = frame.decode_image::<RgbFormat>().map_err(|e| anyhow!(e)).context("Failed to decode frame")?;
        // nokhwa may pin a different `image` release, so hand over raw bytes.
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("Decoded frame has the wrong length for {}x{}", width, height))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Runs `open`; on failure logs it, raises one alert (when enabled) and
/// hands the error back so startup stops before any loop exists.
pub fn open_or_alert<C, O, A>(open: O, alert_enabled: bool, alert: A) -> Result<C, OverlayError>
where
    O: FnOnce() -> Result<C, OverlayError>,
    A: FnOnce(&str, &str),
{
    open().map_err(|e| {
        log::error!("Error accessing webcam: {}", e);
        if alert_enabled {
            alert(
                "Webcam not found",
                "Webcam not found. Please check your device and system settings.",
            );
        }
        e
    })
}

pub fn list_cameras() -> Result<()> {
    let cameras = nokhwa::query(ApiBackend::Auto)?;
    println!("Available Cameras:");
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {:?}", cam.index(), cam.human_name(), cam.misc());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_camera_failure_alerts_once() {
        let alerts = Cell::new(0);
        let result: Result<u32, OverlayError> = open_or_alert(
            || Err(OverlayError::CameraAccess("camera 0: no device".to_string())),
            true,
            |title, _| {
                assert_eq!(title, "Webcam not found");
                alerts.set(alerts.get() + 1);
            },
        );
        assert!(matches!(result, Err(OverlayError::CameraAccess(_))));
        assert_eq!(alerts.get(), 1);
    }

    #[test]
    fn test_camera_failure_alert_can_be_disabled() {
        let alerts = Cell::new(0);
        let result: Result<u32, OverlayError> = open_or_alert(
            || Err(OverlayError::CameraAccess("denied".to_string())),
            false,
            |_, _| alerts.set(alerts.get() + 1),
        );
        assert!(result.is_err());
        assert_eq!(alerts.get(), 0);
    }

    #[test]
    fn test_camera_success_does_not_alert() {
        let alerts = Cell::new(0);
        let result = open_or_alert(|| Ok(7u32), true, |_, _| alerts.set(alerts.get() + 1));
        assert_eq!(result.unwrap(), 7);
        assert_eq!(alerts.get(), 0);
    }
}
