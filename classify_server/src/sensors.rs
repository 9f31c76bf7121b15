//! Sensors module.
//!
//! Camera hardware sits behind the [`CameraProvider`] / [`CameraDevice`] traits. Dropping a
//! device releases the hardware.
use image::RgbImage;

use crate::error::CameraAccessError;

/// An opened camera delivering RGB frames.
pub trait CameraDevice: Send {
    fn capture(&mut self) -> Result<RgbImage, CameraAccessError>;
}

/// Grants access to camera hardware.
pub trait CameraProvider: Send + Sync {
    fn open(&self, resolution: (u32, u32)) -> Result<Box<dyn CameraDevice>, CameraAccessError>;
}

/// Provider used when no camera backend is compiled in.
pub struct DisabledCamera;

impl CameraProvider for DisabledCamera {
    fn open(&self, _resolution: (u32, u32)) -> Result<Box<dyn CameraDevice>, CameraAccessError> {
        Err(CameraAccessError::Unavailable(
            "built without camera support, enable the `v4l` feature".into(),
        ))
    }
}

/// Camera provider for the given video device.
#[cfg(feature = "v4l")]
pub fn camera_provider(device_name: &str) -> Box<dyn CameraProvider> {
    Box::new(linux::V4lProvider::new(device_name))
}

/// Camera provider for the given video device.
#[cfg(not(feature = "v4l"))]
pub fn camera_provider(device_name: &str) -> Box<dyn CameraProvider> {
    log::warn!("No camera backend compiled in, {device_name} stays unused");
    Box::new(DisabledCamera)
}

#[cfg(feature = "v4l")]
mod linux {
    use std::io;

    use image::{ImageFormat, RgbImage};
    use rscam::{Camera, Config, IntervalInfo, ResolutionInfo};

    use super::{CameraDevice, CameraProvider};
    use crate::error::CameraAccessError;

    const FORMAT: &[u8] = b"MJPG";

    pub struct V4lProvider {
        device_name: String,
    }

    impl V4lProvider {
        pub fn new(device_name: &str) -> Self {
            Self {
                device_name: device_name.to_owned(),
            }
        }
    }

    impl CameraProvider for V4lProvider {
        fn open(
            &self,
            resolution: (u32, u32),
        ) -> Result<Box<dyn CameraDevice>, CameraAccessError> {
            let mut cam = Camera::new(&self.device_name).map_err(io_to_access_error)?;
            log::info!("Using camera {}", &self.device_name);

            let resolution = select_resolution(&cam, resolution)?;
            let interval = get_max_frame_rate(&cam, resolution)?;

            cam.start(&Config {
                interval,
                resolution,
                format: FORMAT,
                ..Default::default()
            })
            .map_err(rscam_to_access_error)?;

            log::info!(
                "Camera streaming at {}x{}, interval {}/{}s",
                resolution.0,
                resolution.1,
                interval.0,
                interval.1
            );
            Ok(Box::new(V4lCamera { cam }))
        }
    }

    /// Started V4L2 camera. Streaming stops when it is dropped.
    struct V4lCamera {
        cam: Camera,
    }

    impl CameraDevice for V4lCamera {
        fn capture(&mut self) -> Result<RgbImage, CameraAccessError> {
            let frame = self
                .cam
                .capture()
                .map_err(|err| CameraAccessError::Capture(err.to_string()))?;
            let image = image::load_from_memory_with_format(&frame[..], ImageFormat::Jpeg)
                .map_err(|err| CameraAccessError::Capture(err.to_string()))?;

            Ok(image.to_rgb8())
        }
    }

    impl Drop for V4lCamera {
        fn drop(&mut self) {
            log::info!("Releasing camera");
        }
    }

    fn io_to_access_error(err: io::Error) -> CameraAccessError {
        match err.kind() {
            io::ErrorKind::PermissionDenied => CameraAccessError::PermissionDenied(err.to_string()),
            _ => CameraAccessError::Unavailable(err.to_string()),
        }
    }

    fn rscam_to_access_error(err: rscam::Error) -> CameraAccessError {
        match err {
            rscam::Error::Io(err) => io_to_access_error(err),
            other => CameraAccessError::Unavailable(other.to_string()),
        }
    }

    /// Use the requested resolution if supported, the largest one otherwise.
    fn select_resolution(
        cam: &Camera,
        requested: (u32, u32),
    ) -> Result<(u32, u32), CameraAccessError> {
        let resolution_info = cam.resolutions(FORMAT).map_err(rscam_to_access_error)?;
        log::debug!("Found resolutions: {:?}", &resolution_info);

        let supported = match &resolution_info {
            ResolutionInfo::Discretes(resolutions) => resolutions.contains(&requested),
            ResolutionInfo::Stepwise { min, max, .. } => {
                (min.0..=max.0).contains(&requested.0) && (min.1..=max.1).contains(&requested.1)
            }
        };
        if supported {
            return Ok(requested);
        }

        let fallback = get_max_resolution(&resolution_info)?;
        log::warn!(
            "Resolution {}x{} not supported, falling back to {}x{}",
            requested.0,
            requested.1,
            fallback.0,
            fallback.1
        );
        Ok(fallback)
    }

    /// Get the maximum supported resolution.
    fn get_max_resolution(info: &ResolutionInfo) -> Result<(u32, u32), CameraAccessError> {
        match info {
            ResolutionInfo::Discretes(resolutions) => resolutions
                .iter()
                // Highest resolution in terms of number of pixels
                .max_by_key(|res| res.0 * res.1)
                .copied(),
            ResolutionInfo::Stepwise { max, .. } => Some(*max),
        }
        .ok_or_else(|| CameraAccessError::Unavailable("no MJPG resolution found".into()))
    }

    /// Get the shortest frame interval for the resolution.
    fn get_max_frame_rate(
        cam: &Camera,
        resolution: (u32, u32),
    ) -> Result<(u32, u32), CameraAccessError> {
        let interval_info = cam
            .intervals(FORMAT, resolution)
            .map_err(rscam_to_access_error)?;
        log::debug!("Found frame intervals: {:?}", &interval_info);
        match interval_info {
            IntervalInfo::Discretes(intervals) => intervals
                .into_iter()
                .filter(|(_, denominator)| *denominator > 0)
                // Intervals are seconds per frame
                .min_by(|a, b| {
                    let a = a.0 as f32 / a.1 as f32;
                    let b = b.0 as f32 / b.1 as f32;
                    a.total_cmp(&b)
                }),
            IntervalInfo::Stepwise { min, .. } => Some(min),
        }
        .ok_or_else(|| CameraAccessError::Unavailable("no frame interval found".into()))
    }
}
