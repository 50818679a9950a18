//! Camera frame sources.
//!
//! This module provides different sources for color frames:
//! - Synthetic scaled scene (`stub://` URLs, testing and demos)
//! - OpenCV `VideoCapture` devices and streams (feature: vision-opencv)
//!
//! Every source yields `RgbImage` frames until it is exhausted or fails. Acquisition
//! failure is fatal to the consuming avoider; retry policy belongs to the supervisor.

#[cfg(feature = "vision-opencv")]
mod opencv_backend;
pub mod synthetic;

use anyhow::Result;
use image::RgbImage;

use crate::vision::ScaledScene;

pub use synthetic::SyntheticCamera;

/// A sequence of raw color frames.
pub trait FrameSource: Send {
    /// Capture the next frame. `Ok(None)` means the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Release the underlying device handle. Called once when the avoider exits.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// `stub://<name>`, a device index (e.g. "0"), or a stream URL / file path.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Per-frame landmark scale for synthetic scenes.
    pub synthetic_scale: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://scaled".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            synthetic_scale: 0.98,
        }
    }
}

impl CameraConfig {
    /// Scene geometry used by synthetic cameras and their paired tracker.
    pub fn scene(&self) -> ScaledScene {
        ScaledScene::new(self.width, self.height, self.synthetic_scale)
    }

    pub fn is_synthetic(&self) -> bool {
        self.url.starts_with("stub://")
    }
}

/// Camera source selected by URL.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "vision-opencv")]
    OpenCv(opencv_backend::OpencvCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.is_synthetic() {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config.scene())),
            })
        } else {
            #[cfg(feature = "vision-opencv")]
            {
                Ok(Self {
                    backend: CameraBackend::OpenCv(opencv_backend::OpencvCamera::open(&config)?),
                })
            }
            #[cfg(not(feature = "vision-opencv"))]
            {
                anyhow::bail!("camera '{}' requires the vision-opencv feature", config.url)
            }
        }
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "vision-opencv")]
            CameraBackend::OpenCv(source) => source.frames_captured(),
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "vision-opencv")]
            CameraBackend::OpenCv(source) => source.next_frame(),
        }
    }

    fn release(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "vision-opencv")]
            CameraBackend::OpenCv(source) => source.release(),
        }
    }
}
