//! OpenCV `VideoCapture` frame source.
//!
//! Numeric URLs open a local device by index; anything else is handed to
//! `VideoCapture::from_file` (files, RTSP/HTTP streams, GStreamer pipelines).

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};

use super::{CameraConfig, FrameSource};

pub(crate) struct OpencvCamera {
    url: String,
    capture: videoio::VideoCapture,
    frame_count: u64,
}

impl OpencvCamera {
    pub(crate) fn open(config: &CameraConfig) -> Result<Self> {
        let mut capture = match config.url.parse::<i32>() {
            Ok(index) => videoio::VideoCapture::new(index, videoio::CAP_ANY),
            Err(_) => videoio::VideoCapture::from_file(&config.url, videoio::CAP_ANY),
        }
        .with_context(|| format!("open camera {}", config.url))?;
        if !capture.is_opened()? {
            return Err(anyhow!("camera {} could not be opened", config.url));
        }
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, config.fps as f64)?;
        log::info!("OpencvCamera: connected to {}", config.url);
        Ok(Self {
            url: config.url.clone(),
            capture,
            frame_count: 0,
        })
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameSource for OpencvCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            return Ok(None);
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
            .context("convert captured frame to RGB")?;
        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes()?.to_vec();
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("captured frame has unexpected layout"))?;
        self.frame_count += 1;
        Ok(Some(image))
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        log::info!(
            "OpencvCamera: released {} after {} frames",
            self.url,
            self.frame_count
        );
        Ok(())
    }
}
