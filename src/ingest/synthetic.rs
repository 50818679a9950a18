//! Synthetic camera for `stub://` URLs.
//!
//! Renders the landmarks of a `ScaledScene` as bright dots on a dark background.
//! The landmark layout restarts every `SCENE_PERIOD` frames so long demo runs keep
//! something visible on screen.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::FrameSource;
use crate::vision::ScaledScene;

const SCENE_PERIOD: u64 = 60;
const LANDMARK_COUNT: usize = 100;
const DOT_RADIUS: i64 = 2;
const BACKGROUND: Rgb<u8> = Rgb([24, 24, 32]);
const DOT: Rgb<u8> = Rgb([240, 240, 240]);

pub struct SyntheticCamera {
    scene: ScaledScene,
    frame_count: u64,
    frame_limit: Option<u64>,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(scene: ScaledScene) -> Self {
        Self {
            scene,
            frame_count: 0,
            frame_limit: None,
            released: false,
        }
    }

    /// Stop yielding frames after `limit` captures.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn render(&self) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.scene.width, self.scene.height, BACKGROUND);
        let phase = (self.frame_count % SCENE_PERIOD) as i32;
        let factor = self.scene.scale_per_frame.powi(phase);
        for landmark in self.scene.landmarks(LANDMARK_COUNT) {
            let p = self.scene.scale_about_center(landmark, factor);
            let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
            for dy in -DOT_RADIUS..=DOT_RADIUS {
                for dx in -DOT_RADIUS..=DOT_RADIUS {
                    let (x, y) = (cx + dx, cy + dy);
                    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
                        image.put_pixel(x as u32, y as u32, DOT);
                    }
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            anyhow::bail!("synthetic camera used after release");
        }
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(image))
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            log::info!(
                "SyntheticCamera: released after {} frames",
                self.frame_count
            );
        }
        self.released = true;
        Ok(())
    }
}
