//! Synthetic scene and tracker for `stub://` cameras.
//!
//! The scene is a fixed set of landmarks that are scaled about the frame centre by a
//! constant factor between consecutive frames. The synthetic tracker does not look at
//! pixels: it applies the same per-frame scale to whatever points it is asked to track,
//! which is exactly what a perfect optical-flow tracker would report for this scene.

use anyhow::Result;
use image::GrayImage;

use super::{FeatureParams, FeatureTracker, TrackOutcome};
use crate::frame::Point;

/// Geometry of a synthetic scene whose landmarks scale uniformly every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaledScene {
    pub width: u32,
    pub height: u32,
    /// Factor applied to every landmark's offset from the frame centre per frame.
    pub scale_per_frame: f32,
}

impl ScaledScene {
    pub fn new(width: u32, height: u32, scale_per_frame: f32) -> Self {
        Self {
            width,
            height,
            scale_per_frame,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    /// Scale `p` about the frame centre by `factor`.
    pub fn scale_about_center(&self, p: Point, factor: f32) -> Point {
        let c = self.center();
        Point::new(c.x + (p.x - c.x) * factor, c.y + (p.y - c.y) * factor)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width as f32 && p.y < self.height as f32
    }

    /// Up to `count` landmarks on a staggered grid covering the central 80% of the frame.
    ///
    /// Odd rows are shifted by a quarter cell so the layout is not a regular lattice.
    pub fn landmarks(&self, count: usize) -> Vec<Point> {
        if count == 0 {
            return Vec::new();
        }
        let cols = (count as f64).sqrt().ceil() as usize;
        let rows = count.div_ceil(cols);
        let span_w = self.width as f32 * 0.8;
        let span_h = self.height as f32 * 0.8;
        let margin_x = self.width as f32 * 0.1;
        let margin_y = self.height as f32 * 0.1;
        let cell_w = span_w / cols as f32;
        let cell_h = span_h / rows as f32;

        let mut points = Vec::with_capacity(count);
        for row in 0..rows {
            let stagger = if row % 2 == 1 { cell_w * 0.25 } else { 0.0 };
            for col in 0..cols {
                if points.len() == count {
                    return points;
                }
                points.push(Point::new(
                    margin_x + (col as f32 + 0.5) * cell_w + stagger,
                    margin_y + (row as f32 + 0.5) * cell_h,
                ));
            }
        }
        points
    }
}

/// Tracker that reports the scene's exact motion for every point.
pub struct SyntheticTracker {
    scene: ScaledScene,
    params: FeatureParams,
}

impl SyntheticTracker {
    pub fn new(scene: ScaledScene, params: FeatureParams) -> Self {
        Self { scene, params }
    }
}

impl FeatureTracker for SyntheticTracker {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect_features(&mut self, _gray: &GrayImage) -> Result<Vec<Point>> {
        Ok(self.scene.landmarks(self.params.max_corners))
    }

    fn track(
        &mut self,
        _old_gray: &GrayImage,
        _new_gray: &GrayImage,
        old_points: &[Point],
    ) -> Result<TrackOutcome> {
        let new_points: Vec<Point> = old_points
            .iter()
            .map(|&p| self.scene.scale_about_center(p, self.scene.scale_per_frame))
            .collect();
        let status: Vec<bool> = new_points.iter().map(|&p| self.scene.contains(p)).collect();
        if !status.iter().any(|&ok| ok) {
            return Ok(TrackOutcome::Lost);
        }
        Ok(TrackOutcome::Tracked { new_points, status })
    }
}
