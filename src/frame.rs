//! Per-cycle frame and feature point types.
//!
//! - `Frame`: the color image captured for one cycle plus its grayscale derivative.
//! - `Point`: a sub-pixel image coordinate (x = column, y = row).
//! - `FeaturePairs`: old/new positions of the features that survived tracking.
//!
//! A `Frame` is owned by the orchestrator for the duration of a cycle. Worker tasks
//! only ever see shared borrows of it.

use image::{GrayImage, RgbImage};

/// Sub-pixel image coordinate. `x` grows to the right (columns), `y` grows down (rows).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`, computed in f64.
    pub fn distance(self, other: Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Captured color frame plus its grayscale conversion.
pub struct Frame {
    color: RgbImage,
    gray: GrayImage,
}

impl Frame {
    /// Wrap a captured color image. The grayscale derivative is computed immediately.
    pub fn new(color: RgbImage) -> Self {
        let gray = image::imageops::grayscale(&color);
        Self { color, gray }
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Split into the color image and the grayscale image.
    pub fn into_parts(self) -> (RgbImage, GrayImage) {
        (self.color, self.gray)
    }
}

/// Old/new positions of successfully tracked features, index-aligned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeaturePairs {
    old: Vec<Point>,
    new: Vec<Point>,
}

impl FeaturePairs {
    /// Build pairs directly. Extra points on the longer side are dropped.
    pub fn new(mut old: Vec<Point>, mut new: Vec<Point>) -> Self {
        let len = old.len().min(new.len());
        old.truncate(len);
        new.truncate(len);
        Self { old, new }
    }

    /// Keep only the pairs whose tracking status is good.
    pub fn from_tracking(old: &[Point], new: &[Point], status: &[bool]) -> Self {
        let (old, new): (Vec<Point>, Vec<Point>) = old
            .iter()
            .zip(new)
            .zip(status)
            .filter(|(_, ok)| **ok)
            .map(|((o, n), _)| (*o, *n))
            .unzip();
        Self { old, new }
    }

    pub fn old(&self) -> &[Point] {
        &self.old
    }

    pub fn new_points(&self) -> &[Point] {
        &self.new
    }

    pub fn len(&self) -> usize {
        self.old.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old.is_empty()
    }

    /// Consume the pairs, keeping the new positions as the next reference points.
    pub fn into_new_points(self) -> Vec<Point> {
        self.new
    }
}
