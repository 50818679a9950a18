//! Motion-trail rendering.
//!
//! Trails are kept bounded with a ring of `trail_size` overlay masks. Every segment is
//! drawn into all live masks; once the ring is full the displayed mask is cleared after
//! use and the ring advances, so the visible trail covers at most `trail_size` cycles.

use image::{Rgb, RgbImage};
use rand::Rng;

use crate::frame::{FeaturePairs, Point};

const LINE_THICKNESS: i64 = 2;
const MARKER_RADIUS: i64 = 5;

pub struct TrackRenderer {
    trail_size: usize,
    masks: Vec<RgbImage>,
    mask_count: usize,
    current: usize,
    colors: Vec<Rgb<u8>>,
}

impl TrackRenderer {
    /// `max_tracks` sizes the per-track color table; `trail_size` is clamped to >= 1.
    pub fn new(trail_size: usize, max_tracks: usize) -> Self {
        let mut rng = rand::thread_rng();
        let colors = (0..max_tracks.max(1))
            .map(|_| Rgb([rng.gen(), rng.gen(), rng.gen()]))
            .collect();
        Self {
            trail_size: trail_size.max(1),
            masks: Vec::new(),
            mask_count: 0,
            current: 0,
            colors,
        }
    }

    pub fn trail_size(&self) -> usize {
        self.trail_size
    }

    /// Number of masks holding trail history (saturates at `trail_size`).
    pub fn mask_count(&self) -> usize {
        self.mask_count
    }

    /// Drop all trail history and allocate empty masks for a `width` x `height` frame.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.masks = vec![RgbImage::new(width, height); self.trail_size];
        self.mask_count = 0;
        self.current = 0;
    }

    /// Draw this cycle's tracks and return `frame` with trails and markers composed on it.
    pub fn render(&mut self, frame: &RgbImage, pairs: &FeaturePairs) -> RgbImage {
        if self.masks.first().map(|m| m.dimensions()) != Some(frame.dimensions()) {
            self.reset(frame.width(), frame.height());
        }
        let markers = self.draw_tracks(pairs.old(), pairs.new_points());
        let composed = compose(frame, self.current_mask(), &markers);
        self.advance();
        composed
    }

    /// Draw old->new segments into the live masks. Returns one marker per new position.
    fn draw_tracks(&mut self, old: &[Point], new: &[Point]) -> Vec<(Point, Rgb<u8>)> {
        let live = (self.mask_count + 1).min(self.trail_size);
        let mut markers = Vec::with_capacity(new.len());
        for (i, (o, n)) in old.iter().zip(new).enumerate() {
            let color = self.colors[i % self.colors.len()];
            for mask in self.masks.iter_mut().take(live) {
                draw_line(mask, *n, *o, color);
            }
            markers.push((*n, color));
        }
        markers
    }

    fn current_mask(&self) -> &RgbImage {
        &self.masks[self.current]
    }

    fn advance(&mut self) {
        if self.mask_count >= self.trail_size {
            let (w, h) = self.masks[self.current].dimensions();
            self.masks[self.current] = RgbImage::new(w, h);
            self.current = (self.current + 1) % self.mask_count;
        } else {
            self.mask_count += 1;
        }
    }
}

/// Saturating add of `mask` onto `frame`, then markers on top.
fn compose(frame: &RgbImage, mask: &RgbImage, markers: &[(Point, Rgb<u8>)]) -> RgbImage {
    let mut composed = frame.clone();
    add_saturating(&mut composed, mask);
    for (center, color) in markers {
        draw_disc(&mut composed, *center, MARKER_RADIUS, *color);
    }
    composed
}

fn add_saturating(target: &mut RgbImage, overlay: &RgbImage) {
    for (dst, src) in target.pixels_mut().zip(overlay.pixels()) {
        for c in 0..3 {
            dst.0[c] = dst.0[c].saturating_add(src.0[c]);
        }
    }
}

fn put_block(image: &mut RgbImage, x: i64, y: i64, size: i64, color: Rgb<u8>) {
    for dy in 0..size {
        for dx in 0..size {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && px < image.width() as i64 && py < image.height() as i64 {
                image.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Bresenham line with a square brush.
fn draw_line(image: &mut RgbImage, from: Point, to: Point, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_block(image, x0, y0, LINE_THICKNESS, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_disc(image: &mut RgbImage, center: Point, radius: i64, color: Rgb<u8>) {
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_block(image, cx + dx, cy + dy, 1, color);
            }
        }
    }
}
