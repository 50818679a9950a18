//! Vision capability seam.
//!
//! Feature detection, optical-flow tracking and Delaunay triangulation are consumed
//! through traits, not implemented here:
//! - `FeatureTracker`: corner detection + pyramidal optical flow.
//! - `Triangulator`: Delaunay triangulation over a point set.
//!
//! `TrackerBackend` selects an implementation from configuration:
//! - Synthetic tracker for `stub://` scenes (tests, demos)
//! - OpenCV tracker (feature: vision-opencv)

pub mod delaunay;
#[cfg(feature = "vision-opencv")]
pub(crate) mod opencv_backend;
pub mod synthetic;

use anyhow::Result;
use image::GrayImage;

use crate::frame::Point;

pub use delaunay::DelaunayTriangulator;
pub use synthetic::{ScaledScene, SyntheticTracker};

/// Result of tracking a point set from one frame into the next.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackOutcome {
    /// The tracker found no correspondences at all.
    Lost,
    /// Per-point new positions with a status flag (`true` = tracked).
    Tracked {
        new_points: Vec<Point>,
        status: Vec<bool>,
    },
}

/// Shi-Tomasi corner detection parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureParams {
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: i32,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            max_corners: 100,
            quality_level: 0.3,
            min_distance: 7.0,
            block_size: 7,
        }
    }
}

/// Pyramidal Lucas-Kanade parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowParams {
    /// Search window side length in pixels.
    pub window_size: i32,
    /// Highest pyramid level (0 = no pyramid).
    pub max_level: i32,
    pub max_iterations: i32,
    pub epsilon: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            window_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
        }
    }
}

/// Corner detection and frame-to-frame tracking.
pub trait FeatureTracker: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect trackable features in a grayscale frame (bounded count).
    fn detect_features(&mut self, gray: &GrayImage) -> Result<Vec<Point>>;

    /// Track `old_points` from `old_gray` into `new_gray`.
    ///
    /// Total failure is reported as `TrackOutcome::Lost`, distinct from partial tracking.
    fn track(
        &mut self,
        old_gray: &GrayImage,
        new_gray: &GrayImage,
        old_points: &[Point],
    ) -> Result<TrackOutcome>;
}

/// Delaunay triangulation capability.
pub trait Triangulator: Send + Sync {
    /// Triangulate `points`, returning index triples into `points`.
    ///
    /// Fails on degenerate input (fewer than 3 points, all collinear).
    fn triangulate(&self, points: &[Point]) -> Result<Vec<[usize; 3]>>;
}

/// Tracker selected by camera URL.
pub struct TrackerBackend {
    backend: Backend,
}

enum Backend {
    Synthetic(SyntheticTracker),
    #[cfg(feature = "vision-opencv")]
    OpenCv(opencv_backend::OpencvTracker),
}

impl TrackerBackend {
    /// `stub://` URLs pair with the synthetic tracker; anything else needs OpenCV.
    #[cfg_attr(not(feature = "vision-opencv"), allow(unused_variables))]
    pub fn for_camera_url(
        url: &str,
        scene: &ScaledScene,
        features: FeatureParams,
        flow: FlowParams,
    ) -> Result<Self> {
        if url.starts_with("stub://") {
            Ok(Self {
                backend: Backend::Synthetic(SyntheticTracker::new(scene.clone(), features)),
            })
        } else {
            #[cfg(feature = "vision-opencv")]
            {
                Ok(Self {
                    backend: Backend::OpenCv(opencv_backend::OpencvTracker::new(features, flow)?),
                })
            }
            #[cfg(not(feature = "vision-opencv"))]
            {
                anyhow::bail!("tracking real camera frames requires the vision-opencv feature")
            }
        }
    }
}

impl FeatureTracker for TrackerBackend {
    fn name(&self) -> &'static str {
        match &self.backend {
            Backend::Synthetic(tracker) => tracker.name(),
            #[cfg(feature = "vision-opencv")]
            Backend::OpenCv(tracker) => tracker.name(),
        }
    }

    fn detect_features(&mut self, gray: &GrayImage) -> Result<Vec<Point>> {
        match &mut self.backend {
            Backend::Synthetic(tracker) => tracker.detect_features(gray),
            #[cfg(feature = "vision-opencv")]
            Backend::OpenCv(tracker) => tracker.detect_features(gray),
        }
    }

    fn track(
        &mut self,
        old_gray: &GrayImage,
        new_gray: &GrayImage,
        old_points: &[Point],
    ) -> Result<TrackOutcome> {
        match &mut self.backend {
            Backend::Synthetic(tracker) => tracker.track(old_gray, new_gray, old_points),
            #[cfg(feature = "vision-opencv")]
            Backend::OpenCv(tracker) => tracker.track(old_gray, new_gray, old_points),
        }
    }
}
