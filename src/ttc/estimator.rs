//! Time-to-collision estimation from tracked feature motion.
//!
//! Each cycle:
//! 1. Triangulate the old point set; a point's neighbourhood is every point that shares
//!    a triangle with it.
//! 2. Local scale per point = (Σ old neighbour distances − Σ new neighbour distances)
//!    / Σ new neighbour distances. Points whose new sum is zero are skipped.
//! 3. Scales go into the whole-frame set and into exactly one half. A point is in the
//!    left half when `2 * new.x < frame_width` (x = image column, as the camera sees it).
//! 4. A threshold of `threshold_ratio * max(whole)` is computed once and applied to all
//!    three sets; each region aggregate is the max of the values above it, or 0.
//! 5. Aggregates feed a 3-stream median filter. A completed window is converted to TTC
//!    with Δt = elapsed since the last completed window / window size.
//!
//! Fewer than 4 points or a degenerate triangulation yield no samples for the cycle.
//! An empty filtered whole-frame set means the cycle carries insufficient information.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::median::MedianFilter;
use super::TtcTriple;
use crate::frame::{FeaturePairs, Point};
use crate::vision::Triangulator;

/// Minimum point count before triangulation is attempted.
pub const MIN_TRIANGULATION_POINTS: usize = 4;

/// Point index -> indices of points sharing a triangle with it.
pub type Neighborhoods = BTreeMap<usize, BTreeSet<usize>>;

/// Build Delaunay neighbourhoods from index triples. Duplicate indices inside a
/// triangle are collapsed, and a point never lists itself.
pub fn neighborhoods(triangles: &[[usize; 3]]) -> Neighborhoods {
    let mut map = Neighborhoods::new();
    for triangle in triangles {
        let members: BTreeSet<usize> = triangle.iter().copied().collect();
        for &index in &members {
            let others: Vec<usize> = members.iter().copied().filter(|&o| o != index).collect();
            if !others.is_empty() {
                map.entry(index).or_default().extend(others);
            }
        }
    }
    map
}

/// Local scale of point `k` relative to `neighbors`, or `None` when undefined.
pub fn local_scale(
    old: &[Point],
    new: &[Point],
    k: usize,
    neighbors: &BTreeSet<usize>,
) -> Option<f64> {
    let (old_point, new_point) = (*old.get(k)?, *new.get(k)?);
    let mut sum_old = 0.0;
    let mut sum_new = 0.0;
    for &n in neighbors {
        sum_old += old_point.distance(*old.get(n)?);
        sum_new += new_point.distance(*new.get(n)?);
    }
    if sum_new == 0.0 {
        return None;
    }
    Some((sum_old - sum_new) / sum_new)
}

/// Local scales routed by screen region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionSamples {
    pub whole: Vec<f64>,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl RegionSamples {
    pub fn is_empty(&self) -> bool {
        self.whole.is_empty()
    }

    fn record(&mut self, scale: f64, x: f32, frame_width: u32) {
        self.whole.push(scale);
        if 2.0 * (x as f64) < frame_width as f64 {
            self.left.push(scale);
        } else {
            self.right.push(scale);
        }
    }
}

/// Compute every defined local scale for this cycle's feature pairs.
pub fn collect_local_scales(
    pairs: &FeaturePairs,
    frame_width: u32,
    triangulator: &dyn Triangulator,
) -> RegionSamples {
    let mut samples = RegionSamples::default();
    if pairs.len() < MIN_TRIANGULATION_POINTS {
        return samples;
    }
    let triangles = match triangulator.triangulate(pairs.old()) {
        Ok(triangles) => triangles,
        Err(err) => {
            log::debug!("skipping local scales: {}", err);
            return samples;
        }
    };
    let (old, new) = (pairs.old(), pairs.new_points());
    for (k, neighbors) in neighborhoods(&triangles) {
        if let Some(scale) = local_scale(old, new, k, &neighbors) {
            samples.record(scale, new[k].x, frame_width);
        }
    }
    samples
}

/// Max local scale per region after thresholding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionAggregate {
    pub whole: f64,
    pub left: f64,
    pub right: f64,
}

/// Max of the values strictly above `threshold`, if any pass.
pub fn max_above(values: &[f64], threshold: f64) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|&v| v > threshold)
        .reduce(f64::max)
}

/// Threshold all regions with `threshold_ratio * max(whole)` and take region maxima.
///
/// Returns `None` when no whole-frame sample passes (insufficient information).
pub fn aggregate(samples: &RegionSamples, threshold_ratio: f64) -> Option<RegionAggregate> {
    let max_whole = samples.whole.iter().copied().reduce(f64::max)?;
    let threshold = threshold_ratio * max_whole;
    let whole = max_above(&samples.whole, threshold)?;
    Some(RegionAggregate {
        whole,
        left: max_above(&samples.left, threshold).unwrap_or(0.0),
        right: max_above(&samples.right, threshold).unwrap_or(0.0),
    })
}

/// TTC for one median scale: `delta / scale`, or +∞ when the scale is exactly zero.
pub fn ttc_from_scale(median_scale: f64, delta_secs: f64) -> f64 {
    if median_scale == 0.0 {
        f64::INFINITY
    } else {
        delta_secs / median_scale
    }
}

/// Outcome of one estimator cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EstimateOutcome {
    /// No local scale survived thresholding; the caller should re-initialize.
    InsufficientInformation,
    /// Aggregates were accepted but the median window is not complete yet.
    Pending,
    /// A median window completed.
    Ready(TtcTriple),
}

/// Estimator parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Median window size (samples per completed TTC triple).
    pub window_size: usize,
    /// Fraction of the whole-frame max used as the filtering threshold.
    pub threshold_ratio: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            threshold_ratio: 0.1,
        }
    }
}

/// Stateful TTC estimator: local scales, thresholding and temporal smoothing.
pub struct TtcEstimator {
    triangulator: Box<dyn Triangulator>,
    filter: MedianFilter<3>,
    threshold_ratio: f64,
    last_update: Instant,
}

impl TtcEstimator {
    pub fn new(config: &EstimatorConfig, triangulator: Box<dyn Triangulator>) -> Self {
        Self {
            triangulator,
            filter: MedianFilter::new(config.window_size),
            threshold_ratio: config.threshold_ratio,
            last_update: Instant::now(),
        }
    }

    /// Clear the smoothing window and restart the TTC clock at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.filter.reset();
        self.last_update = now;
    }

    pub fn pending_samples(&self) -> usize {
        self.filter.len()
    }

    /// Process one cycle's feature pairs.
    pub fn estimate(&mut self, pairs: &FeaturePairs, frame_width: u32, now: Instant) -> EstimateOutcome {
        let samples = collect_local_scales(pairs, frame_width, self.triangulator.as_ref());
        let Some(agg) = aggregate(&samples, self.threshold_ratio) else {
            return EstimateOutcome::InsufficientInformation;
        };
        let Some([whole, left, right]) = self.filter.push_and_drain([agg.whole, agg.left, agg.right])
        else {
            return EstimateOutcome::Pending;
        };
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        let delta = elapsed / self.filter.window_size() as f64;
        self.last_update = now;
        EstimateOutcome::Ready(TtcTriple {
            min: ttc_from_scale(whole, delta),
            left: ttc_from_scale(left, delta),
            right: ttc_from_scale(right, delta),
        })
    }
}
