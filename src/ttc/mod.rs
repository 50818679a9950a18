//! Time-to-collision estimation and steering hints.
//!
//! - `estimator`: local scales over Delaunay neighbourhoods, region aggregation, TTC.
//! - `median`: windowed median filter used for temporal smoothing.

pub mod estimator;
pub mod median;

pub use estimator::{EstimateOutcome, EstimatorConfig, TtcEstimator};
pub use median::MedianFilter;

/// TTC values in seconds for the whole frame and each half. `f64::INFINITY` means no
/// measurable approach in that region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TtcTriple {
    /// Limiting TTC across the whole frame.
    pub min: f64,
    pub left: f64,
    pub right: f64,
}

impl TtcTriple {
    pub fn balance_hint(&self) -> BalanceHint {
        BalanceHint {
            left_ttc: self.left,
            right_ttc: self.right,
        }
    }
}

/// Steering direction suggested by the balance strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Steer {
    Left,
    Right,
    Straight,
}

/// Left/right TTC pair used by the balance strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceHint {
    pub left_ttc: f64,
    pub right_ttc: f64,
}

impl BalanceHint {
    /// Turn toward the half with more time before collision, i.e. away from the more
    /// urgent side. Equal TTCs (including two infinities) mean straight ahead.
    pub fn steer(&self) -> Steer {
        if self.left_ttc > self.right_ttc {
            Steer::Left
        } else if self.right_ttc > self.left_ttc {
            Steer::Right
        } else {
            Steer::Straight
        }
    }
}
