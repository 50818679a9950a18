//! OpenCV-backed feature detection and pyramidal Lucas-Kanade tracking.

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use opencv::core::{Mat, Point2f, Scalar, Size, TermCriteria, Vector, CV_8UC1};
use opencv::prelude::*;
use opencv::{core, imgproc, video};

use super::{FeatureParams, FeatureTracker, FlowParams, TrackOutcome};
use crate::frame::Point;

pub(crate) struct OpencvTracker {
    features: FeatureParams,
    flow: FlowParams,
    criteria: TermCriteria,
}

impl OpencvTracker {
    pub(crate) fn new(features: FeatureParams, flow: FlowParams) -> Result<Self> {
        let criteria = TermCriteria::new(
            core::TermCriteria_COUNT + core::TermCriteria_EPS,
            flow.max_iterations,
            flow.epsilon,
        )
        .context("build lucas-kanade termination criteria")?;
        Ok(Self {
            features,
            flow,
            criteria,
        })
    }
}

impl FeatureTracker for OpencvTracker {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn detect_features(&mut self, gray: &GrayImage) -> Result<Vec<Point>> {
        let image = gray_to_mat(gray)?;
        let mut corners: Vector<Point2f> = Vector::new();
        imgproc::good_features_to_track(
            &image,
            &mut corners,
            self.features.max_corners as i32,
            self.features.quality_level,
            self.features.min_distance,
            &Mat::default(),
            self.features.block_size,
            false,
            0.04,
        )
        .context("goodFeaturesToTrack")?;
        Ok(corners.iter().map(|c| Point::new(c.x, c.y)).collect())
    }

    fn track(
        &mut self,
        old_gray: &GrayImage,
        new_gray: &GrayImage,
        old_points: &[Point],
    ) -> Result<TrackOutcome> {
        if old_points.is_empty() {
            return Ok(TrackOutcome::Lost);
        }
        let prev = gray_to_mat(old_gray)?;
        let next = gray_to_mat(new_gray)?;
        let prev_pts: Vector<Point2f> = old_points.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let mut next_pts: Vector<Point2f> = Vector::new();
        let mut status: Vector<u8> = Vector::new();
        let mut err: Vector<f32> = Vector::new();
        video::calc_optical_flow_pyr_lk(
            &prev,
            &next,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            Size::new(self.flow.window_size, self.flow.window_size),
            self.flow.max_level,
            self.criteria,
            0,
            1e-4,
        )
        .context("calcOpticalFlowPyrLK")?;

        if next_pts.is_empty() || !status.iter().any(|s| s == 1) {
            return Ok(TrackOutcome::Lost);
        }
        Ok(TrackOutcome::Tracked {
            new_points: next_pts.iter().map(|p| Point::new(p.x, p.y)).collect(),
            status: status.iter().map(|s| s == 1).collect(),
        })
    }
}

fn gray_to_mat(gray: &GrayImage) -> Result<Mat> {
    let (width, height) = gray.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )?;
    let bytes = mat.data_bytes_mut()?;
    if bytes.len() != gray.as_raw().len() {
        return Err(anyhow!(
            "grayscale buffer mismatch: mat has {} bytes, image has {}",
            bytes.len(),
            gray.as_raw().len()
        ));
    }
    bytes.copy_from_slice(gray.as_raw());
    Ok(mat)
}
