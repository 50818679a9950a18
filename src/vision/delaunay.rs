//! Delaunay triangulation backed by the `delaunator` crate.

use anyhow::{bail, Result};

use super::Triangulator;
use crate::frame::Point;

#[derive(Clone, Copy, Debug, Default)]
pub struct DelaunayTriangulator;

impl DelaunayTriangulator {
    pub fn new() -> Self {
        Self
    }
}

impl Triangulator for DelaunayTriangulator {
    fn triangulate(&self, points: &[Point]) -> Result<Vec<[usize; 3]>> {
        if points.len() < 3 {
            bail!(
                "delaunay triangulation needs at least 3 points, got {}",
                points.len()
            );
        }
        let input: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();
        let triangulation = delaunator::triangulate(&input);
        if triangulation.triangles.is_empty() {
            bail!(
                "delaunay triangulation is degenerate ({} collinear or coincident points)",
                points.len()
            );
        }
        Ok(triangulation
            .triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect())
    }
}
