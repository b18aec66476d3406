//! Water levels: piecewise-linear phreatic surfaces.

use crate::ids::WaterLevelId;
use serde::{Deserialize, Serialize};

/// A phreatic surface defined by an ordered polyline of (x, y) points.
///
/// Outside its x-span the surface extends horizontally from the nearest
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterLevel {
    /// Water level identity
    pub id: WaterLevelId,
    /// Polyline vertices, ordered by increasing x
    pub points: Vec<[f64; 2]>,
}

impl WaterLevel {
    /// Create a water level from polyline vertices; the vertices are
    /// sorted by x so callers may pass them in drawing order.
    pub fn new(id: WaterLevelId, mut points: Vec<[f64; 2]>) -> Self {
        points.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(std::cmp::Ordering::Equal));
        Self { id, points }
    }

    /// A horizontal water table at the given elevation
    pub fn horizontal(id: WaterLevelId, y: f64) -> Self {
        Self {
            id,
            points: vec![[0.0, y]],
        }
    }

    /// Water surface elevation at the given x: linear interpolation
    /// between bracketing vertices, horizontal extension outside the span.
    /// Returns `None` for an empty polyline.
    pub fn surface_elevation(&self, x: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if x <= first[0] {
            return Some(first[1]);
        }
        if x >= last[0] {
            return Some(last[1]);
        }
        for pair in self.points.windows(2) {
            let [x1, y1] = pair[0];
            let [x2, y2] = pair[1];
            if x >= x1 && x <= x2 {
                if (x2 - x1).abs() < 1e-12 {
                    return Some(y1.min(y2));
                }
                let t = (x - x1) / (x2 - x1);
                return Some(y1 + t * (y2 - y1));
            }
        }
        Some(last[1])
    }

    /// Whether a point lies below the phreatic surface
    pub fn is_below(&self, x: f64, y: f64) -> bool {
        match self.surface_elevation(x) {
            Some(yw) => y < yw,
            None => false,
        }
    }
}
