//! Working state carried per integration point between steps and phases.

use nalgebra::{Matrix3, Vector3};
use terra_model::Stress;

/// Integration-point state: effective stress, pore pressures, plastic
/// bookkeeping, and the constitutive tangent of the last update.
#[derive(Debug, Clone, Copy)]
pub struct GpState {
    /// Effective stress, tension positive [kPa]
    pub effective: Stress,
    /// Steady pore pressure [kPa], pressure positive
    pub steady_pwp: f64,
    /// Accumulated excess pore pressure [kPa], pressure positive
    pub excess_pwp: f64,
    /// Accumulated plastic strain
    pub plastic_strain: f64,
    /// Whether the point sits on the yield surface
    pub yielded: bool,
    /// In-plane tangent from the last constitutive update
    pub tangent: Matrix3<f64>,
}

impl Default for GpState {
    fn default() -> Self {
        Self {
            effective: Stress::ZERO,
            steady_pwp: 0.0,
            excess_pwp: 0.0,
            plastic_strain: 0.0,
            yielded: false,
            tangent: Matrix3::identity(),
        }
    }
}

impl GpState {
    /// Total pore pressure = steady + excess
    pub fn total_pwp(&self) -> f64 {
        self.steady_pwp + self.excess_pwp
    }

    /// Total stress: effective minus the pore pressure on the in-plane
    /// normal components
    pub fn total_stress(&self) -> Stress {
        self.effective.with_in_plane_pressure(-self.total_pwp())
    }

    /// In-plane total stress (sxx, syy, sxy) entering the internal force
    pub fn in_plane_total(&self) -> Vector3<f64> {
        let total = self.total_stress();
        Vector3::new(total.xx, total.yy, total.xy)
    }
}

/// Per-element state: one entry per Gauss point
pub type ElementGpState = [GpState; 3];
