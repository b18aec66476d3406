//! Plane-strain stress tensor carried per integration point.
//!
//! Sign convention: tension positive. The out-of-plane normal component
//! is carried independently for plane-strain effective-stress bookkeeping.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Plane-strain stress tensor (xx, yy, zz, xy), tension positive [kPa].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stress {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xy: f64,
}

impl Stress {
    /// Zero stress
    pub const ZERO: Stress = Stress {
        xx: 0.0,
        yy: 0.0,
        zz: 0.0,
        xy: 0.0,
    };

    /// Create from components
    pub fn new(xx: f64, yy: f64, zz: f64, xy: f64) -> Self {
        Self { xx, yy, zz, xy }
    }

    /// Mean in-plane plus out-of-plane normal stress (σxx + σyy + σzz) / 3
    pub fn mean(&self) -> f64 {
        (self.xx + self.yy + self.zz) / 3.0
    }

    /// Apply a pore pressure to the in-plane normal components:
    /// effective = total + p · I2 for pressure-positive p.
    pub fn with_in_plane_pressure(&self, p: f64) -> Stress {
        Stress {
            xx: self.xx + p,
            yy: self.yy + p,
            zz: self.zz,
            xy: self.xy,
        }
    }

    /// Frobenius-style magnitude used for convergence scaling
    pub fn norm(&self) -> f64 {
        (self.xx * self.xx + self.yy * self.yy + self.zz * self.zz + 2.0 * self.xy * self.xy)
            .sqrt()
    }
}

impl Add for Stress {
    type Output = Stress;
    fn add(self, rhs: Stress) -> Stress {
        Stress {
            xx: self.xx + rhs.xx,
            yy: self.yy + rhs.yy,
            zz: self.zz + rhs.zz,
            xy: self.xy + rhs.xy,
        }
    }
}

impl AddAssign for Stress {
    fn add_assign(&mut self, rhs: Stress) {
        *self = *self + rhs;
    }
}

impl Sub for Stress {
    type Output = Stress;
    fn sub(self, rhs: Stress) -> Stress {
        Stress {
            xx: self.xx - rhs.xx,
            yy: self.yy - rhs.yy,
            zz: self.zz - rhs.zz,
            xy: self.xy - rhs.xy,
        }
    }
}

impl Mul<f64> for Stress {
    type Output = Stress;
    fn mul(self, factor: f64) -> Stress {
        Stress {
            xx: self.xx * factor,
            yy: self.yy * factor,
            zz: self.zz * factor,
            xy: self.xy * factor,
        }
    }
}
