//! Constitutive laws: linear elasticity and Mohr-Coulomb plasticity.
//!
//! All stress handling is tension positive and effective. The return
//! mapping works in principal stress space with the trial principal
//! directions held fixed (isotropic elasticity keeps them unchanged by
//! the correction):
//!
//! F = (s1 - s3)/2 + (s1 + s3)/2 * sin(phi) - c * cos(phi)
//!
//! The main-plane correction is applied first; when the corrected
//! principal values violate the ordering s1 >= s2 >= s3 the point lies in
//! a corner region and the return is redone against two surfaces at once
//! (tensile corner s1 = s2, compressive corner s2 = s3; ties go to the
//! compressive corner). An apex return covers the remaining cone tip for
//! frictional materials.
//!
//! Dispatch is hoisted to the element level: a `MaterialLaw` is resolved
//! once per element per phase (after material overrides and strength
//! reduction) and then drives all three integration points.

use nalgebra::{Matrix3, Vector2, Vector3};
use terra_model::material::UNDRAINED_POISSON;
use terra_model::{Drainage, Material, MaterialModel, Stress};

/// Relative tolerance on yield-function consistency after a return
pub const YIELD_TOL: f64 = 1e-9;

/// Outcome of one integration-point update
#[derive(Debug, Clone, Copy)]
pub struct GpUpdate {
    /// Updated effective stress
    pub effective: Stress,
    /// Whether the point ended on the yield surface
    pub yielded: bool,
    /// Norm of the plastic strain increment
    pub plastic_increment: f64,
    /// Excess pore-pressure increment [kPa], pressure positive
    pub excess_pwp_increment: f64,
    /// In-plane tangent for the next stiffness assembly
    pub tangent: Matrix3<f64>,
}

/// A material law resolved for one element: elastic constants, strength
/// parameters (possibly reduced by sum-Msf), and the drainage coupling.
#[derive(Debug, Clone, Copy)]
pub struct MaterialLaw {
    model: MaterialModel,
    drainage: Drainage,
    /// Shear modulus of the tangent entering the stiffness
    shear: f64,
    /// Lame parameter of that tangent
    lame: f64,
    /// Fluid bulk penalty; zero unless undrained A/B
    fluid_bulk: f64,
    cohesion: f64,
    sin_phi: f64,
    cos_phi: f64,
    sin_psi: f64,
    tan_phi: f64,
}

impl MaterialLaw {
    /// Resolve a law from a material definition
    pub fn new(material: &Material) -> Self {
        Self::with_reduction(material, 1.0)
    }

    /// Resolve a law with strength parameters divided by `msf`:
    /// c -> c/msf, tan(phi) -> tan(phi)/msf, tan(psi) -> tan(psi)/msf.
    /// Elastic materials are unaffected.
    pub fn with_reduction(material: &Material, msf: f64) -> Self {
        let e = material.elastic_modulus;
        let nu = material.effective_poisson();
        let shear = e / (2.0 * (1.0 + nu));
        let lame = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));

        let fluid_bulk = if material.drainage.generates_excess_pwp() {
            let k_eff = e / (3.0 * (1.0 - 2.0 * nu));
            let k_undrained =
                2.0 * shear * (1.0 + UNDRAINED_POISSON) / (3.0 * (1.0 - 2.0 * UNDRAINED_POISSON));
            k_undrained - k_eff
        } else {
            0.0
        };

        let phi = (material.friction_rad().tan() / msf).atan();
        let psi = (material.dilation_rad().tan() / msf).atan();
        let cohesion = material.yield_cohesion() / msf;

        Self {
            model: material.model,
            drainage: material.drainage,
            shear,
            lame,
            fluid_bulk,
            cohesion,
            sin_phi: phi.sin(),
            cos_phi: phi.cos(),
            sin_psi: psi.sin(),
            tan_phi: phi.tan(),
        }
    }

    /// Drainage mode of the underlying material
    pub fn drainage(&self) -> Drainage {
        self.drainage
    }

    /// In-plane elastic tangent D mapping (exx, eyy, gxy) to
    /// (sxx, syy, sxy), effective stress.
    pub fn elastic_tangent(&self) -> Matrix3<f64> {
        let a = self.lame + 2.0 * self.shear;
        Matrix3::new(
            a, self.lame, 0.0, //
            self.lame, a, 0.0, //
            0.0, 0.0, self.shear,
        )
    }

    /// Tangent entering the global stiffness: the effective tangent plus
    /// the fluid bulk penalty on the volumetric part for undrained A/B.
    pub fn assembly_tangent(&self, base: Matrix3<f64>) -> Matrix3<f64> {
        if self.fluid_bulk == 0.0 {
            return base;
        }
        let mut d = base;
        for i in 0..2 {
            for j in 0..2 {
                d[(i, j)] += self.fluid_bulk;
            }
        }
        d
    }

    /// Excess pore-pressure increment for a volumetric strain increment
    /// (pressure positive: compression generates positive excess).
    pub fn excess_pwp_increment(&self, deps_vol: f64) -> f64 {
        -self.fluid_bulk * deps_vol
    }

    /// Elastic effective-stress increment for a strain increment
    /// (exx, eyy, gxy); plane strain, so the out-of-plane normal picks up
    /// the Lame coupling.
    pub fn elastic_increment(&self, deps: Vector2<f64>, dgamma: f64) -> Stress {
        let trace = deps[0] + deps[1];
        Stress {
            xx: self.lame * trace + 2.0 * self.shear * deps[0],
            yy: self.lame * trace + 2.0 * self.shear * deps[1],
            zz: self.lame * trace,
            xy: self.shear * dgamma,
        }
    }

    /// Yield function value at an effective stress state
    pub fn yield_function(&self, stress: &Stress) -> f64 {
        if self.model == MaterialModel::LinearElastic {
            return f64::NEG_INFINITY;
        }
        let p = SortedPrincipals::from_stress(stress);
        self.yield_on(p.values[0], p.values[2])
    }

    fn yield_on(&self, s1: f64, s3: f64) -> f64 {
        0.5 * (s1 - s3) + 0.5 * (s1 + s3) * self.sin_phi - self.cohesion * self.cos_phi
    }

    /// Full integration-point update: elastic trial, return mapping,
    /// excess pore pressure, tangent selection.
    pub fn update(&self, previous: &Stress, deps: Vector3<f64>) -> GpUpdate {
        let trial = *previous + self.elastic_increment(Vector2::new(deps[0], deps[1]), deps[2]);
        let excess = self.excess_pwp_increment(deps[0] + deps[1]);

        if self.model == MaterialModel::LinearElastic {
            return GpUpdate {
                effective: trial,
                yielded: false,
                plastic_increment: 0.0,
                excess_pwp_increment: excess,
                tangent: self.assembly_tangent(self.elastic_tangent()),
            };
        }

        let mapped = self.return_map(&trial);
        let tangent = if mapped.yielded {
            self.assembly_tangent(self.elastoplastic_tangent(&trial))
        } else {
            self.assembly_tangent(self.elastic_tangent())
        };
        GpUpdate {
            effective: mapped.stress,
            yielded: mapped.yielded,
            plastic_increment: mapped.plastic_increment,
            excess_pwp_increment: excess,
            tangent,
        }
    }

    /// Project a trial effective stress onto the Mohr-Coulomb surface.
    pub fn return_map(&self, trial: &Stress) -> ReturnMap {
        let principals = SortedPrincipals::from_stress(trial);
        let f = self.yield_on(principals.values[0], principals.values[2]);
        let scale = (self.cohesion * self.cos_phi).abs().max(1.0);
        if f <= YIELD_TOL * scale {
            return ReturnMap {
                stress: *trial,
                yielded: false,
                plastic_increment: 0.0,
            };
        }

        let de = self.principal_stiffness();
        let a_main = self.yield_gradient_13();
        let b_main = self.flow_gradient_13();

        // Main-plane return.
        let denom = (a_main.transpose() * de * b_main)[(0, 0)];
        let dgamma = f / denom;
        let mut corrected = Vector3::from(principals.values) - de * b_main * dgamma;
        let mut plastic = (b_main * dgamma).norm();

        let order_tol = 1e-9 * (1.0 + corrected.amax());
        let extension_violated = corrected[1] > corrected[0] + order_tol;
        let compression_violated = corrected[2] > corrected[1] + order_tol;

        if extension_violated || compression_violated {
            // Ties prefer the compressive corner.
            let corner = if compression_violated {
                Corner::Compressive
            } else {
                Corner::Tensile
            };
            match self.corner_return(&principals, de, corner) {
                Some((values, dp)) => {
                    corrected = values;
                    plastic = dp;
                }
                None => {
                    // Beyond both corners: project to the cone apex.
                    let apex = if self.tan_phi > 1e-12 {
                        self.cohesion / self.tan_phi
                    } else {
                        // phi = 0 (Tresca) has no apex; keep the corner-less
                        // main return.
                        corrected.mean()
                    };
                    let apex_values = Vector3::new(apex, apex, apex);
                    plastic = self
                        .principal_strain_for(&(Vector3::from(principals.values) - apex_values));
                    corrected = apex_values;
                }
            }
        }

        let stress = principals.reassemble(corrected);
        ReturnMap {
            stress,
            yielded: true,
            plastic_increment: plastic,
        }
    }

    /// Elastic stiffness in principal space: diag(lame + 2G) + lame
    /// off-diagonal.
    fn principal_stiffness(&self) -> Matrix3<f64> {
        let a = self.lame + 2.0 * self.shear;
        Matrix3::new(
            a, self.lame, self.lame, //
            self.lame, a, self.lame, //
            self.lame, self.lame, a,
        )
    }

    /// dF/ds for the main plane (s1, s3)
    fn yield_gradient_13(&self) -> Vector3<f64> {
        Vector3::new(
            0.5 * (1.0 + self.sin_phi),
            0.0,
            -0.5 * (1.0 - self.sin_phi),
        )
    }

    /// dG/ds for the main plane (s1, s3)
    fn flow_gradient_13(&self) -> Vector3<f64> {
        Vector3::new(
            0.5 * (1.0 + self.sin_psi),
            0.0,
            -0.5 * (1.0 - self.sin_psi),
        )
    }

    fn corner_return(
        &self,
        principals: &SortedPrincipals,
        de: Matrix3<f64>,
        corner: Corner,
    ) -> Option<(Vector3<f64>, f64)> {
        let trial = Vector3::from(principals.values);
        let (a2, b2, f2) = match corner {
            // Second active plane (s1, s2) at the compressive corner.
            Corner::Compressive => (
                Vector3::new(0.5 * (1.0 + self.sin_phi), -0.5 * (1.0 - self.sin_phi), 0.0),
                Vector3::new(0.5 * (1.0 + self.sin_psi), -0.5 * (1.0 - self.sin_psi), 0.0),
                0.5 * (trial[0] - trial[1])
                    + 0.5 * (trial[0] + trial[1]) * self.sin_phi
                    - self.cohesion * self.cos_phi,
            ),
            // Second active plane (s2, s3) at the tensile corner.
            Corner::Tensile => (
                Vector3::new(0.0, 0.5 * (1.0 + self.sin_phi), -0.5 * (1.0 - self.sin_phi)),
                Vector3::new(0.0, 0.5 * (1.0 + self.sin_psi), -0.5 * (1.0 - self.sin_psi)),
                0.5 * (trial[1] - trial[2])
                    + 0.5 * (trial[1] + trial[2]) * self.sin_phi
                    - self.cohesion * self.cos_phi,
            ),
        };
        let a1 = self.yield_gradient_13();
        let b1 = self.flow_gradient_13();
        let f1 = self.yield_on(trial[0], trial[2]);

        let m11 = (a1.transpose() * de * b1)[(0, 0)];
        let m12 = (a1.transpose() * de * b2)[(0, 0)];
        let m21 = (a2.transpose() * de * b1)[(0, 0)];
        let m22 = (a2.transpose() * de * b2)[(0, 0)];
        let det = m11 * m22 - m12 * m21;
        if det.abs() < 1e-12 * m11.abs().max(1.0) {
            return None;
        }
        let g1 = (f1 * m22 - f2 * m12) / det;
        let g2 = (m11 * f2 - m21 * f1) / det;
        if g1 < 0.0 || g2 < 0.0 {
            // Negative multipliers mean this corner is not the nearest
            // projection; the caller falls back to the apex.
            return None;
        }
        let flow = b1 * g1 + b2 * g2;
        let corrected = trial - de * flow;
        Some((corrected, flow.norm()))
    }

    /// Equivalent plastic strain magnitude for a principal stress
    /// correction (used for the apex return where the flow direction is
    /// the full correction scaled by the elastic compliance).
    fn principal_strain_for(&self, dsigma: &Vector3<f64>) -> f64 {
        let de = self.principal_stiffness();
        match de.try_inverse() {
            Some(inv) => (inv * dsigma).norm(),
            None => 0.0,
        }
    }

    /// Continuum elastoplastic tangent for the main plane, expressed in
    /// the in-plane (sxx, syy, sxy) space through the trial principal
    /// directions. Falls back to the elastic tangent when the in-plane
    /// deviator vanishes or the denominator degenerates.
    fn elastoplastic_tangent(&self, trial: &Stress) -> Matrix3<f64> {
        let d = self.elastic_tangent();
        let principals = SortedPrincipals::from_stress(trial);

        // Gradients of the sorted s1 and s3 with respect to the in-plane
        // components; out-of-plane slots contribute nothing in-plane.
        let grad_major = principals.in_plane_gradient(0);
        let grad_minor = principals.in_plane_gradient(2);
        let (Some(g_major), Some(g_minor)) = (grad_major, grad_minor) else {
            return d;
        };

        let a = g_major * (0.5 * (1.0 + self.sin_phi)) - g_minor * (0.5 * (1.0 - self.sin_phi));
        let b = g_major * (0.5 * (1.0 + self.sin_psi)) - g_minor * (0.5 * (1.0 - self.sin_psi));

        let denom = (a.transpose() * d * b)[(0, 0)];
        if denom <= 1e-9 * self.shear {
            return d;
        }
        let db = d * b;
        let ad = d.transpose() * a;
        d - db * ad.transpose() / denom
    }
}

/// Which corner of the Mohr-Coulomb surface a return lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Corner {
    /// s2 = s3 (triaxial compression)
    Compressive,
    /// s1 = s2 (triaxial extension)
    Tensile,
}

/// Result of a return mapping
#[derive(Debug, Clone, Copy)]
pub struct ReturnMap {
    /// Effective stress on or inside the yield surface
    pub stress: Stress,
    /// Whether plastic correction occurred
    pub yielded: bool,
    /// Norm of the plastic strain increment
    pub plastic_increment: f64,
}

/// Principal decomposition of a plane-strain stress tensor with sorting
/// bookkeeping so corrected values can be reassembled in the original
/// frame.
#[derive(Debug, Clone, Copy)]
struct SortedPrincipals {
    /// Sorted principal values, s1 >= s2 >= s3
    values: [f64; 3],
    /// Sorted slot -> source slot (0: in-plane major, 1: in-plane minor,
    /// 2: out-of-plane)
    source: [usize; 3],
    /// Mean and half-difference geometry of the in-plane decomposition
    cos2t: f64,
    sin2t: f64,
    /// Whether the in-plane deviator was large enough to define an angle
    has_direction: bool,
}

impl SortedPrincipals {
    fn from_stress(stress: &Stress) -> Self {
        let m = 0.5 * (stress.xx + stress.yy);
        let d = 0.5 * (stress.xx - stress.yy);
        let radius = (d * d + stress.xy * stress.xy).sqrt();
        let (cos2t, sin2t, has_direction) = if radius > 1e-12 * (1.0 + m.abs()) {
            (d / radius, stress.xy / radius, true)
        } else {
            (1.0, 0.0, false)
        };

        // Unsorted: [in-plane major, in-plane minor, out-of-plane].
        let unsorted = [m + radius, m - radius, stress.zz];
        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| unsorted[j].partial_cmp(&unsorted[i]).unwrap_or(std::cmp::Ordering::Equal));
        let values = [unsorted[order[0]], unsorted[order[1]], unsorted[order[2]]];

        Self {
            values,
            source: order,
            cos2t,
            sin2t,
            has_direction,
        }
    }

    /// Rebuild the tensor from corrected sorted principal values; the
    /// principal directions of the trial state are reused.
    fn reassemble(&self, corrected: Vector3<f64>) -> Stress {
        let mut unsorted = [0.0; 3];
        for (sorted_slot, &source_slot) in self.source.iter().enumerate() {
            unsorted[source_slot] = corrected[sorted_slot];
        }
        let [sa, sb, szz] = unsorted;
        let m = 0.5 * (sa + sb);
        let r = 0.5 * (sa - sb);
        Stress {
            xx: m + r * self.cos2t,
            yy: m - r * self.cos2t,
            zz: szz,
            xy: r * self.sin2t,
        }
    }

    /// Gradient of the sorted principal value in `sorted_slot` with
    /// respect to (sxx, syy, sxy); `None` when that principal is the
    /// out-of-plane component or the direction is undefined.
    fn in_plane_gradient(&self, sorted_slot: usize) -> Option<Vector3<f64>> {
        if !self.has_direction {
            return None;
        }
        match self.source[sorted_slot] {
            0 => Some(Vector3::new(
                0.5 * (1.0 + self.cos2t),
                0.5 * (1.0 - self.cos2t),
                self.sin2t,
            )),
            1 => Some(Vector3::new(
                0.5 * (1.0 - self.cos2t),
                0.5 * (1.0 + self.cos2t),
                -self.sin2t,
            )),
            _ => None,
        }
    }
}

/// Plane-strain elastic tangent for a drained material, as a free helper
/// for tests and the assembler's initial stiffness.
pub fn plane_strain_tangent(e: f64, nu: f64) -> Matrix3<f64> {
    let f = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
    Matrix3::new(
        f * (1.0 - nu),
        f * nu,
        0.0,
        f * nu,
        f * (1.0 - nu),
        0.0,
        0.0,
        0.0,
        f * (1.0 - 2.0 * nu) / 2.0,
    )
}
