//! Initial-stress generation: K0 procedure and geostatic lookup.
//!
//! The vertical effective stress at a point is obtained by integrating
//! unit weight downward from the ground surface along the vertical ray
//! through the point. The active elements themselves define the soil
//! profile: each element's straight-sided corner triangle is intersected
//! with the ray and contributes gamma times its clipped height, split at
//! the water elevation between saturated and unsaturated weight. Layered
//! profiles are therefore honored without any separate surface model.
//!
//! Horizontal effective stress follows as K0 times the vertical value and
//! is also assigned to the out-of-plane component.

use crate::assembly::ElementContext;
use crate::pore_pressure::steady_pwp;
use crate::state::{ElementGpState, GpState};
use terra_model::{Stress, WaterLevel};

/// Total vertical overburden [kPa] above elevation `y` along the
/// vertical ray through `x`, integrated over the active elements.
pub fn overburden(
    contexts: &[ElementContext],
    water: Option<&WaterLevel>,
    x: f64,
    y: f64,
) -> f64 {
    let mut total = 0.0;
    for ctx in contexts {
        let Some((seg_lo, seg_hi)) = vertical_span(&ctx.kernel.coords, x) else {
            continue;
        };
        let lo = seg_lo.max(y);
        let hi = seg_hi;
        if hi <= lo {
            continue;
        }
        // Split the column segment at the water elevation.
        let yw = water.and_then(|w| w.surface_elevation(x));
        let (dry, wet) = match yw {
            Some(yw) if yw <= lo => (hi - lo, 0.0),
            Some(yw) if yw >= hi => (0.0, hi - lo),
            Some(yw) => (hi - yw, yw - lo),
            None => (hi - lo, 0.0),
        };
        total += dry * ctx.material.unit_weight(false) + wet * ctx.material.unit_weight(true);
    }
    total
}

/// Intersection of a straight-sided corner triangle with the vertical
/// line at `x`: the (low, high) elevation interval, or `None` when the
/// triangle does not properly span `x`.
fn vertical_span(coords: &[[f64; 2]; 6], x: f64) -> Option<(f64, f64)> {
    let corners = [coords[0], coords[1], coords[2]];
    let min_x = corners.iter().map(|c| c[0]).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c[0]).fold(f64::NEG_INFINITY, f64::max);
    let tol = 1e-12 * (1.0 + max_x.abs().max(min_x.abs()));
    // Strict span: a ray grazing a vertical edge belongs to neither
    // neighbor, and integration points never sit there.
    if x <= min_x + tol || x >= max_x - tol {
        return None;
    }

    let mut ys: Vec<f64> = Vec::with_capacity(3);
    for i in 0..3 {
        let p = corners[i];
        let q = corners[(i + 1) % 3];
        if (p[0] - x) * (q[0] - x) <= 0.0 && (p[0] - q[0]).abs() > tol {
            let t = (x - p[0]) / (q[0] - p[0]);
            if (0.0..=1.0).contains(&t) {
                ys.push(p[1] + t * (q[1] - p[1]));
            }
        }
    }
    if ys.len() < 2 {
        return None;
    }
    let lo = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((lo, hi))
}

/// Geostatic effective stress at a point: vertical from the overburden
/// integral, horizontal and out-of-plane from K0.
pub fn geostatic_stress(
    contexts: &[ElementContext],
    water: Option<&WaterLevel>,
    x: f64,
    y: f64,
    k0: f64,
) -> Stress {
    let p = steady_pwp(water, x, y);
    let sigma_v_total = -overburden(contexts, water, x, y);
    let sigma_v_eff = sigma_v_total + p;
    let sigma_h_eff = k0 * sigma_v_eff;
    Stress {
        xx: sigma_h_eff,
        yy: sigma_v_eff,
        zz: sigma_h_eff,
        xy: 0.0,
    }
}

/// Initialize the integration-point state of every active element by the
/// K0 procedure: effective stresses from the geostatic field, steady pore
/// pressure from the active water table, zero excess pressure and plastic
/// strain. The yield flag records points whose K0 field violates the
/// (possibly overridden) material's surface; no return mapping is done.
pub fn k0_initialize(
    contexts: &[ElementContext],
    water: Option<&WaterLevel>,
) -> Vec<ElementGpState> {
    contexts
        .iter()
        .map(|ctx| {
            let k0 = ctx.material.k0_coefficient();
            let mut gps = [GpState::default(); 3];
            for (gp, state) in gps.iter_mut().enumerate() {
                let [x, y] = ctx.kernel.gp_position(gp);
                let effective = geostatic_stress(contexts, water, x, y, k0);
                let yielded = ctx.law.yield_function(&effective) > 0.0;
                *state = GpState {
                    effective,
                    steady_pwp: steady_pwp(water, x, y),
                    excess_pwp: 0.0,
                    plastic_strain: 0.0,
                    yielded,
                    tangent: ctx.law.assembly_tangent(ctx.law.elastic_tangent()),
                };
            }
            gps
        })
        .collect()
}
