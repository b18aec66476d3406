//! Post-processing: nodal recovery of integration-point fields.
//!
//! Gauss-point values are extrapolated to the corner nodes per element
//! (linear extrapolation through the quadrature samples), mid-side nodes
//! take the mean of their edge corners, and contributions from adjacent
//! elements are averaged. Recovery feeds reporting only; it never enters
//! the solve.

use crate::assembly::ElementContext;
use crate::elements::extrapolate_to_corners;
use nalgebra::DVector;
use std::collections::HashMap;
use terra_model::{Mesh, NodeId};

/// Average per-node values recovered from per-element Gauss-point
/// scalars. `gp_values` is indexed like `contexts`.
pub fn recover_nodal_scalar(
    mesh: &Mesh,
    contexts: &[ElementContext],
    gp_values: &[[f64; 3]],
) -> HashMap<NodeId, f64> {
    let mut sums: HashMap<NodeId, (f64, usize)> = HashMap::new();
    for (ctx, values) in contexts.iter().zip(gp_values) {
        let element = &mesh.elements[ctx.element_index];
        let corners = extrapolate_to_corners(*values);
        // Mid-side nodes average their edge corners.
        let mids = [
            0.5 * (corners[0] + corners[1]),
            0.5 * (corners[1] + corners[2]),
            0.5 * (corners[2] + corners[0]),
        ];
        for (slot, &node) in element.nodes.iter().enumerate() {
            let value = if slot < 3 {
                corners[slot]
            } else {
                mids[slot - 3]
            };
            let entry = sums.entry(node).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(node, (sum, count))| (node, sum / count as f64))
        .collect()
}

/// Maximum nodal displacement magnitude of a global displacement vector
pub fn max_displacement(u: &DVector<f64>) -> f64 {
    let mut max = 0.0f64;
    let n = u.len() / 2;
    for i in 0..n {
        let mag = (u[2 * i] * u[2 * i] + u[2 * i + 1] * u[2 * i + 1]).sqrt();
        max = max.max(mag);
    }
    max
}
