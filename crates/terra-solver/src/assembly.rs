//! Assembly of the global tangent and force vectors.
//!
//! Degree-of-freedom numbering is two per node (ux, uy) in mesh node
//! order. Element contributions are computed in parallel into
//! write-private buffers and scattered serially in element order, so the
//! floating-point reduction order is fixed and repeated runs are
//! bit-identical.
//!
//! Prescribed dofs are enforced by row-and-column elimination during the
//! scatter: constrained rows and columns are skipped and replaced by a
//! unit diagonal. Skew normal constraints contribute a penalty block.

use crate::backend::SparseTripletsF64;
use crate::boundary::{Constraints, SKEW_PENALTY};
use crate::constitutive::MaterialLaw;
use crate::elements::Tri6Kernel;
use crate::error::{Result, SolverError};
use crate::pore_pressure::below_water_table;
use crate::state::ElementGpState;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use terra_model::{Load, Material, Mesh, NodeId, WaterLevel};

/// Node-to-dof numbering for the whole mesh: node i in mesh order owns
/// dofs (2i, 2i + 1).
#[derive(Debug, Clone)]
pub struct DofMap {
    base: HashMap<NodeId, usize>,
    ndof: usize,
}

impl DofMap {
    /// Build the numbering from the mesh node order
    pub fn new(mesh: &Mesh) -> Self {
        let base = mesh
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, 2 * i))
            .collect::<HashMap<_, _>>();
        Self {
            ndof: 2 * mesh.nodes.len(),
            base,
        }
    }

    /// First dof (ux) of a node; uy is the next index
    pub fn base(&self, node: NodeId) -> Option<usize> {
        self.base.get(&node).copied()
    }

    /// Total number of dofs
    pub fn ndof(&self) -> usize {
        self.ndof
    }

    /// Access the raw node-to-dof table
    pub fn table(&self) -> &HashMap<NodeId, usize> {
        &self.base
    }
}

/// Per-element context resolved once per phase: geometry kernel, the
/// governing material (after overrides), the strength-resolved law, and
/// the global dof scatter map.
#[derive(Debug, Clone)]
pub struct ElementContext {
    /// Index into `mesh.elements`
    pub element_index: usize,
    /// Geometry kernel
    pub kernel: Tri6Kernel,
    /// Governing material after phase overrides
    pub material: Material,
    /// Constitutive law (strength reduction applied for safety phases)
    pub law: MaterialLaw,
    /// Global dof indices of the twelve element dofs
    pub dofs: [usize; 12],
}

/// Resolve element contexts for the active set. `resolved` pairs each
/// active element index with its governing material; `msf` is the
/// strength-reduction factor (1 outside safety analyses).
pub fn build_contexts(
    mesh: &Mesh,
    resolved: &[(usize, Material)],
    msf: f64,
    dof_map: &DofMap,
) -> Result<Vec<ElementContext>> {
    let mut contexts = Vec::with_capacity(resolved.len());
    for (element_index, material) in resolved {
        let element = &mesh.elements[*element_index];
        let kernel = Tri6Kernel::from_mesh(mesh, element)?;
        let mut dofs = [0usize; 12];
        for (slot, &node) in element.nodes.iter().enumerate() {
            let base = dof_map.base(node).ok_or_else(|| {
                SolverError::Mesh(format!(
                    "element {} references node {} outside the dof map",
                    element.id, node
                ))
            })?;
            dofs[2 * slot] = base;
            dofs[2 * slot + 1] = base + 1;
        }
        contexts.push(ElementContext {
            element_index: *element_index,
            kernel,
            material: material.clone(),
            law: MaterialLaw::with_reduction(material, msf),
            dofs,
        });
    }
    Ok(contexts)
}

/// Constrained global tangent in CSR form.
///
/// Assembly accumulates COO triplets (duplicates sum on conversion) and
/// converts once per assembly; the backend consumes the deduplicated
/// triplet view.
#[derive(Debug, Clone)]
pub struct SparseTangent {
    /// The tangent matrix
    pub matrix: CsrMatrix<f64>,
}

impl SparseTangent {
    fn from_coo_parts(
        ndof: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let coo = CooMatrix::try_from_triplets(ndof, ndof, rows, cols, values)
            .map_err(|e| SolverError::Mesh(format!("tangent assembly failed: {e:?}")))?;
        Ok(Self {
            matrix: CsrMatrix::from(&coo),
        })
    }

    /// Stored non-zero count
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Export as backend-agnostic triplets
    pub fn to_triplets(&self) -> SparseTripletsF64 {
        let mut rows = Vec::with_capacity(self.nnz());
        let mut cols = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        for (row, col, &value) in self.matrix.triplet_iter() {
            rows.push(row);
            cols.push(col);
            values.push(value);
        }
        SparseTripletsF64 {
            nrows: self.matrix.nrows(),
            ncols: self.matrix.ncols(),
            row_indices: rows,
            col_indices: cols,
            values,
        }
    }
}

/// Assemble the constrained global tangent and the internal force
/// vector.
///
/// `states` holds the trial integration-point state per context, in
/// context order; `delta_u` is the step displacement increment the
/// states were evaluated at. The skew-normal penalty blocks contribute
/// both stiffness and the matching reaction force, so the Newton
/// residual stays consistent.
pub fn assemble_tangent_and_internal(
    contexts: &[ElementContext],
    states: &[ElementGpState],
    delta_u: &DVector<f64>,
    ndof: usize,
    constraints: &Constraints,
) -> Result<(SparseTangent, DVector<f64>)> {
    // Parallel element loop with write-private outputs.
    let contributions: Vec<Result<_>> = contexts
        .par_iter()
        .zip(states.par_iter())
        .map(|(ctx, gp_states)| {
            let d = [gp_states[0].tangent, gp_states[1].tangent, gp_states[2].tangent];
            let sigma = [
                gp_states[0].in_plane_total(),
                gp_states[1].in_plane_total(),
                gp_states[2].in_plane_total(),
            ];
            ctx.kernel.stiffness_and_internal(&d, &sigma)
        })
        .collect();

    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    let mut internal = DVector::zeros(ndof);
    let mut max_diag: f64 = 1.0;

    // Serial scatter in element order keeps the reduction deterministic.
    for (ctx, contribution) in contexts.iter().zip(contributions) {
        let (ke, fint) = contribution?;
        for (i_local, &i_global) in ctx.dofs.iter().enumerate() {
            internal[i_global] += fint[i_local];
            if constraints.eliminated[i_global] {
                continue;
            }
            for (j_local, &j_global) in ctx.dofs.iter().enumerate() {
                if constraints.eliminated[j_global] {
                    continue;
                }
                let value = ke[(i_local, j_local)];
                if value != 0.0 {
                    rows.push(i_global);
                    cols.push(j_global);
                    values.push(value);
                    if i_global == j_global {
                        max_diag = max_diag.max(value.abs());
                    }
                }
            }
        }
    }

    // Unit diagonal on eliminated dofs keeps the system regular; floating
    // nodes receive the same treatment.
    for (dof, &eliminated) in constraints.eliminated.iter().enumerate() {
        if eliminated {
            rows.push(dof);
            cols.push(dof);
            values.push(1.0);
        }
    }

    // Skew normal constraints as penalty blocks n n^T, with the matching
    // reaction on the internal force.
    let penalty = SKEW_PENALTY * max_diag;
    for &(base, normal) in &constraints.skew_normals {
        for (i, ni) in normal.iter().enumerate() {
            for (j, nj) in normal.iter().enumerate() {
                rows.push(base + i);
                cols.push(base + j);
                values.push(penalty * ni * nj);
            }
        }
        let projection = normal[0] * delta_u[base] + normal[1] * delta_u[base + 1];
        internal[base] += penalty * projection * normal[0];
        internal[base + 1] += penalty * projection * normal[1];
    }

    Ok((SparseTangent::from_coo_parts(ndof, rows, cols, values)?, internal))
}

/// Assemble the external force vector of the active configuration: body
/// forces of the active elements plus the active point and line loads.
pub fn assemble_external(
    mesh: &Mesh,
    contexts: &[ElementContext],
    loads: &[&Load],
    water: Option<&WaterLevel>,
    dof_map: &DofMap,
    boundary: &HashSet<(NodeId, NodeId)>,
) -> Result<DVector<f64>> {
    let mut fext = DVector::zeros(dof_map.ndof());

    // Body forces: unit weight per Gauss point with respect to the
    // active water table.
    for ctx in contexts {
        let mut gamma = [0.0; 3];
        for gp in 0..3 {
            let [x, y] = ctx.kernel.gp_position(gp);
            gamma[gp] = ctx.material.unit_weight(below_water_table(water, x, y));
        }
        let fb = ctx.kernel.body_force(gamma)?;
        for (local, &dof) in ctx.dofs.iter().enumerate() {
            fext[dof] += fb[local];
        }
    }

    let active_nodes: HashSet<NodeId> = contexts
        .iter()
        .flat_map(|ctx| mesh.elements[ctx.element_index].nodes)
        .collect();

    for load in loads {
        match load {
            Load::Point {
                id,
                position,
                force,
            } => {
                let node = match mesh.point_load_nodes.get(id) {
                    Some(&assigned) => assigned,
                    None => nearest_node(mesh, &active_nodes, *position).ok_or_else(|| {
                        SolverError::Mesh(format!(
                            "point load {id} has no active node to attach to"
                        ))
                    })?,
                };
                let base = dof_map.base(node).ok_or_else(|| {
                    SolverError::Mesh(format!("point load {id} maps to unknown node {node}"))
                })?;
                fext[base] += force[0];
                fext[base + 1] += force[1];
            }
            Load::Line { p1, p2, force, .. } => {
                apply_line_load(mesh, contexts, boundary, *p1, *p2, *force, &mut fext);
            }
        }
    }

    Ok(fext)
}

/// Nearest active mesh node to a world position, ties broken by node
/// identity for determinism.
fn nearest_node(
    mesh: &Mesh,
    active_nodes: &HashSet<NodeId>,
    position: [f64; 2],
) -> Option<NodeId> {
    mesh.nodes
        .iter()
        .filter(|n| active_nodes.contains(&n.id))
        .map(|n| {
            let d2 = (n.x - position[0]).powi(2) + (n.y - position[1]).powi(2);
            (d2, n.id)
        })
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, id)| id)
}

/// Integrate a line load over every active boundary edge lying on the
/// load segment.
fn apply_line_load(
    mesh: &Mesh,
    contexts: &[ElementContext],
    boundary: &HashSet<(NodeId, NodeId)>,
    p1: [f64; 2],
    p2: [f64; 2],
    force: [f64; 2],
    fext: &mut DVector<f64>,
) {
    let seg_len = ((p2[0] - p1[0]).powi(2) + (p2[1] - p1[1]).powi(2)).sqrt();
    if seg_len < 1e-14 {
        return;
    }
    let tol = 1e-6 * seg_len;

    for ctx in contexts {
        let element = &mesh.elements[ctx.element_index];
        let corners = element.corners();
        for edge in 0..3 {
            let a = corners[edge];
            let b = corners[(edge + 1) % 3];
            let key = if a <= b { (a, b) } else { (b, a) };
            if !boundary.contains(&key) {
                continue;
            }
            let (Some(pa), Some(pb)) = (mesh.node(a), mesh.node(b)) else {
                continue;
            };
            if on_segment([pa.x, pa.y], p1, p2, tol) && on_segment([pb.x, pb.y], p1, p2, tol) {
                let fe = ctx.kernel.edge_load(edge, force);
                for (local, &dof) in ctx.dofs.iter().enumerate() {
                    fext[dof] += fe[local];
                }
            }
        }
    }
}

/// Whether a point lies on a segment within a tolerance
fn on_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2], tol: f64) -> bool {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    if len2 < 1e-28 {
        return false;
    }
    let t = (ap[0] * ab[0] + ap[1] * ab[1]) / len2;
    if !(-1e-9..=1.0 + 1e-9).contains(&t) {
        return false;
    }
    let closest = [a[0] + t * ab[0], a[1] + t * ab[1]];
    let dist2 = (p[0] - closest[0]).powi(2) + (p[1] - closest[1]).powi(2);
    dist2 <= tol * tol
}
