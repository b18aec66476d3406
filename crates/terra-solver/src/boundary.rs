//! Essential boundary conditions for the active mesh region.
//!
//! Nodes are classified full-fixed, normal-fixed, or free, either from an
//! explicit map supplied with the mesh or by the default policy on the
//! bounding box of the active region: bottom edge full-fixed, left and
//! right edges normal-fixed, top edge free.
//!
//! Axis-aligned prescribed dofs are enforced by row-and-column
//! elimination; skew normal directions (averaged at convex corners) are
//! enforced with a penalty block on the node's diagonal.

use crate::error::{Result, SolverError};
use std::collections::{HashMap, HashSet};
use terra_model::{BoundaryClass, Mesh, NodeId};

/// Penalty factor for skew normal constraints, scaled by the largest
/// diagonal stiffness at assembly time.
pub const SKEW_PENALTY: f64 = 1e8;

/// Geometric tolerance for classifying nodes on the bounding box
const EDGE_TOL_REL: f64 = 1e-9;

/// Resolved constraint set for one phase
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Per-dof elimination flags (row-and-column elimination)
    pub eliminated: Vec<bool>,
    /// Skew normal constraints: (node dof base, outward unit normal)
    pub skew_normals: Vec<(usize, [f64; 2])>,
    /// Nodes connected to no active element; their dofs are eliminated
    /// and reported upward
    pub floating_nodes: Vec<NodeId>,
}

impl Constraints {
    /// Number of eliminated dofs
    pub fn num_eliminated(&self) -> usize {
        self.eliminated.iter().filter(|&&e| e).count()
    }

    /// Zero the eliminated entries of a residual vector in place
    pub fn apply_to_residual(&self, residual: &mut nalgebra::DVector<f64>) {
        for (dof, &eliminated) in self.eliminated.iter().enumerate() {
            if eliminated {
                residual[dof] = 0.0;
            }
        }
    }
}

/// Corner edges of the active region that belong to exactly one active
/// element, keyed by the sorted corner pair.
pub fn boundary_edges(mesh: &Mesh, active: &[usize]) -> HashSet<(NodeId, NodeId)> {
    let mut counts: HashMap<(NodeId, NodeId), usize> = HashMap::new();
    for &index in active {
        let element = &mesh.elements[index];
        let [n1, n2, n3] = element.corners();
        for (a, b) in [(n1, n2), (n2, n3), (n3, n1)] {
            let key = if a <= b { (a, b) } else { (b, a) };
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, count)| count == 1)
        .map(|(edge, _)| edge)
        .collect()
}

/// Outward unit normals of the active-region boundary, averaged per node
/// over the adjacent boundary segments.
fn node_normals(mesh: &Mesh, active: &[usize]) -> HashMap<NodeId, [f64; 2]> {
    let boundary = boundary_edges(mesh, active);
    let mut sums: HashMap<NodeId, [f64; 2]> = HashMap::new();

    for &index in active {
        let element = &mesh.elements[index];
        let corners = element.corners();
        let mids = [element.nodes[3], element.nodes[4], element.nodes[5]];
        for e in 0..3 {
            let a = corners[e];
            let b = corners[(e + 1) % 3];
            let key = if a <= b { (a, b) } else { (b, a) };
            if !boundary.contains(&key) {
                continue;
            }
            let (Some(pa), Some(pb)) = (mesh.node(a), mesh.node(b)) else {
                continue;
            };
            let dx = pb.x - pa.x;
            let dy = pb.y - pa.y;
            let len = (dx * dx + dy * dy).sqrt();
            if len < 1e-14 {
                continue;
            }
            // Counter-clockwise traversal keeps the interior on the left;
            // the outward normal points right of the edge direction.
            let normal = [dy / len, -dx / len];
            for node in [a, b, mids[e]] {
                let entry = sums.entry(node).or_insert([0.0, 0.0]);
                entry[0] += normal[0];
                entry[1] += normal[1];
            }
        }
    }

    sums.into_iter()
        .filter_map(|(node, [nx, ny])| {
            let len = (nx * nx + ny * ny).sqrt();
            if len < 1e-12 {
                None
            } else {
                Some((node, [nx / len, ny / len]))
            }
        })
        .collect()
}

/// Whether a node sits on the left or right wall of the active bounding box
fn on_side_wall(mesh: &Mesh, node_id: NodeId, bbox: Option<[f64; 4]>) -> bool {
    let (Some(node), Some([min_x, min_y, max_x, max_y])) = (mesh.node(node_id), bbox) else {
        return false;
    };
    let tol = EDGE_TOL_REL.max(1e-12) * (max_x - min_x).max(max_y - min_y).max(1.0);
    (node.x - min_x).abs() <= tol || (node.x - max_x).abs() <= tol
}

/// Classify every node of the active region.
///
/// Explicit classifications from the mesh win; the remaining boundary
/// nodes follow the bounding-box policy.
pub fn classify_nodes(
    mesh: &Mesh,
    active: &[usize],
    active_nodes: &HashSet<NodeId>,
) -> HashMap<NodeId, BoundaryClass> {
    let bbox = mesh.bounding_box(active.iter().map(|&i| &mesh.elements[i]));
    let mut classes = HashMap::new();

    for &node_id in active_nodes {
        if let Some(&explicit) = mesh.boundary.get(&node_id) {
            classes.insert(node_id, explicit);
            continue;
        }
        let Some(node) = mesh.node(node_id) else {
            continue;
        };
        let Some([min_x, min_y, max_x, max_y]) = bbox else {
            continue;
        };
        let tol = EDGE_TOL_REL.max(1e-12) * (max_x - min_x).max(max_y - min_y).max(1.0);
        let class = if (node.y - min_y).abs() <= tol {
            BoundaryClass::FullFixed
        } else if (node.x - min_x).abs() <= tol || (node.x - max_x).abs() <= tol {
            BoundaryClass::NormalFixed
        } else {
            BoundaryClass::Free
        };
        classes.insert(node_id, class);
    }
    classes
}

/// Build the constraint set for a phase's active region.
///
/// `node_dof` maps a node identity to its first dof index (ux; uy is the
/// next). Returns an error when the region ends up entirely
/// unconstrained, which would make the tangent singular.
pub fn build_constraints(
    mesh: &Mesh,
    active: &[usize],
    node_dof: &HashMap<NodeId, usize>,
) -> Result<Constraints> {
    let ndof = node_dof.len() * 2;
    let mut constraints = Constraints {
        eliminated: vec![false; ndof],
        skew_normals: Vec::new(),
        floating_nodes: Vec::new(),
    };

    let mut active_nodes: HashSet<NodeId> = HashSet::new();
    for &index in active {
        active_nodes.extend(mesh.elements[index].nodes.iter().copied());
    }

    // Floating nodes: in the dof map but attached to no active element.
    let mut floating: Vec<NodeId> = node_dof
        .keys()
        .filter(|id| !active_nodes.contains(id))
        .copied()
        .collect();
    floating.sort();
    for &node_id in &floating {
        let base = node_dof[&node_id];
        constraints.eliminated[base] = true;
        constraints.eliminated[base + 1] = true;
    }
    constraints.floating_nodes = floating;

    let classes = classify_nodes(mesh, active, &active_nodes);
    let normals = node_normals(mesh, active);
    let bbox = mesh.bounding_box(active.iter().map(|&i| &mesh.elements[i]));

    let mut sorted_nodes: Vec<NodeId> = active_nodes.into_iter().collect();
    sorted_nodes.sort();
    for node_id in sorted_nodes {
        let Some(&base) = node_dof.get(&node_id) else {
            continue;
        };
        match classes.get(&node_id).copied().unwrap_or_default() {
            BoundaryClass::FullFixed => {
                constraints.eliminated[base] = true;
                constraints.eliminated[base + 1] = true;
            }
            BoundaryClass::NormalFixed => {
                // Nodes on the bounding-box side walls are pure rollers,
                // including the corners they share with the free top edge.
                if on_side_wall(mesh, node_id, bbox) {
                    constraints.eliminated[base] = true;
                    continue;
                }
                let normal = normals.get(&node_id).copied().unwrap_or([1.0, 0.0]);
                if normal[0].abs() >= 0.999 {
                    constraints.eliminated[base] = true;
                } else if normal[1].abs() >= 0.999 {
                    constraints.eliminated[base + 1] = true;
                } else {
                    constraints.skew_normals.push((base, normal));
                }
            }
            BoundaryClass::Free => {}
        }
    }

    if constraints.num_eliminated() == constraints.floating_nodes.len() * 2
        && constraints.skew_normals.is_empty()
        && !active.is_empty()
    {
        return Err(SolverError::DisconnectedRegion(
            "active region has no essential boundary conditions".to_string(),
        ));
    }

    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_model::{ElementId, MaterialId, Node, Tri6};

    /// Two elements tiling the unit square: corners (0,0)-(1,0)-(1,1)-(0,1).
    fn square_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        let coords = [
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [0.5, 0.0],
            [1.0, 0.5],
            [0.5, 0.5],
            [0.5, 1.0],
            [0.0, 0.5],
        ];
        for (i, c) in coords.iter().enumerate() {
            mesh.add_node(Node::new(NodeId(i as u32), c[0], c[1]));
        }
        // Lower-right triangle: 0-1-2, mids 4 (0-1), 5 (1-2), 6 (2-0).
        mesh.add_element(Tri6::new(
            ElementId(0),
            [NodeId(0), NodeId(1), NodeId(2), NodeId(4), NodeId(5), NodeId(6)],
            MaterialId(0),
        ));
        // Upper-left triangle: 0-2-3, mids 6 (0-2), 7 (2-3), 8 (3-0).
        mesh.add_element(Tri6::new(
            ElementId(1),
            [NodeId(0), NodeId(2), NodeId(3), NodeId(6), NodeId(7), NodeId(8)],
            MaterialId(0),
        ));
        mesh
    }

    fn dof_map(mesh: &Mesh) -> HashMap<NodeId, usize> {
        mesh.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, 2 * i))
            .collect()
    }

    #[test]
    fn interior_diagonal_is_not_boundary() {
        let mesh = square_mesh();
        let edges = boundary_edges(&mesh, &[0, 1]);
        assert_eq!(edges.len(), 4);
        assert!(!edges.contains(&(NodeId(0), NodeId(2))));
        assert!(edges.contains(&(NodeId(0), NodeId(1))));
    }

    #[test]
    fn default_policy_on_bounding_box() {
        let mesh = square_mesh();
        let map = dof_map(&mesh);
        let constraints = build_constraints(&mesh, &[0, 1], &map).unwrap();

        // Bottom nodes 0, 1, 4 are fully fixed.
        for node in [0u32, 1, 4] {
            let base = map[&NodeId(node)];
            assert!(constraints.eliminated[base], "node {node} ux");
            assert!(constraints.eliminated[base + 1], "node {node} uy");
        }
        // Side nodes 5 (x=1) and 8 (x=0) are fixed in x only.
        for node in [5u32, 8] {
            let base = map[&NodeId(node)];
            assert!(constraints.eliminated[base]);
            assert!(!constraints.eliminated[base + 1]);
        }
        // Top mid node 7 is free.
        let base = map[&NodeId(7)];
        assert!(!constraints.eliminated[base]);
        assert!(!constraints.eliminated[base + 1]);
        assert!(constraints.floating_nodes.is_empty());
    }

    #[test]
    fn top_corner_on_side_wall_is_pure_roller() {
        let mesh = square_mesh();
        let map = dof_map(&mesh);
        let constraints = build_constraints(&mesh, &[0, 1], &map).unwrap();
        // Nodes 2 (1,1) and 3 (0,1) sit on side walls and the free top
        // edge; they settle vertically but are held in x.
        for node in [2u32, 3] {
            let base = map[&NodeId(node)];
            assert!(constraints.eliminated[base]);
            assert!(!constraints.eliminated[base + 1]);
        }
        assert!(constraints.skew_normals.is_empty());
    }

    #[test]
    fn explicit_classification_wins() {
        let mut mesh = square_mesh();
        mesh.boundary.insert(NodeId(7), BoundaryClass::FullFixed);
        let map = dof_map(&mesh);
        let constraints = build_constraints(&mesh, &[0, 1], &map).unwrap();
        let base = map[&NodeId(7)];
        assert!(constraints.eliminated[base]);
        assert!(constraints.eliminated[base + 1]);
    }

    #[test]
    fn deactivated_element_leaves_floating_nodes() {
        let mesh = square_mesh();
        let map = dof_map(&mesh);
        // Only the lower-right triangle is active; nodes 3, 7, 8 float.
        let constraints = build_constraints(&mesh, &[0], &map).unwrap();
        assert_eq!(
            constraints.floating_nodes,
            vec![NodeId(3), NodeId(7), NodeId(8)]
        );
        for node in [3u32, 7, 8] {
            let base = map[&NodeId(node)];
            assert!(constraints.eliminated[base]);
            assert!(constraints.eliminated[base + 1]);
        }
    }

    #[test]
    fn unconstrained_region_is_rejected() {
        let mut mesh = square_mesh();
        // Explicitly free every node; the default policy is overridden.
        for node in &mesh.nodes.clone() {
            mesh.boundary.insert(node.id, BoundaryClass::Free);
        }
        let map = dof_map(&mesh);
        let err = build_constraints(&mesh, &[0, 1], &map).unwrap_err();
        assert!(matches!(err, SolverError::DisconnectedRegion(_)));
    }

    #[test]
    fn outward_normals_point_away_from_square() {
        let mesh = square_mesh();
        let normals = node_normals(&mesh, &[0, 1]);
        // Mid node 5 on the right wall: outward normal is +x.
        let n5 = normals[&NodeId(5)];
        assert!(n5[0] > 0.999 && n5[1].abs() < 1e-9);
        // Mid node 8 on the left wall: outward normal is -x.
        let n8 = normals[&NodeId(8)];
        assert!(n8[0] < -0.999 && n8[1].abs() < 1e-9);
        // Corner node 2 (top-right) averages +x and +y.
        let n2 = normals[&NodeId(2)];
        assert!(n2[0] > 0.0 && n2[1] > 0.0);
    }
}
