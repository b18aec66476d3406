//! Shared helpers for solver integration tests: structured six-node
//! triangle meshes over rectangular regions.
#![allow(dead_code)]

use terra_model::{ElementId, MaterialId, Mesh, Node, NodeId, PolygonTag, Tri6};

/// Build a structured T6 mesh over `[0, width] x [0, height]` with
/// `nx` by `ny` squares, each split into two triangles along the
/// bottom-left to top-right diagonal. Nodes live on the half-step grid.
/// `tag_of` assigns the polygon tag per square (column, row).
pub fn rect_mesh<F>(
    nx: usize,
    ny: usize,
    width: f64,
    height: f64,
    material: MaterialId,
    tag_of: F,
) -> Mesh
where
    F: Fn(usize, usize) -> PolygonTag,
{
    let mut mesh = Mesh::new();
    let cols = 2 * nx + 1;
    let rows = 2 * ny + 1;
    let dx = width / (2.0 * nx as f64);
    let dy = height / (2.0 * ny as f64);

    let node_id = |i: usize, j: usize| NodeId((j * cols + i) as u32);
    for j in 0..rows {
        for i in 0..cols {
            mesh.add_node(Node::new(node_id(i, j), i as f64 * dx, j as f64 * dy));
        }
    }

    let mut next_element = 0u32;
    for cy in 0..ny {
        for cx in 0..nx {
            let tag = tag_of(cx, cy);
            let (i0, j0) = (2 * cx, 2 * cy);
            // Lower-right triangle: (0,0)-(1,0)-(1,1) of the square.
            mesh.add_element(
                Tri6::new(
                    ElementId(next_element),
                    [
                        node_id(i0, j0),
                        node_id(i0 + 2, j0),
                        node_id(i0 + 2, j0 + 2),
                        node_id(i0 + 1, j0),
                        node_id(i0 + 2, j0 + 1),
                        node_id(i0 + 1, j0 + 1),
                    ],
                    material,
                )
                .with_polygon(tag),
            );
            next_element += 1;
            // Upper-left triangle: (0,0)-(1,1)-(0,1) of the square.
            mesh.add_element(
                Tri6::new(
                    ElementId(next_element),
                    [
                        node_id(i0, j0),
                        node_id(i0 + 2, j0 + 2),
                        node_id(i0, j0 + 2),
                        node_id(i0 + 1, j0 + 1),
                        node_id(i0 + 1, j0 + 2),
                        node_id(i0, j0 + 1),
                    ],
                    material,
                )
                .with_polygon(tag),
            );
            next_element += 1;
        }
    }

    mesh
}

/// Nodal result lookup by position with a small tolerance
pub fn nodal_at<'r>(
    mesh: &Mesh,
    result: &'r terra_model::PhaseResult,
    x: f64,
    y: f64,
) -> Option<&'r terra_model::NodalResult> {
    let node = mesh
        .nodes
        .iter()
        .find(|n| (n.x - x).abs() < 1e-9 && (n.y - y).abs() < 1e-9)?;
    result.nodal.iter().find(|r| r.node == node.id)
}
