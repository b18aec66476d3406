//! Mesh data structures for the plane-strain solver.
//!
//! The mesh is produced by an external constrained triangulator and is
//! immutable during solving. Elements are six-node (quadratic) triangles:
//! three corner nodes followed by three mid-side nodes in cyclic order.

use crate::ids::{ElementId, MaterialId, NodeId, PolygonTag};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A node in the finite element mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identity (stable, assigned by the mesher)
    pub id: NodeId,
    /// X coordinate [m]
    pub x: f64,
    /// Y coordinate [m], positive up
    pub y: f64,
}

impl Node {
    /// Create a new node
    pub fn new(id: NodeId, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    /// Get coordinates as an array
    pub fn coords(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// A six-node triangle element.
///
/// Connectivity order: corner nodes n1, n2, n3 (counter-clockwise),
/// then mid-side nodes n12, n23, n31.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tri6 {
    /// Element identity
    pub id: ElementId,
    /// Node connectivity: [n1, n2, n3, n12, n23, n31]
    pub nodes: [NodeId; 6],
    /// Material assigned by the mesher (phases may override per polygon)
    pub material: MaterialId,
    /// Polygon the element was meshed from; used for phase activation
    /// masks and material overrides
    pub polygon: Option<PolygonTag>,
}

impl Tri6 {
    /// Create a new element
    pub fn new(id: ElementId, nodes: [NodeId; 6], material: MaterialId) -> Self {
        Self {
            id,
            nodes,
            material,
            polygon: None,
        }
    }

    /// Attach the source polygon tag
    pub fn with_polygon(mut self, tag: PolygonTag) -> Self {
        self.polygon = Some(tag);
        self
    }

    /// Corner node identities (n1, n2, n3)
    pub fn corners(&self) -> [NodeId; 3] {
        [self.nodes[0], self.nodes[1], self.nodes[2]]
    }

    /// The three edges as (corner, mid-side, corner) triples, in cyclic
    /// order: (n1,n12,n2), (n2,n23,n3), (n3,n31,n1).
    pub fn edges(&self) -> [[NodeId; 3]; 3] {
        let n = &self.nodes;
        [[n[0], n[3], n[1]], [n[1], n[4], n[2]], [n[2], n[5], n[0]]]
    }
}

/// Essential boundary condition class for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryClass {
    /// Both displacement components prescribed to zero
    FullFixed,
    /// Component normal to the boundary prescribed to zero
    NormalFixed,
    /// Unconstrained
    #[default]
    Free,
}

/// Complete finite element mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    /// All nodes, in mesher order
    pub nodes: Vec<Node>,
    /// All elements, in mesher order
    pub elements: Vec<Tri6>,
    /// Boundary classification per node; nodes absent from the map get
    /// the auto-generated policy (bottom fixed, sides normal-fixed)
    #[serde(default)]
    pub boundary: HashMap<NodeId, BoundaryClass>,
    /// Pre-assigned mesh node per point load, when the mesher resolved it
    #[serde(default)]
    pub point_load_nodes: HashMap<crate::ids::LoadId, NodeId>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the mesh
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Add an element to the mesh
    pub fn add_element(&mut self, element: Tri6) {
        self.elements.push(element);
    }

    /// Look up a node by identity
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up an element by identity
    pub fn element(&self, id: ElementId) -> Option<&Tri6> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Total number of displacement degrees of freedom (two per node)
    pub fn num_dofs(&self) -> usize {
        self.nodes.len() * 2
    }

    /// Signed area of an element's corner triangle; positive when the
    /// corner ordering is counter-clockwise.
    pub fn corner_area(&self, element: &Tri6) -> Result<f64, String> {
        let [a, b, c] = element.corners();
        let pa = self
            .node(a)
            .ok_or_else(|| format!("element {} references missing node {}", element.id, a))?;
        let pb = self
            .node(b)
            .ok_or_else(|| format!("element {} references missing node {}", element.id, b))?;
        let pc = self
            .node(c)
            .ok_or_else(|| format!("element {} references missing node {}", element.id, c))?;
        Ok(0.5 * ((pb.x - pa.x) * (pc.y - pa.y) - (pc.x - pa.x) * (pb.y - pa.y)))
    }

    /// Validate the mesh: unique identities, resolvable connectivity,
    /// counter-clockwise corner ordering.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen_nodes = HashSet::new();
        for node in &self.nodes {
            if !seen_nodes.insert(node.id) {
                return Err(format!("duplicate node identity {}", node.id));
            }
        }

        let mut seen_elements = HashSet::new();
        for element in &self.elements {
            if !seen_elements.insert(element.id) {
                return Err(format!("duplicate element identity {}", element.id));
            }
            for &node_id in &element.nodes {
                if !seen_nodes.contains(&node_id) {
                    return Err(format!(
                        "element {} references non-existent node {}",
                        element.id, node_id
                    ));
                }
            }
            let area = self.corner_area(element)?;
            if area <= 0.0 {
                return Err(format!(
                    "element {} has non-positive area {:.3e}; corner ordering must be counter-clockwise",
                    element.id, area
                ));
            }
        }

        Ok(())
    }

    /// Axis-aligned bounding box (min_x, min_y, max_x, max_y) of the
    /// given elements' nodes; `None` for an empty selection.
    pub fn bounding_box<'a, I>(&self, elements: I) -> Option<[f64; 4]>
    where
        I: IntoIterator<Item = &'a Tri6>,
    {
        let mut bbox: Option<[f64; 4]> = None;
        for element in elements {
            for &node_id in &element.nodes {
                let node = self.node(node_id)?;
                let b = bbox.get_or_insert([node.x, node.y, node.x, node.y]);
                b[0] = b[0].min(node.x);
                b[1] = b[1].min(node.y);
                b[2] = b[2].max(node.x);
                b[3] = b[3].max(node.y);
            }
        }
        bbox
    }

    /// Get mesh statistics
    pub fn statistics(&self) -> MeshStatistics {
        let mut polygon_counts = HashMap::new();
        for element in &self.elements {
            if let Some(tag) = element.polygon {
                *polygon_counts.entry(tag).or_insert(0usize) += 1;
            }
        }
        MeshStatistics {
            num_nodes: self.nodes.len(),
            num_elements: self.elements.len(),
            num_dofs: self.num_dofs(),
            polygon_counts,
        }
    }
}

/// Mesh statistics for reporting
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    /// Total number of nodes
    pub num_nodes: usize,
    /// Total number of elements
    pub num_elements: usize,
    /// Total displacement degrees of freedom
    pub num_dofs: usize,
    /// Element count per polygon tag
    pub polygon_counts: HashMap<PolygonTag, usize>,
}
