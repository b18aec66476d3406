//! Six-node isoparametric triangle for plane strain.
//!
//! Quadratic serendipity shape functions on natural coordinates (r, s)
//! with t = 1 - r - s:
//!
//! N1 = t(2t-1)   N2 = r(2r-1)   N3 = s(2s-1)
//! N12 = 4rt      N23 = 4rs      N31 = 4st
//!
//! Integration: three-point Gauss rule, weights 1/6, points
//! (1/6,1/6), (2/3,1/6), (1/6,2/3). The B-matrix maps the 12-component
//! nodal displacement vector to engineering strain (exx, eyy, gxy); the
//! out-of-plane normal stress is carried separately by the constitutive
//! state.

use crate::error::{Result, SolverError};
use nalgebra::{Matrix2, Matrix3, SMatrix, SVector, Vector2, Vector3};
use terra_model::{Mesh, Tri6};

/// Natural-coordinate quadrature point with weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    pub r: f64,
    pub s: f64,
    pub weight: f64,
}

/// Three-point rule: exact for quadratic polynomials on the triangle
pub const GAUSS_POINTS: [GaussPoint; 3] = [
    GaussPoint {
        r: 1.0 / 6.0,
        s: 1.0 / 6.0,
        weight: 1.0 / 6.0,
    },
    GaussPoint {
        r: 2.0 / 3.0,
        s: 1.0 / 6.0,
        weight: 1.0 / 6.0,
    },
    GaussPoint {
        r: 1.0 / 6.0,
        s: 2.0 / 3.0,
        weight: 1.0 / 6.0,
    },
];

/// Two-point Gauss rule on [-1, 1] for edge-load integration
pub const EDGE_GAUSS: [(f64, f64); 2] = [
    (-0.577_350_269_189_625_8, 1.0),
    (0.577_350_269_189_625_8, 1.0),
];

/// Shape functions at (r, s)
pub fn shape_functions(r: f64, s: f64) -> [f64; 6] {
    let t = 1.0 - r - s;
    [
        t * (2.0 * t - 1.0),
        r * (2.0 * r - 1.0),
        s * (2.0 * s - 1.0),
        4.0 * r * t,
        4.0 * r * s,
        4.0 * s * t,
    ]
}

/// Shape-function derivatives with respect to (r, s).
///
/// Returns `[dN/dr, dN/ds]`, each for all six nodes.
pub fn shape_derivatives(r: f64, s: f64) -> [[f64; 6]; 2] {
    let t = 1.0 - r - s;
    let dr = [
        -(4.0 * t - 1.0),
        4.0 * r - 1.0,
        0.0,
        4.0 * (t - r),
        4.0 * s,
        -4.0 * s,
    ];
    let ds = [
        -(4.0 * t - 1.0),
        0.0,
        4.0 * s - 1.0,
        -4.0 * r,
        4.0 * r,
        4.0 * (t - s),
    ];
    [dr, ds]
}

/// Quadratic shape functions along one element edge, natural coordinate
/// xi in [-1, 1]: end node a, mid-side node m, end node b.
pub fn edge_shape_functions(xi: f64) -> [f64; 3] {
    [
        0.5 * xi * (xi - 1.0),
        1.0 - xi * xi,
        0.5 * xi * (xi + 1.0),
    ]
}

/// Extrapolate three Gauss-point values to the corner nodes.
///
/// The Gauss values are interpreted as samples of a linear field; the
/// inverse of the corner-to-gp interpolation matrix is applied in closed
/// form. Mid-side values follow by averaging the adjacent corners.
pub fn extrapolate_to_corners(gp_values: [f64; 3]) -> [f64; 3] {
    let [g1, g2, g3] = gp_values;
    [
        (5.0 * g1 - g2 - g3) / 3.0,
        (5.0 * g2 - g3 - g1) / 3.0,
        (5.0 * g3 - g1 - g2) / 3.0,
    ]
}

/// Geometry-bound element kernel: node coordinates gathered once, all
/// quadrature-level operations derived from them.
#[derive(Debug, Clone)]
pub struct Tri6Kernel {
    /// Element identity, carried for diagnostics
    pub id: terra_model::ElementId,
    /// Node coordinates in connectivity order
    pub coords: [[f64; 2]; 6],
}

impl Tri6Kernel {
    /// Gather node coordinates for an element
    pub fn from_mesh(mesh: &Mesh, element: &Tri6) -> Result<Self> {
        let mut coords = [[0.0; 2]; 6];
        for (slot, &node_id) in element.nodes.iter().enumerate() {
            let node = mesh.node(node_id).ok_or_else(|| {
                SolverError::Mesh(format!(
                    "element {} references missing node {}",
                    element.id, node_id
                ))
            })?;
            coords[slot] = [node.x, node.y];
        }
        Ok(Self {
            id: element.id,
            coords,
        })
    }

    /// Corner-triangle area (positive for counter-clockwise ordering)
    pub fn area(&self) -> f64 {
        let [a, b, c] = [self.coords[0], self.coords[1], self.coords[2]];
        0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]))
    }

    /// Centroid of the corner triangle
    pub fn centroid(&self) -> [f64; 2] {
        let [a, b, c] = [self.coords[0], self.coords[1], self.coords[2]];
        [
            (a[0] + b[0] + c[0]) / 3.0,
            (a[1] + b[1] + c[1]) / 3.0,
        ]
    }

    /// World position of a quadrature point
    pub fn gp_position(&self, gp: usize) -> [f64; 2] {
        let g = GAUSS_POINTS[gp];
        let n = shape_functions(g.r, g.s);
        let mut x = 0.0;
        let mut y = 0.0;
        for i in 0..6 {
            x += n[i] * self.coords[i][0];
            y += n[i] * self.coords[i][1];
        }
        [x, y]
    }

    /// Jacobian of the isoparametric map at (r, s) and its determinant.
    ///
    /// A determinant at or below 1e-12 times the element area scale is a
    /// fatal mesh defect.
    pub fn jacobian(&self, r: f64, s: f64) -> Result<(Matrix2<f64>, f64)> {
        let [dr, ds] = shape_derivatives(r, s);
        let mut j: Matrix2<f64> = Matrix2::zeros();
        for i in 0..6 {
            j[(0, 0)] += dr[i] * self.coords[i][0];
            j[(0, 1)] += dr[i] * self.coords[i][1];
            j[(1, 0)] += ds[i] * self.coords[i][0];
            j[(1, 1)] += ds[i] * self.coords[i][1];
        }
        let det = j[(0, 0)] * j[(1, 1)] - j[(0, 1)] * j[(1, 0)];
        let scale = self.area().abs().max(f64::MIN_POSITIVE);
        if det.abs() <= 1e-12 * scale {
            return Err(SolverError::DegenerateElement {
                element: self.id,
                det,
            });
        }
        Ok((j, det))
    }

    /// Cartesian shape-function derivatives (dN/dx, dN/dy) and det J at
    /// a quadrature point
    fn cartesian_derivatives(&self, gp: usize) -> Result<([f64; 6], [f64; 6], f64)> {
        let g = GAUSS_POINTS[gp];
        let (j, det) = self.jacobian(g.r, g.s)?;
        let [dr, ds] = shape_derivatives(g.r, g.s);
        // Inverse of the 2x2 Jacobian applied column-wise.
        let inv = Matrix2::new(j[(1, 1)], -j[(0, 1)], -j[(1, 0)], j[(0, 0)]) / det;
        let mut dx = [0.0; 6];
        let mut dy = [0.0; 6];
        for i in 0..6 {
            let local = Vector2::new(dr[i], ds[i]);
            let cart = inv * local;
            dx[i] = cart[0];
            dy[i] = cart[1];
        }
        Ok((dx, dy, det))
    }

    /// B-matrix (3x12) and det J at a quadrature point
    pub fn b_matrix(&self, gp: usize) -> Result<(SMatrix<f64, 3, 12>, f64)> {
        let (dx, dy, det) = self.cartesian_derivatives(gp)?;
        let mut b = SMatrix::<f64, 3, 12>::zeros();
        for i in 0..6 {
            b[(0, 2 * i)] = dx[i];
            b[(1, 2 * i + 1)] = dy[i];
            b[(2, 2 * i)] = dy[i];
            b[(2, 2 * i + 1)] = dx[i];
        }
        Ok((b, det))
    }

    /// Engineering strain (exx, eyy, gxy) at each quadrature point for a
    /// nodal displacement vector
    pub fn strains(&self, u: &SVector<f64, 12>) -> Result<[Vector3<f64>; 3]> {
        let mut out = [Vector3::zeros(); 3];
        for gp in 0..3 {
            let (b, _) = self.b_matrix(gp)?;
            out[gp] = b * u;
        }
        Ok(out)
    }

    /// Element tangent stiffness and internal force.
    ///
    /// `d` is the constitutive tangent per quadrature point; `sigma` the
    /// in-plane total stress (xx, yy, xy) per quadrature point.
    pub fn stiffness_and_internal(
        &self,
        d: &[Matrix3<f64>; 3],
        sigma: &[Vector3<f64>; 3],
    ) -> Result<(SMatrix<f64, 12, 12>, SVector<f64, 12>)> {
        let mut ke = SMatrix::<f64, 12, 12>::zeros();
        let mut fint = SVector::<f64, 12>::zeros();
        for gp in 0..3 {
            let (b, det) = self.b_matrix(gp)?;
            let w = GAUSS_POINTS[gp].weight * det;
            ke += b.transpose() * d[gp] * b * w;
            fint += b.transpose() * sigma[gp] * w;
        }
        Ok((ke, fint))
    }

    /// Element stiffness alone
    pub fn stiffness(&self, d: &[Matrix3<f64>; 3]) -> Result<SMatrix<f64, 12, 12>> {
        let zero = [Vector3::zeros(); 3];
        Ok(self.stiffness_and_internal(d, &zero)?.0)
    }

    /// Consistent nodal body-force vector for a per-gp unit weight
    /// (acting in -y)
    pub fn body_force(&self, gamma: [f64; 3]) -> Result<SVector<f64, 12>> {
        let mut f = SVector::<f64, 12>::zeros();
        for gp in 0..3 {
            let g = GAUSS_POINTS[gp];
            let (_, det) = self.jacobian(g.r, g.s)?;
            let n = shape_functions(g.r, g.s);
            let w = g.weight * det;
            for i in 0..6 {
                f[2 * i + 1] += -gamma[gp] * n[i] * w;
            }
        }
        Ok(f)
    }

    /// Nodal load vector for a force per unit length applied along one
    /// element edge. `edge` indexes the cyclic edges (0: n1-n12-n2,
    /// 1: n2-n23-n3, 2: n3-n31-n1); `q` is the force per unit length.
    pub fn edge_load(&self, edge: usize, q: [f64; 2]) -> SVector<f64, 12> {
        // Connectivity slots of (end, mid, end) for each edge.
        const EDGE_SLOTS: [[usize; 3]; 3] = [[0, 3, 1], [1, 4, 2], [2, 5, 0]];
        let slots = EDGE_SLOTS[edge];
        let a = self.coords[slots[0]];
        let b = self.coords[slots[2]];
        let half_length = 0.5 * ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();

        let mut f = SVector::<f64, 12>::zeros();
        for &(xi, w) in &EDGE_GAUSS {
            let n = edge_shape_functions(xi);
            for (k, &slot) in slots.iter().enumerate() {
                f[2 * slot] += n[k] * q[0] * half_length * w;
                f[2 * slot + 1] += n[k] * q[1] * half_length * w;
            }
        }
        f
    }
}
