//! Element implementations.
//!
//! The solver uses a single element family: the six-node isoparametric
//! triangle with three-point Gauss quadrature (`tri6`).

pub mod tri6;

pub use tri6::{
    EDGE_GAUSS, GAUSS_POINTS, GaussPoint, Tri6Kernel, edge_shape_functions,
    extrapolate_to_corners, shape_derivatives, shape_functions,
};
