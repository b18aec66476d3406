//! Error types for the solver core.

use terra_model::{ElementId, NodeId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

/// Fatal solver errors. Phase-local non-convergence is not an error; it
/// is recorded in the phase result and the run continues.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("mesh error: {0}")]
    Mesh(String),

    #[error("element {element}: Jacobian determinant {det:.3e} is degenerate")]
    DegenerateElement { element: ElementId, det: f64 },

    #[error("duplicate node identity {0}")]
    DuplicateNode(NodeId),

    #[error("active region is disconnected or unconstrained: {0}")]
    DisconnectedRegion(String),

    #[error("material error: {0}")]
    InvalidMaterial(String),

    #[error("phase tree error: {0}")]
    InvalidPhaseTree(String),

    #[error("settings error: {0}")]
    InvalidSettings(String),

    #[error("linear system is singular: {0}")]
    SingularSystem(String),

    #[error("cancelled")]
    Cancelled,
}
