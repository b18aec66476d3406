//! Backend-agnostic linear system data and solver traits.

use nalgebra::DVector;

/// Sparse matrix in COO triplet form
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTripletsF64 {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTripletsF64 {
    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// Metadata about a completed factorization or solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInfo {
    /// Backend identifier for diagnostics
    pub solver_name: String,
}

/// Backend error wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<&str> for BackendError {
    fn from(msg: &str) -> Self {
        BackendError(msg.to_string())
    }
}

/// A reusable factorization of one tangent matrix.
///
/// The arc-length corrector solves two systems per Newton iteration with
/// the same matrix; backends factorize once and back-substitute per
/// right-hand side.
pub trait Factorization {
    /// Solve for one right-hand side; `None` if the matrix was singular
    fn solve(&self, rhs: &DVector<f64>) -> Option<DVector<f64>>;
}

/// A linear solver backend
pub trait LinearSolver {
    /// Factorize the matrix given as COO triplets
    fn factorize(
        &self,
        matrix: &SparseTripletsF64,
    ) -> Result<(Box<dyn Factorization>, SolveInfo), BackendError>;
}
