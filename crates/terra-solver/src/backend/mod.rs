//! Linear solver backends.
//!
//! The assembler produces backend-agnostic triplet data; a backend turns
//! it into a factorization that the arc-length corrector reuses for the
//! two right-hand sides of each iteration (residual column and load
//! column).

mod native;
mod traits;

pub use native::NativeBackend;
pub use traits::{BackendError, Factorization, LinearSolver, SolveInfo, SparseTripletsF64};

/// The default backend for the current build
pub fn default_backend() -> NativeBackend {
    NativeBackend
}
