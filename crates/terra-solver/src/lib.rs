//! Numerical core of the terra geotechnical finite-element engine.
//!
//! Staged, nonlinear, elasto-plastic plane-strain solver over six-node
//! triangles: Mohr-Coulomb return mapping per integration point, pore
//! pressure coupling, staged construction with element activation, and an
//! adaptive arc-length driver that also powers the strength-reduction
//! safety analysis.

pub mod arc_length;
pub mod assembly;
pub mod backend;
pub mod boundary;
pub mod cancel;
pub mod constitutive;
pub mod driver;
pub mod elements;
pub mod error;
pub mod events;
pub mod initial_stress;
pub mod pore_pressure;
pub mod postprocess;
pub mod state;

pub use arc_length::{BorderedUpdate, StepControl, bordered_update, predictor_lambda};
pub use assembly::{
    DofMap, ElementContext, SparseTangent, assemble_external, assemble_tangent_and_internal,
};
pub use backend::{
    BackendError, Factorization, LinearSolver, NativeBackend, SolveInfo, SparseTripletsF64,
    default_backend,
};
pub use boundary::{Constraints, boundary_edges, build_constraints, classify_nodes};
pub use cancel::CancelToken;
pub use constitutive::{GpUpdate, MaterialLaw, ReturnMap, plane_strain_tangent};
pub use driver::{PhaseDriver, RunOutcome};
pub use elements::{GAUSS_POINTS, Tri6Kernel};
pub use error::{Result, SolverError};
pub use events::{EventSink, NullSink, RecordingSink};
pub use initial_stress::{geostatic_stress, k0_initialize, overburden};
pub use pore_pressure::{GAMMA_WATER, below_water_table, steady_pwp};
pub use postprocess::{max_displacement, recover_nodal_scalar};
pub use state::{ElementGpState, GpState};
