//! Data model for the terra geotechnical finite-element engine.
//!
//! This crate holds the entities shared between the solver, the project
//! file, and the streaming output: mesh, materials, water levels, loads,
//! the phase tree, and solver settings. Everything here is plain data;
//! the numerics live in `terra-solver`.

pub mod ids;
pub mod loads;
pub mod material;
pub mod mesh;
pub mod phase;
pub mod results;
pub mod settings;
pub mod stress;
pub mod water;

pub use ids::{ElementId, LoadId, MaterialId, NodeId, PhaseId, PolygonTag, WaterLevelId};
pub use loads::Load;
pub use material::{Drainage, Material, MaterialModel, MaterialSet};
pub use mesh::{BoundaryClass, Mesh, MeshStatistics, Node, Tri6};
pub use phase::{Phase, PhaseKind, PhaseTree};
pub use results::{
    FailureReason, GpResult, NodalResult, PhaseFailure, PhaseResult, StepPoint,
};
pub use settings::SolverSettings;
pub use stress::Stress;
pub use water::WaterLevel;
