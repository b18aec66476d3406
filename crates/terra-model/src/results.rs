//! Per-phase solver output: displacement and pore-pressure snapshots,
//! integration-point state, and the load-displacement trace.

use crate::ids::{ElementId, NodeId, PhaseId};
use crate::stress::Stress;
use serde::{Deserialize, Serialize};

/// One converged step of the continuation path: load factor (Mstage for
/// plastic phases, sum-Msf for safety phases) versus maximum displacement
/// magnitude. External viewers render this as the convergence signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepPoint {
    /// Step index within the phase, starting at 1
    pub step: usize,
    /// Load factor reached at this step
    pub load_factor: f64,
    /// Maximum nodal displacement magnitude [m]
    pub max_displacement: f64,
}

/// Why a phase stopped without reaching its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Step halvings exhausted without a converged increment
    StepHalvingExhausted,
    /// Step budget spent before the load target
    StepBudgetExhausted,
    /// Cancelled from outside
    Cancelled,
}

/// Displacement and recovered pore pressure at a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodalResult {
    /// Node identity
    pub node: NodeId,
    /// Horizontal displacement [m]
    pub ux: f64,
    /// Vertical displacement [m]
    pub uy: f64,
    /// Recovered total pore pressure [kPa], pressure positive
    pub pwp: f64,
}

/// State at one integration point after the phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpResult {
    /// Owning element
    pub element: ElementId,
    /// Integration point index, 0..3
    pub gp: usize,
    /// Effective stress, tension positive [kPa]
    pub effective_stress: Stress,
    /// Total stress, tension positive [kPa]
    pub total_stress: Stress,
    /// Steady pore pressure [kPa], pressure positive
    pub steady_pwp: f64,
    /// Excess pore pressure [kPa], pressure positive
    pub excess_pwp: f64,
    /// Total pore pressure = steady + excess [kPa]
    pub total_pwp: f64,
    /// Accumulated plastic strain
    pub plastic_strain: f64,
    /// Whether the point sits on the yield surface
    pub yielded: bool,
}

/// Snapshot emitted by the phase driver on phase completion (converged or
/// not). Children initialize from this entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// The phase this result belongs to
    pub phase: PhaseId,
    /// Whether the phase reached its load target
    pub success: bool,
    /// Failure diagnostics when `success` is false
    pub failure: Option<PhaseFailure>,
    /// Per-node displacement and pore pressure
    pub nodal: Vec<NodalResult>,
    /// Per-integration-point state of every active element
    pub gp_state: Vec<GpResult>,
    /// Load-displacement trace, in step order
    pub step_points: Vec<StepPoint>,
    /// Load factor reached (equals the target on success)
    pub reached_load_factor: f64,
    /// Factor of safety; only set by safety-analysis phases
    pub safety_factor: Option<f64>,
    /// Nodes left unattached by element deactivation in this phase
    pub floating_nodes: Vec<NodeId>,
}

/// Failure record inside a phase result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseFailure {
    /// Step index at which the phase gave up
    pub step: usize,
    /// Why the phase stopped
    pub reason: FailureReason,
}

impl PhaseResult {
    /// Maximum nodal displacement magnitude in the snapshot
    pub fn max_displacement(&self) -> f64 {
        self.nodal
            .iter()
            .map(|n| (n.ux * n.ux + n.uy * n.uy).sqrt())
            .fold(0.0, f64::max)
    }
}
