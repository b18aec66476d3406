//! The phase driver: staged construction, arc-length continuation, and
//! strength reduction.
//!
//! Phases run strictly sequentially along each branch of the phase tree,
//! depth first. Each phase initializes its working state from its parent
//! (K0 or gravity loading for branch roots), computes the external action
//! of the new configuration, and drives it in with adaptive arc-length
//! steps. Safety phases reuse the identical stepping machinery with the
//! load column identically zero: the continuation parameter then advances
//! the strength-reduction factor and the corrector reduces to equilibrium
//! iterations at fixed sum-Msf.
//!
//! The driver never publishes a partially updated state. Trial stress
//! fields live in scratch buffers and are committed only when the step
//! residual passes the tolerance; a failed step always resumes from the
//! last converged point.

use crate::arc_length::{StepControl, bordered_update, predictor_lambda};
use crate::assembly::{
    DofMap, ElementContext, assemble_external, assemble_tangent_and_internal, build_contexts,
};
use crate::backend::{LinearSolver, NativeBackend};
use crate::boundary::{Constraints, boundary_edges, build_constraints};
use crate::cancel::CancelToken;
use crate::constitutive::MaterialLaw;
use crate::error::{Result, SolverError};
use crate::events::EventSink;
use crate::initial_stress::{geostatic_stress, k0_initialize};
use crate::pore_pressure::steady_pwp;
use crate::postprocess::{max_displacement, recover_nodal_scalar};
use crate::state::{ElementGpState, GpState};
use nalgebra::DVector;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use terra_model::{
    FailureReason, GpResult, Load, Material, MaterialSet, Mesh, NodalResult, Phase, PhaseFailure,
    PhaseKind, PhaseResult, PhaseTree, SolverSettings, StepPoint, WaterLevel,
};
use tracing::{debug, info, warn};

/// Relative threshold below which the external action is treated as zero
/// and a phase runs as an equilibrium (nil) step.
const ACTION_EPS: f64 = 1e-10;

/// Maximum step halvings before a step failure becomes a phase failure
const MAX_HALVINGS: usize = 3;

/// Outcome of a full run over the phase tree
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Phase results in execution (depth-first) order
    pub results: Vec<PhaseResult>,
    /// Whether every executed phase succeeded
    pub all_successful: bool,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

/// Working state of one branch, inherited from phase to phase
#[derive(Debug, Clone)]
struct BranchState {
    /// Global displacement vector
    u: DVector<f64>,
    /// Per-mesh-element integration-point state; `None` until the element
    /// first becomes active in the branch
    gp: Vec<Option<ElementGpState>>,
}

impl BranchState {
    fn fresh(ndof: usize, num_elements: usize) -> Self {
        Self {
            u: DVector::zeros(ndof),
            gp: vec![None; num_elements],
        }
    }
}

/// How the continuation parameter acts in a phase
enum DrivingMode {
    /// Plastic and gravity phases: lambda scales the external action
    Load { lambda_max: f64 },
    /// Safety analysis: lambda drives sum-Msf = 1 + lambda
    StrengthReduction { lambda_max: f64 },
}

/// The phase driver
pub struct PhaseDriver<'a> {
    mesh: &'a Mesh,
    materials: &'a MaterialSet,
    loads: &'a [Load],
    water_levels: &'a [WaterLevel],
    tree: &'a PhaseTree,
    settings: SolverSettings,
    dof_map: DofMap,
    backend: NativeBackend,
}

impl<'a> PhaseDriver<'a> {
    /// Create a driver after validating every input. Fatal mesh,
    /// material, settings, and phase-tree defects are rejected here,
    /// before any solve.
    pub fn new(
        mesh: &'a Mesh,
        materials: &'a MaterialSet,
        loads: &'a [Load],
        water_levels: &'a [WaterLevel],
        tree: &'a PhaseTree,
        settings: SolverSettings,
    ) -> Result<Self> {
        mesh.validate().map_err(SolverError::Mesh)?;
        materials.validate().map_err(SolverError::InvalidMaterial)?;
        settings.validate().map_err(SolverError::InvalidSettings)?;
        tree.validate().map_err(SolverError::InvalidPhaseTree)?;
        let dof_map = DofMap::new(mesh);
        Ok(Self {
            mesh,
            materials,
            loads,
            water_levels,
            tree,
            settings,
            dof_map,
            backend: NativeBackend,
        })
    }

    /// Execute the whole phase tree depth first.
    ///
    /// Phase-local non-convergence is recorded in the corresponding
    /// result and the run continues; cancellation stops the run without
    /// emitting results for un-started phases.
    pub fn run(&self, sink: &mut dyn EventSink, cancel: &CancelToken) -> Result<RunOutcome> {
        let order = self.tree.execution_order();
        let mut branch_states: HashMap<terra_model::PhaseId, BranchState> = HashMap::new();
        let mut results = Vec::with_capacity(order.len());
        let mut all_successful = true;
        let mut cancelled = false;

        for (phase_index, &phase_id) in order.iter().enumerate() {
            if cancelled {
                break;
            }
            let phase = self
                .tree
                .get(phase_id)
                .ok_or_else(|| SolverError::InvalidPhaseTree(format!("missing phase {phase_id}")))?;

            let parent_state = match phase.parent {
                Some(parent) => branch_states
                    .get(&parent)
                    .cloned()
                    .ok_or_else(|| {
                        SolverError::InvalidPhaseTree(format!(
                            "phase {} runs before its parent {}",
                            phase.id, parent
                        ))
                    })?,
                None => BranchState::fresh(self.dof_map.ndof(), self.mesh.elements.len()),
            };

            info!(phase = %phase.id, kind = ?phase.kind, "phase start");
            sink.on_log(&format!("phase {} ({:?}) started", phase.id, phase.kind));

            let (result, final_state) =
                self.run_phase(phase, phase_index, parent_state, sink, cancel)?;

            all_successful &= result.success;
            if matches!(
                result.failure,
                Some(PhaseFailure {
                    reason: FailureReason::Cancelled,
                    ..
                })
            ) {
                cancelled = true;
            }

            sink.on_phase_result(phase_index, &result);
            branch_states.insert(phase_id, final_state);
            results.push(result);
        }

        sink.on_final(all_successful && !cancelled);
        Ok(RunOutcome {
            results,
            all_successful: all_successful && !cancelled,
            cancelled,
        })
    }

    /// Indices of the elements active in a phase: tagged elements whose
    /// polygon is in the active set, plus untagged elements (always on).
    fn active_elements(&self, phase: &Phase) -> Vec<usize> {
        self.mesh
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| match e.polygon {
                Some(tag) => phase.active_polygons.contains(&tag),
                None => true,
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// The material governing an element in a phase, after overrides
    fn resolve_material(&self, phase: &Phase, element_index: usize) -> Result<Material> {
        let element = &self.mesh.elements[element_index];
        let material_id = element
            .polygon
            .and_then(|tag| phase.material_overrides.get(&tag))
            .copied()
            .unwrap_or(element.material);
        self.materials
            .get(material_id)
            .cloned()
            .ok_or_else(|| {
                SolverError::InvalidMaterial(format!(
                    "element {} references unknown material {}",
                    element.id, material_id
                ))
            })
    }

    fn water_for(&self, phase: &Phase) -> Option<&WaterLevel> {
        phase
            .water_level
            .and_then(|id| self.water_levels.iter().find(|w| w.id == id))
    }

    fn loads_for(&self, phase: &Phase) -> Vec<&Load> {
        self.loads
            .iter()
            .filter(|l| phase.active_loads.contains(&l.id()))
            .collect()
    }

    /// Run a single phase from its parent state.
    fn run_phase(
        &self,
        phase: &Phase,
        phase_index: usize,
        parent_state: BranchState,
        sink: &mut dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<(PhaseResult, BranchState)> {
        let active = self.active_elements(phase);
        if active.is_empty() {
            return Err(SolverError::Mesh(format!(
                "phase {} has no active elements",
                phase.id
            )));
        }

        let resolved: Vec<(usize, Material)> = active
            .iter()
            .map(|&i| self.resolve_material(phase, i).map(|m| (i, m)))
            .collect::<Result<_>>()?;
        let contexts = build_contexts(self.mesh, &resolved, 1.0, &self.dof_map)?;
        let constraints = build_constraints(self.mesh, &active, self.dof_map.table())?;
        let water = self.water_for(phase);
        let active_loads = self.loads_for(phase);
        let boundary = boundary_edges(self.mesh, &active);

        let mut state = parent_state;
        if phase.reset_displacements || phase.kind.is_initial() {
            // Displacement reset is visual only: stress and plastic state
            // are preserved on inheritance.
            state.u.fill(0.0);
        }

        // K0 initialization has no stepping at all.
        if phase.kind == PhaseKind::K0Procedure {
            let committed = k0_initialize(&contexts, water);
            for (ctx, gp_state) in contexts.iter().zip(&committed) {
                state.gp[ctx.element_index] = Some(*gp_state);
            }
            let result = self.snapshot(
                phase,
                &contexts,
                &committed,
                &state,
                &constraints,
                Vec::new(),
                1.0,
                None,
                true,
                None,
            );
            return Ok((result, state));
        }

        if phase.kind == PhaseKind::GravityLoading {
            // Gravity loading runs from zero stress under body forces.
            state.u.fill(0.0);
            for slot in state.gp.iter_mut() {
                *slot = None;
            }
        }

        // Initialize integration-point state for the active set:
        // geostatic stress for elements entering the branch for the first
        // time, ancestor state otherwise; steady pore pressure always
        // from the phase's own water table (excess is carried over).
        let mut committed: Vec<ElementGpState> = Vec::with_capacity(contexts.len());
        for ctx in &contexts {
            let mut gp_state = match state.gp[ctx.element_index] {
                Some(existing) => existing,
                None => {
                    let [cx, cy] = ctx.kernel.centroid();
                    let k0 = ctx.material.k0_coefficient();
                    let effective = if phase.kind == PhaseKind::GravityLoading {
                        terra_model::Stress::ZERO
                    } else {
                        geostatic_stress(&contexts, water, cx, cy, k0)
                    };
                    let mut fresh = GpState::default();
                    fresh.effective = effective;
                    [fresh; 3]
                }
            };
            for (gp, slot) in gp_state.iter_mut().enumerate() {
                let [x, y] = ctx.kernel.gp_position(gp);
                slot.steady_pwp = steady_pwp(water, x, y);
                slot.tangent = ctx.law.assembly_tangent(ctx.law.elastic_tangent());
            }
            committed.push(gp_state);
        }

        let mode = match phase.kind {
            PhaseKind::GravityLoading => DrivingMode::Load { lambda_max: 1.0 },
            PhaseKind::Plastic => DrivingMode::Load {
                lambda_max: self.settings.max_load_fraction,
            },
            PhaseKind::SafetyAnalysis => DrivingMode::StrengthReduction {
                lambda_max: self.settings.max_safety_factor - 1.0,
            },
            PhaseKind::K0Procedure => unreachable!("K0 handled above"),
        };

        self.continuation(
            phase,
            phase_index,
            mode,
            contexts,
            constraints,
            water,
            &active_loads,
            &boundary,
            committed,
            state,
            sink,
            cancel,
        )
    }

    /// The continuation loop shared by gravity, plastic, and safety
    /// phases.
    #[allow(clippy::too_many_arguments)]
    fn continuation(
        &self,
        phase: &Phase,
        phase_index: usize,
        mode: DrivingMode,
        contexts: Vec<ElementContext>,
        constraints: Constraints,
        water: Option<&WaterLevel>,
        active_loads: &[&Load],
        boundary: &HashSet<(terra_model::NodeId, terra_model::NodeId)>,
        mut committed: Vec<ElementGpState>,
        mut state: BranchState,
        sink: &mut dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<(PhaseResult, BranchState)> {
        let ndof = self.dof_map.ndof();
        let is_safety = matches!(mode, DrivingMode::StrengthReduction { .. });
        let lambda_max = match mode {
            DrivingMode::Load { lambda_max } => lambda_max,
            DrivingMode::StrengthReduction { lambda_max } => lambda_max,
        };

        // Reference internal force of the inherited state over the new
        // configuration, and the external action to drive in.
        let zero_u = DVector::zeros(ndof);
        let (_, f0) =
            assemble_tangent_and_internal(&contexts, &committed, &zero_u, ndof, &constraints)?;
        let fext_cfg = assemble_external(
            self.mesh,
            &contexts,
            active_loads,
            water,
            &self.dof_map,
            boundary,
        )?;
        let mut dfext = &fext_cfg - &f0;
        constraints.apply_to_residual(&mut dfext);
        if is_safety {
            dfext.fill(0.0);
        }

        let df_norm = dfext.norm();
        let f0_norm = f0.norm();
        let ref_norm = if df_norm > ACTION_EPS * f0_norm.max(1.0) {
            df_norm
        } else {
            f0_norm.max(1.0)
        };
        let psi2_f2 = {
            let psi = self.settings.arc_length_psi;
            psi * psi * df_norm * df_norm
        };
        let load_controlled = is_safety || df_norm <= ACTION_EPS * f0_norm.max(1.0);

        let mut control: Option<StepControl> = if is_safety || load_controlled {
            Some(StepControl::new(
                self.settings.initial_step_size,
                self.settings.min_desired_iterations,
                self.settings.max_desired_iterations,
            ))
        } else {
            None // sized from the first predictor solution
        };

        let mut lambda = 0.0f64;
        let mut trace: Vec<StepPoint> = Vec::new();
        let mut step = 0usize;
        let mut halvings = 0usize;
        let mut sign = 1.0f64;
        let mut failure: Option<PhaseFailure> = None;
        let mut singular_logged = false;

        'steps: while lambda < lambda_max - 1e-12 {
            if step >= self.settings.max_steps {
                warn!(phase = %phase.id, "step budget exhausted at lambda {lambda:.4}");
                if !is_safety {
                    failure = Some(PhaseFailure {
                        step,
                        reason: FailureReason::StepBudgetExhausted,
                    });
                } else {
                    sink.on_log(&format!(
                        "phase {}: step budget exhausted at sum-Msf {:.4}",
                        phase.id,
                        1.0 + lambda
                    ));
                }
                break 'steps;
            }
            if cancel.is_cancelled() {
                failure = Some(PhaseFailure {
                    step,
                    reason: FailureReason::Cancelled,
                });
                break 'steps;
            }

            // One arc-length step: predictor plus Newton corrector.
            let msf_base = if is_safety { 1.0 + lambda } else { 1.0 };
            let mut delta_u = DVector::zeros(ndof);
            let mut delta_lambda = 0.0f64;
            let mut predictor_done = false;
            let mut lock_lambda = load_controlled;
            let mut converged_at: Option<usize> = None;
            let mut step_failed = false;

            for iteration in 0..=self.settings.max_iterations {
                if cancel.is_cancelled() {
                    failure = Some(PhaseFailure {
                        step,
                        reason: FailureReason::Cancelled,
                    });
                    break 'steps;
                }

                let msf_trial = if is_safety {
                    msf_base + delta_lambda
                } else {
                    1.0
                };
                let laws = self.laws_for(&contexts, msf_trial);
                let trial = update_trial(&contexts, &laws, &committed, &delta_u);
                let (tangent, fint) =
                    assemble_tangent_and_internal(&contexts, &trial, &delta_u, ndof, &constraints)?;

                let mut residual = if is_safety {
                    &f0 - &fint
                } else {
                    &f0 + &dfext * (lambda + delta_lambda) - &fint
                };
                constraints.apply_to_residual(&mut residual);

                if predictor_done && residual.norm() <= self.settings.tolerance * ref_norm {
                    converged_at = Some(iteration);
                    committed = trial;
                    break;
                }
                if iteration == self.settings.max_iterations {
                    step_failed = true;
                    break;
                }

                let (factorization, _) = match self.backend.factorize(&tangent.to_triplets()) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(phase = %phase.id, "factorization failed: {e}");
                        step_failed = true;
                        break;
                    }
                };

                if !predictor_done {
                    // Predictor: size the increment along the tangent.
                    if load_controlled {
                        let l = control
                            .as_ref()
                            .map(|c| c.arc_length)
                            .unwrap_or(self.settings.initial_step_size);
                        delta_lambda = (lambda_max - lambda).min(l);
                    } else {
                        let Some(du_f) = factorization.solve(&dfext) else {
                            warn!(phase = %phase.id, "singular tangent in predictor");
                            step_failed = true;
                            break;
                        };
                        if control.is_none() {
                            // Initial arc length: the configured fraction
                            // of the reference action.
                            let reference =
                                (du_f.norm_squared() + psi2_f2).sqrt().max(1e-30);
                            control = Some(StepControl::new(
                                self.settings.initial_step_size * reference,
                                self.settings.min_desired_iterations,
                                self.settings.max_desired_iterations,
                            ));
                        }
                        let l = control.as_ref().map(|c| c.arc_length).unwrap_or(0.0);
                        delta_lambda = predictor_lambda(&du_f, psi2_f2, l, sign);
                        if lambda + delta_lambda > lambda_max {
                            // Land exactly on the target; finish the step
                            // under load control.
                            delta_lambda = lambda_max - lambda;
                            lock_lambda = true;
                        }
                        delta_u = &du_f * delta_lambda;
                    }
                    predictor_done = true;
                    continue;
                }

                // Corrector: two back-substitutions of one factorization.
                let Some(du_r) = factorization.solve(&residual) else {
                    warn!(phase = %phase.id, "singular tangent in corrector");
                    step_failed = true;
                    break;
                };
                if lock_lambda {
                    delta_u += &du_r;
                } else {
                    let Some(du_f) = factorization.solve(&dfext) else {
                        step_failed = true;
                        break;
                    };
                    let l = control.as_ref().map(|c| c.arc_length).unwrap_or(0.0);
                    match bordered_update(&delta_u, delta_lambda, &du_r, &du_f, psi2_f2, l) {
                        Some(update) => {
                            delta_u += &update.delta_u;
                            delta_lambda += update.delta_lambda;
                        }
                        None => {
                            // Bifurcation or turning point the spherical
                            // variant cannot negotiate; logged once so the
                            // operator can raise psi or change variants.
                            if !singular_logged {
                                warn!(
                                    phase = %phase.id,
                                    "arc-length bordered system singular; treating as step non-convergence"
                                );
                                singular_logged = true;
                            }
                            step_failed = true;
                            break;
                        }
                    }
                }
            }

            if let Some(iterations) = converged_at {
                lambda += delta_lambda;
                state.u += &delta_u;
                step += 1;
                halvings = 0;
                sign = if delta_lambda < 0.0 { -1.0 } else { 1.0 };
                let point = StepPoint {
                    step,
                    load_factor: if is_safety { 1.0 + lambda } else { lambda },
                    max_displacement: max_displacement(&state.u),
                };
                trace.push(point);
                sink.on_step_point(phase_index, point);
                if let Some(c) = control.as_mut() {
                    c.adapt(iterations.max(1));
                }
                debug!(
                    phase = %phase.id,
                    step,
                    lambda,
                    iterations,
                    "step converged"
                );
                continue;
            }

            if step_failed {
                halvings += 1;
                let can_retry = control
                    .as_mut()
                    .map(|c| c.halve())
                    .unwrap_or(false);
                if halvings > MAX_HALVINGS || !can_retry {
                    if is_safety {
                        // Soil failure reached: the last converged sum-Msf
                        // is the factor of safety.
                        break 'steps;
                    }
                    failure = Some(PhaseFailure {
                        step,
                        reason: FailureReason::StepHalvingExhausted,
                    });
                    break 'steps;
                }
                debug!(phase = %phase.id, halvings, "step halved");
            }
        }

        let reached = if is_safety { 1.0 + lambda } else { lambda };
        let success = failure.is_none();
        let safety_factor = if is_safety && success {
            Some(1.0 + lambda)
        } else {
            None
        };
        if is_safety && success && lambda >= lambda_max - 1e-12 {
            sink.on_log(&format!(
                "phase {}: no failure within the sum-Msf cap {:.2}",
                phase.id,
                1.0 + lambda_max
            ));
        }

        // Commit the converged state back into the branch.
        for (ctx, gp_state) in contexts.iter().zip(&committed) {
            state.gp[ctx.element_index] = Some(*gp_state);
        }

        let result = self.snapshot(
            phase,
            &contexts,
            &committed,
            &state,
            &constraints,
            trace,
            reached,
            safety_factor,
            success,
            failure,
        );
        Ok((result, state))
    }

    /// Strength-resolved laws for a trial sum-Msf (identity outside
    /// safety phases).
    fn laws_for(&self, contexts: &[ElementContext], msf: f64) -> Vec<MaterialLaw> {
        if (msf - 1.0).abs() < 1e-15 {
            contexts.iter().map(|c| c.law).collect()
        } else {
            contexts
                .iter()
                .map(|c| MaterialLaw::with_reduction(&c.material, msf))
                .collect()
        }
    }

    /// Build the phase result snapshot.
    #[allow(clippy::too_many_arguments)]
    fn snapshot(
        &self,
        phase: &Phase,
        contexts: &[ElementContext],
        committed: &[ElementGpState],
        state: &BranchState,
        constraints: &Constraints,
        step_points: Vec<StepPoint>,
        reached_load_factor: f64,
        safety_factor: Option<f64>,
        success: bool,
        failure: Option<PhaseFailure>,
    ) -> PhaseResult {
        let pwp_values: Vec<[f64; 3]> = committed
            .iter()
            .map(|gps| [gps[0].total_pwp(), gps[1].total_pwp(), gps[2].total_pwp()])
            .collect();
        let nodal_pwp = recover_nodal_scalar(self.mesh, contexts, &pwp_values);

        let nodal = self
            .mesh
            .nodes
            .iter()
            .map(|node| {
                let base = self.dof_map.base(node.id).unwrap_or(0);
                NodalResult {
                    node: node.id,
                    ux: state.u[base],
                    uy: state.u[base + 1],
                    pwp: nodal_pwp.get(&node.id).copied().unwrap_or(0.0),
                }
            })
            .collect();

        let mut gp_state = Vec::with_capacity(contexts.len() * 3);
        for (ctx, gps) in contexts.iter().zip(committed) {
            let element = self.mesh.elements[ctx.element_index].id;
            for (gp, s) in gps.iter().enumerate() {
                gp_state.push(GpResult {
                    element,
                    gp,
                    effective_stress: s.effective,
                    total_stress: s.total_stress(),
                    steady_pwp: s.steady_pwp,
                    excess_pwp: s.excess_pwp,
                    total_pwp: s.total_pwp(),
                    plastic_strain: s.plastic_strain,
                    yielded: s.yielded,
                });
            }
        }

        PhaseResult {
            phase: phase.id,
            success,
            failure,
            nodal,
            gp_state,
            step_points,
            reached_load_factor,
            safety_factor,
            floating_nodes: constraints.floating_nodes.clone(),
        }
    }
}

/// Compute trial integration-point states for a step displacement
/// increment. Parallel over elements; results are collected in element
/// order so the evaluation is deterministic.
fn update_trial(
    contexts: &[ElementContext],
    laws: &[MaterialLaw],
    committed: &[ElementGpState],
    delta_u: &DVector<f64>,
) -> Vec<ElementGpState> {
    contexts
        .par_iter()
        .zip(laws.par_iter())
        .zip(committed.par_iter())
        .map(|((ctx, law), base)| {
            let mut du_e = nalgebra::SVector::<f64, 12>::zeros();
            for (local, &dof) in ctx.dofs.iter().enumerate() {
                du_e[local] = delta_u[dof];
            }
            // Element geometry is validated at context construction;
            // strain evaluation cannot fail afterwards.
            let strains = ctx
                .kernel
                .strains(&du_e)
                .unwrap_or([nalgebra::Vector3::zeros(); 3]);
            let mut out = *base;
            for gp in 0..3 {
                let update = law.update(&base[gp].effective, strains[gp]);
                out[gp] = GpState {
                    effective: update.effective,
                    steady_pwp: base[gp].steady_pwp,
                    excess_pwp: base[gp].excess_pwp + update.excess_pwp_increment,
                    plastic_strain: base[gp].plastic_strain + update.plastic_increment,
                    yielded: update.yielded,
                    tangent: update.tangent,
                };
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use terra_model::{
        ElementId, LoadId, MaterialId, Node, NodeId, Phase, PhaseId, PolygonTag, Tri6,
    };

    /// One-element mesh on the unit right triangle with mid-side nodes.
    fn single_element_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        let coords = [
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.5, 0.0],
            [0.5, 0.5],
            [0.0, 0.5],
        ];
        for (i, c) in coords.iter().enumerate() {
            mesh.add_node(Node::new(NodeId(i as u32), c[0], c[1]));
        }
        mesh.add_element(
            Tri6::new(
                ElementId(0),
                [
                    NodeId(0),
                    NodeId(1),
                    NodeId(2),
                    NodeId(3),
                    NodeId(4),
                    NodeId(5),
                ],
                MaterialId(0),
            )
            .with_polygon(PolygonTag(0)),
        );
        mesh
    }

    fn weightless_elastic() -> MaterialSet {
        let mut set = MaterialSet::new();
        let mut m = Material::elastic(MaterialId(0), "elastic", 1.0e4, 0.3);
        m.gamma_sat = 0.0;
        m.gamma_unsat = 0.0;
        set.insert(m);
        set
    }

    fn plastic_settings() -> SolverSettings {
        SolverSettings {
            max_load_fraction: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn elastic_phase_converges_to_full_load() {
        let mesh = single_element_mesh();
        let materials = weightless_elastic();
        let loads = vec![Load::Point {
            id: LoadId(0),
            position: [0.5, 0.5],
            force: [100.0, 0.0],
        }];
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "load", PhaseKind::Plastic)
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();

        let driver = PhaseDriver::new(
            &mesh,
            &materials,
            &loads,
            &[],
            &tree,
            plastic_settings(),
        )
        .unwrap();
        let mut sink = RecordingSink::default();
        let outcome = driver.run(&mut sink, &CancelToken::new()).unwrap();

        assert!(outcome.all_successful);
        let result = &outcome.results[0];
        assert!(result.success);
        assert!((result.reached_load_factor - 1.0).abs() < 1e-9);
        assert!(!result.step_points.is_empty());
        // Step points arrive in monotonic order.
        for pair in result.step_points.windows(2) {
            assert!(pair[1].step > pair[0].step);
            assert!(pair[1].load_factor >= pair[0].load_factor);
        }
        assert_eq!(sink.finals, vec![true]);
    }

    #[test]
    fn determinism_across_reruns() {
        let mesh = single_element_mesh();
        let materials = weightless_elastic();
        let loads = vec![Load::Point {
            id: LoadId(0),
            position: [0.5, 0.5],
            force: [100.0, 0.0],
        }];
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "load", PhaseKind::Plastic)
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();

        let run = || {
            let driver = PhaseDriver::new(
                &mesh,
                &materials,
                &loads,
                &[],
                &tree,
                plastic_settings(),
            )
            .unwrap();
            driver
                .run(&mut crate::events::NullSink, &CancelToken::new())
                .unwrap()
        };
        let a = run();
        let b = run();
        // Bit-identical step points and nodal results.
        assert_eq!(a.results[0].step_points, b.results[0].step_points);
        assert_eq!(a.results[0].nodal, b.results[0].nodal);
    }

    #[test]
    fn cancellation_before_first_step() {
        let mesh = single_element_mesh();
        let materials = weightless_elastic();
        let loads = vec![Load::Point {
            id: LoadId(0),
            position: [0.5, 0.5],
            force: [100.0, 0.0],
        }];
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "load", PhaseKind::Plastic)
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();
        tree.push(
            Phase::new(PhaseId(1), "more", PhaseKind::Plastic)
                .with_parent(PhaseId(0))
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();

        let driver = PhaseDriver::new(
            &mesh,
            &materials,
            &loads,
            &[],
            &tree,
            plastic_settings(),
        )
        .unwrap();
        let token = CancelToken::new();
        token.cancel();
        let mut sink = RecordingSink::default();
        let outcome = driver.run(&mut sink, &token).unwrap();

        assert!(outcome.cancelled);
        // Only the first phase emitted a (cancelled) result.
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].success);
        assert_eq!(
            outcome.results[0].failure.unwrap().reason,
            FailureReason::Cancelled
        );
    }

    #[test]
    fn k0_phase_produces_geostatic_field() {
        let mesh = single_element_mesh();
        let mut materials = MaterialSet::new();
        materials.insert(
            Material::mohr_coulomb(MaterialId(0), "sand", 30_000.0, 0.3, 1.0, 30.0, 0.0)
                .with_unit_weights(20.0, 18.0)
                .with_k0(0.5),
        );
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "initial", PhaseKind::K0Procedure)
                .with_polygons([PolygonTag(0)]),
        )
        .unwrap();

        let driver = PhaseDriver::new(
            &mesh,
            &materials,
            &[],
            &[],
            &tree,
            SolverSettings::default(),
        )
        .unwrap();
        let outcome = driver
            .run(&mut crate::events::NullSink, &CancelToken::new())
            .unwrap();
        let result = &outcome.results[0];
        assert!(result.success);
        // Displacements are zero; stresses are compressive with the K0
        // ratio between horizontal and vertical.
        assert!(result.max_displacement() < 1e-15);
        for gp in &result.gp_state {
            assert!(gp.effective_stress.yy < 0.0);
            let ratio = gp.effective_stress.xx / gp.effective_stress.yy;
            assert!((ratio - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn reset_displacements_zeroes_u_keeps_stress() {
        let mesh = single_element_mesh();
        let materials = weightless_elastic();
        let loads = vec![Load::Point {
            id: LoadId(0),
            position: [0.5, 0.5],
            force: [100.0, 0.0],
        }];
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "load", PhaseKind::Plastic)
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();
        let mut follow = Phase::new(PhaseId(1), "hold", PhaseKind::Plastic)
            .with_parent(PhaseId(0))
            .with_polygons([PolygonTag(0)])
            .with_loads([LoadId(0)]);
        follow.reset_displacements = true;
        tree.push(follow).unwrap();

        let driver = PhaseDriver::new(
            &mesh,
            &materials,
            &loads,
            &[],
            &tree,
            plastic_settings(),
        )
        .unwrap();
        let outcome = driver
            .run(&mut crate::events::NullSink, &CancelToken::new())
            .unwrap();

        let loaded = &outcome.results[0];
        let held = &outcome.results[1];
        assert!(loaded.max_displacement() > 1e-6);
        // Same load, same state: the reset phase has nothing to drive, so
        // displacements stay at zero while stresses persist.
        assert!(held.max_displacement() < 1e-9);
        let sxx_loaded = loaded.gp_state[0].effective_stress.xx;
        let sxx_held = held.gp_state[0].effective_stress.xx;
        assert!((sxx_loaded - sxx_held).abs() < 1e-6 * sxx_loaded.abs().max(1.0));
        assert!(sxx_loaded.abs() > 1.0);
    }
}
