//! Solver settings recognized by the phase driver.

use serde::{Deserialize, Serialize};

/// Solver settings with the documented defaults. All fields are optional
/// in the project file; absent fields take the defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Relative residual norm for step convergence
    pub tolerance: f64,
    /// Newton iterations per step before the step fails
    pub max_iterations: usize,
    /// Lower edge of the step-size adaptation band
    pub min_desired_iterations: usize,
    /// Upper edge of the step-size adaptation band
    pub max_desired_iterations: usize,
    /// Initial arc length as a fraction of the phase's reference action
    pub initial_step_size: f64,
    /// Cap on the load factor of a Plastic phase
    pub max_load_fraction: f64,
    /// Total step budget per phase
    pub max_steps: usize,
    /// Arc-length load scaling parameter (0 = cylindrical constraint)
    pub arc_length_psi: f64,
    /// Cap on the strength-reduction factor in a safety analysis
    pub max_safety_factor: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_iterations: 60,
            min_desired_iterations: 3,
            max_desired_iterations: 15,
            initial_step_size: 0.05,
            max_load_fraction: 0.5,
            max_steps: 100,
            arc_length_psi: 0.0,
            max_safety_factor: 10.0,
        }
    }
}

impl SolverSettings {
    /// Validate ranges; garbage settings are rejected before any solve.
    pub fn validate(&self) -> Result<(), String> {
        if self.tolerance <= 0.0 {
            return Err("tolerance must be positive".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        if self.min_desired_iterations > self.max_desired_iterations {
            return Err("min_desired_iterations exceeds max_desired_iterations".to_string());
        }
        if self.initial_step_size <= 0.0 {
            return Err("initial_step_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_load_fraction) {
            return Err("max_load_fraction must lie in [0, 1]".to_string());
        }
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".to_string());
        }
        if self.max_safety_factor <= 1.0 {
            return Err("max_safety_factor must exceed 1".to_string());
        }
        Ok(())
    }
}
