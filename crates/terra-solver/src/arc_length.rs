//! Arc-length continuation: spherical constraint, bordered update, and
//! adaptive step control.
//!
//! The corrector never forms the augmented (n+1) system. Each Newton
//! iteration solves two n-sized systems with the same factorization (the
//! residual column and the load column) and combines them at the scalar
//! level through the linearized constraint
//!
//!   g = |du|^2 + psi^2 |df|^2 dl^2 - l^2 = 0
//!
//! A vanishing constraint denominator marks a bifurcation or turning
//! point the current variant cannot negotiate; the caller treats it as
//! step non-convergence.

use nalgebra::DVector;

/// Scalar outcome of one bordered corrector update
#[derive(Debug, Clone)]
pub struct BorderedUpdate {
    /// Displacement sub-increment for this iteration
    pub delta_u: DVector<f64>,
    /// Load-factor sub-increment for this iteration
    pub delta_lambda: f64,
}

/// Linearized spherical-constraint update.
///
/// `accum_u` and `accum_lambda` are the accumulated increments of the
/// current step; `du_r` and `du_f` the residual and load solutions of the
/// current tangent; `psi2_f2` the scalar psi^2 |dfext|^2. Returns `None`
/// when the bordered system is singular.
pub fn bordered_update(
    accum_u: &DVector<f64>,
    accum_lambda: f64,
    du_r: &DVector<f64>,
    du_f: &DVector<f64>,
    psi2_f2: f64,
    arc_length: f64,
) -> Option<BorderedUpdate> {
    let g = accum_u.norm_squared() + psi2_f2 * accum_lambda * accum_lambda
        - arc_length * arc_length;
    let denom = 2.0 * accum_u.dot(du_f) + 2.0 * psi2_f2 * accum_lambda;
    let scale = accum_u.norm().max(arc_length).max(1e-30) * du_f.norm().max(1e-30);
    if denom.abs() <= 1e-12 * scale {
        return None;
    }
    let delta_lambda = -(g + 2.0 * accum_u.dot(du_r)) / denom;
    let delta_u = du_r + du_f * delta_lambda;
    Some(BorderedUpdate {
        delta_u,
        delta_lambda,
    })
}

/// Predictor load-factor increment for a fresh step of length
/// `arc_length`, following the sign of the previous converged increment.
pub fn predictor_lambda(du_f: &DVector<f64>, psi2_f2: f64, arc_length: f64, sign: f64) -> f64 {
    let denom = (du_f.norm_squared() + psi2_f2).sqrt().max(1e-30);
    sign * arc_length / denom
}

/// Adaptive step-length control shared by plastic and safety phases.
#[derive(Debug, Clone)]
pub struct StepControl {
    /// Current arc length
    pub arc_length: f64,
    /// Hard floor of the adaptation band
    pub floor: f64,
    /// Hard ceiling of the adaptation band
    pub ceiling: f64,
    min_desired: usize,
    max_desired: usize,
}

impl StepControl {
    /// Band limits relative to the initial arc length
    const FLOOR_FACTOR: f64 = 1e-3;
    const CEILING_FACTOR: f64 = 16.0;

    /// Create a controller starting from the given arc length
    pub fn new(initial: f64, min_desired: usize, max_desired: usize) -> Self {
        Self {
            arc_length: initial,
            floor: initial * Self::FLOOR_FACTOR,
            ceiling: initial * Self::CEILING_FACTOR,
            min_desired,
            max_desired,
        }
    }

    /// Adapt the arc length after a converged step that used
    /// `iterations` Newton iterations: grow for fast steps, shrink for
    /// slow ones, leave steps inside the desired band alone.
    pub fn adapt(&mut self, iterations: usize) {
        let iters = iterations.max(1);
        if iters <= self.min_desired || iters >= self.max_desired {
            let factor = (self.max_desired as f64 / iters as f64).sqrt();
            self.arc_length = (self.arc_length * factor).clamp(self.floor, self.ceiling);
        }
    }

    /// Halve the arc length after a failed step; `false` once the floor
    /// is reached and no further retry is worthwhile.
    pub fn halve(&mut self) -> bool {
        let halved = self.arc_length * 0.5;
        if halved < self.floor {
            return false;
        }
        self.arc_length = halved;
        true
    }

    /// Whether the controller has shrunk to its floor
    pub fn at_floor(&self) -> bool {
        self.arc_length <= self.floor * (1.0 + 1e-12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_scales_with_arc_length() {
        let du_f = DVector::from_vec(vec![3.0, 4.0]); // norm 5
        let lambda = predictor_lambda(&du_f, 0.0, 0.5, 1.0);
        assert!((lambda - 0.1).abs() < 1e-12);
        let reversed = predictor_lambda(&du_f, 0.0, 0.5, -1.0);
        assert!((reversed + 0.1).abs() < 1e-12);
    }

    #[test]
    fn predictor_with_load_scaling() {
        let du_f = DVector::from_vec(vec![0.0, 0.0]);
        // Pure load control limit: psi^2 |f|^2 = 4 gives dl = l / 2.
        let lambda = predictor_lambda(&du_f, 4.0, 1.0, 1.0);
        assert!((lambda - 0.5).abs() < 1e-12);
    }

    #[test]
    fn converged_update_satisfies_constraint() {
        // One-dimensional system: K = 2, dfext = 1, no residual.
        // Start from the predictor and verify the constraint after one
        // bordered update.
        let du_f = DVector::from_vec(vec![0.5]); // K^-1 * dfext
        let l = 0.2;
        let dl0 = predictor_lambda(&du_f, 0.0, l, 1.0);
        let u0 = &du_f * dl0;

        // Perturb the accumulated state away from the constraint.
        let u_perturbed = &u0 * 1.2;
        let update = bordered_update(
            &u_perturbed,
            dl0 * 1.2,
            &DVector::from_vec(vec![0.0]),
            &du_f,
            0.0,
            l,
        )
        .unwrap();
        let mut u_new = &u_perturbed + &update.delta_u;
        let mut lambda_new = dl0 * 1.2 + update.delta_lambda;
        // The linearized constraint converges over the iterations; a
        // second update drives it well below the step tolerance.
        let update2 = bordered_update(
            &u_new,
            lambda_new,
            &DVector::from_vec(vec![0.0]),
            &du_f,
            0.0,
            l,
        )
        .unwrap();
        u_new += &update2.delta_u;
        lambda_new += update2.delta_lambda;
        let g = u_new.norm_squared() - l * l;
        assert!(g.abs() < 1e-4, "constraint residual {g}");
        assert!((u_new[0] - du_f[0] * lambda_new).abs() < 1e-12);
    }

    #[test]
    fn singular_bordered_system_is_detected() {
        // Accumulated increment orthogonal to the load column with psi=0
        // makes the denominator vanish.
        let accum = DVector::from_vec(vec![1.0, 0.0]);
        let du_f = DVector::from_vec(vec![0.0, 1.0]);
        let du_r = DVector::from_vec(vec![0.1, 0.1]);
        assert!(bordered_update(&accum, 0.3, &du_r, &du_f, 0.0, 0.5).is_none());
    }

    #[test]
    fn step_control_grows_on_fast_convergence() {
        let mut control = StepControl::new(0.05, 3, 15);
        control.adapt(2);
        let expected = 0.05 * (15.0f64 / 2.0).sqrt();
        assert!((control.arc_length - expected).abs() < 1e-12);
    }

    #[test]
    fn step_control_shrinks_on_slow_convergence() {
        let mut control = StepControl::new(0.05, 3, 15);
        control.adapt(20);
        let expected = 0.05 * (15.0f64 / 20.0).sqrt();
        assert!((control.arc_length - expected).abs() < 1e-12);
    }

    #[test]
    fn step_control_leaves_band_interior_alone() {
        let mut control = StepControl::new(0.05, 3, 15);
        control.adapt(8);
        assert_eq!(control.arc_length, 0.05);
    }

    #[test]
    fn step_control_clamps_to_band() {
        let mut control = StepControl::new(0.05, 3, 15);
        for _ in 0..50 {
            control.adapt(1);
        }
        assert!(control.arc_length <= control.ceiling + 1e-15);
    }

    #[test]
    fn halving_stops_at_floor() {
        let mut control = StepControl::new(0.05, 3, 15);
        let mut halvings = 0;
        while control.halve() {
            halvings += 1;
            assert!(halvings < 100);
        }
        assert!(control.at_floor() || control.arc_length < 0.05);
        assert!(control.arc_length >= control.floor);
    }
}
