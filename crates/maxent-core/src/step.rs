// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Step Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Step computation inside the three-dimensional search subspace.
//!
//! For an entropy weight `alpha` in [0, 1] the restricted problem
//! `max alpha*S(beta) - (1 - alpha)*C(beta)` has the stationary point
//! `((1-alpha) C2 - alpha S2) beta = -((1-alpha) C1 - alpha S1)`.
//! The weight is bisected until the predicted chi-squared hits the current
//! target, then the step is clipped to the trust region.

use maxent_math::linalg::{solve_symmetric_truncated, DEFAULT_EIGEN_CUTOFF};
use maxent_types::constants::{
    FACFAKE_MAX, FACFAKE_MIN, FACTOR_MAX, FACTOR_MIN, SUBSPACE_DIM,
};
use maxent_types::state::{ControlState, QuadraticModel};
use ndarray::{Array1, Array2};

const BISECTION_TOL: f64 = 1e-3;
const MAX_BISECTIONS: usize = 64;

const RATIO_GOOD_LOW: f64 = 0.75;
const RATIO_GOOD_HIGH: f64 = 1.25;
const RATIO_POOR_LOW: f64 = 0.25;
const RATIO_POOR_HIGH: f64 = 2.0;
const FACTOR_GROWTH: f64 = 1.5;
const FACFAKE_GROWTH: f64 = 1.25;
const SHRINK: f64 = 0.5;

/// Predicted changes smaller than this (relative to chisq) carry no
/// information about model quality.
const MIN_PREDICTED_CHANGE: f64 = 1e-12;

/// Result of one steady-state step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub beta: [f64; SUBSPACE_DIM],
    /// Chi-squared target for this step.
    pub chtarg: f64,
    /// Entropy weight chosen by the bisection.
    pub multiplier: f64,
    /// Chi-squared predicted by the quadratic model for `beta`.
    pub predicted_chisq: f64,
    pub factor: f64,
    pub facfake: f64,
    /// Eigen-directions of the restricted form that received no motion.
    pub dropped_directions: usize,
    /// True when the trust region shortened the step.
    pub clipped: bool,
}

/// Stationary point of the restricted problem for one entropy weight.
#[derive(Debug, Clone, Copy)]
struct Restricted {
    beta: [f64; SUBSPACE_DIM],
    chi_ratio: f64,
    dropped: usize,
}

/// Multiplier search with trust-region control.
#[derive(Debug, Clone, Copy)]
pub struct StepSolver {
    pub bisection_tol: f64,
    pub max_bisections: usize,
    pub eigen_cutoff: f64,
}

impl Default for StepSolver {
    fn default() -> Self {
        StepSolver {
            bisection_tol: BISECTION_TOL,
            max_bisections: MAX_BISECTIONS,
            eigen_cutoff: DEFAULT_EIGEN_CUTOFF,
        }
    }
}

impl StepSolver {
    /// Compute the steady-state step.
    ///
    /// `control` supplies chisq, chizer, the persisted scales and the previous
    /// prediction; `flux` is the current total flux and `blank` the
    /// default-model level, which together set the trust-region radius.
    pub fn solve(
        &self,
        model: &QuadraticModel,
        control: &ControlState,
        flux: f64,
        blank: f64,
    ) -> StepOutcome {
        let (factor, facfake) = adapt_scales(control);
        let chisq = control.chisq;

        let cmin = self.restricted(model, 0.0).chi_ratio;
        let ctarg = chi_target_ratio(cmin, chisq, control.chizer, facfake);

        let (multiplier, mut best) = self.search_multiplier(model, cmin, ctarg);

        let radius = factor * flux / blank;
        let distance = model.entropy_distance(&best.beta);
        let mut clipped = false;
        if distance.is_finite() && radius.is_finite() && distance > radius && distance > 0.0 {
            let scale = (radius / distance).sqrt();
            for b in best.beta.iter_mut() {
                *b *= scale;
            }
            clipped = true;
        }

        StepOutcome {
            beta: best.beta,
            chtarg: ctarg * chisq,
            multiplier,
            predicted_chisq: model.chi_ratio(&best.beta) * chisq,
            factor,
            facfake,
            dropped_directions: best.dropped,
            clipped,
        }
    }

    /// Bisection on the entropy weight for `chi_ratio(alpha) == ctarg`.
    fn search_multiplier(
        &self,
        model: &QuadraticModel,
        cmin: f64,
        ctarg: f64,
    ) -> (f64, Restricted) {
        let lo = self.restricted(model, 0.0);
        let hi = self.restricted(model, 1.0);
        let mut f1 = cmin - ctarg;
        let f2 = hi.chi_ratio - ctarg;

        if !(f1 < 0.0 && f1.is_finite()) {
            return (0.0, lo);
        }
        if f2 <= 0.0 || !f2.is_finite() {
            return (1.0, hi);
        }

        let (mut a1, mut a2) = (0.0, 1.0);
        let mut mid = lo;
        let mut alpha = 0.0;
        for _ in 0..self.max_bisections {
            alpha = 0.5 * (a1 + a2);
            mid = self.restricted(model, alpha);
            let fx = mid.chi_ratio - ctarg;
            if fx.abs() < self.bisection_tol {
                break;
            }
            if f1 * fx > 0.0 {
                a1 = alpha;
                f1 = fx;
            } else {
                a2 = alpha;
            }
        }
        (alpha, mid)
    }

    fn restricted(&self, model: &QuadraticModel, alpha: f64) -> Restricted {
        let w = 1.0 - alpha;
        let mut a = Array2::zeros((SUBSPACE_DIM, SUBSPACE_DIM));
        let mut b = Array1::zeros(SUBSPACE_DIM);
        for i in 0..SUBSPACE_DIM {
            b[i] = -(w * model.c1[i] - alpha * model.s1[i]);
            for k in 0..SUBSPACE_DIM {
                a[[i, k]] = w * model.c2[i][k] - alpha * model.s2[i][k];
            }
        }
        let sol = solve_symmetric_truncated(&a, b.view(), self.eigen_cutoff);
        let mut beta = [0.0; SUBSPACE_DIM];
        for (dst, src) in beta.iter_mut().zip(sol.x.iter()) {
            *dst = *src;
        }
        Restricted {
            beta,
            chi_ratio: model.chi_ratio(&beta),
            dropped: sol.dropped,
        }
    }
}

/// Target for the normalised chi-squared of this step.
///
/// While the statistically expected value is out of reach, pursue the
/// fraction `facfake` of the attainable reduction; once it is reachable,
/// aim straight at it.
pub fn chi_target_ratio(cmin: f64, chisq: f64, chizer: f64, facfake: f64) -> f64 {
    if cmin * chisq > chizer {
        1.0 - facfake * (1.0 - cmin)
    } else {
        chizer / chisq
    }
}

/// Trust-region scales adapted from how well the previous step's
/// predicted chi-squared matched the observed one.
pub fn adapt_scales(control: &ControlState) -> (f64, f64) {
    let (factor, facfake) = (control.factor, control.facfake);
    let Some(prev) = control.last_prediction else {
        return (factor, facfake);
    };
    let expected = prev.predicted - prev.from;
    let actual = control.chisq - prev.from;
    if !expected.is_finite()
        || !actual.is_finite()
        || expected.abs() <= MIN_PREDICTED_CHANGE * prev.from.abs().max(1.0)
    {
        return (factor, facfake);
    }

    let ratio = actual / expected;
    if (RATIO_GOOD_LOW..=RATIO_GOOD_HIGH).contains(&ratio) {
        (
            (factor * FACTOR_GROWTH).min(FACTOR_MAX.max(factor)),
            (facfake * FACFAKE_GROWTH).min(FACFAKE_MAX.max(facfake)),
        )
    } else if ratio < RATIO_POOR_LOW || ratio > RATIO_POOR_HIGH {
        (
            (factor * SHRINK).max(FACTOR_MIN),
            (facfake * SHRINK).max(FACFAKE_MIN),
        )
    } else {
        (factor, facfake)
    }
}

/// First-iteration step: half a Newton step along the chi direction.
///
/// Returns `None` when the chi curvature along that direction is not
/// positive, in which case the caller takes no step.
pub fn bootstrap_step(model: &QuadraticModel) -> Option<[f64; SUBSPACE_DIM]> {
    let curvature = model.c2[0][0];
    let beta0 = -0.5 * model.c1[0] / curvature;
    if curvature > 0.0 && beta0.is_finite() {
        Some([beta0, 0.0, 0.0])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maxent_types::state::ChiPrediction;

    /// Diagonal model: chi falls along direction 0, entropy falls along all.
    fn diagonal_model() -> QuadraticModel {
        QuadraticModel {
            s1: [0.0, 0.2, 0.0],
            c1: [-1.0, 0.0, 0.0],
            s2: [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]],
            c2: [[1.0, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 0.25]],
        }
    }

    fn control(chisq: f64, chizer: f64) -> ControlState {
        let mut c = ControlState::new(chizer, 10.0, 0.5);
        c.chisq = chisq;
        c.iteration = 3;
        c
    }

    #[test]
    fn test_bootstrap_step_is_half_newton() {
        let model = diagonal_model();
        let beta = bootstrap_step(&model).unwrap();
        assert!((beta[0] - 0.5).abs() < 1e-15);
        assert_eq!(beta[1], 0.0);
        assert_eq!(beta[2], 0.0);
    }

    #[test]
    fn test_bootstrap_step_rejects_flat_curvature() {
        let mut model = diagonal_model();
        model.c2[0][0] = 0.0;
        assert!(bootstrap_step(&model).is_none());
        model.c2[0][0] = -1.0;
        assert!(bootstrap_step(&model).is_none());
    }

    #[test]
    fn test_target_halfway_when_unreachable() {
        // cmin = 0.5 -> target 0.75 with facfake = 0.5.
        let t = chi_target_ratio(0.5, 100.0, 10.0, 0.5);
        assert!((t - 0.75).abs() < 1e-15);
    }

    #[test]
    fn test_target_exact_when_reachable() {
        let t = chi_target_ratio(0.5, 100.0, 60.0, 0.5);
        assert!((t - 0.6).abs() < 1e-15);
    }

    #[test]
    fn test_step_hits_target_chi() {
        let solver = StepSolver::default();
        let model = diagonal_model();
        // cmin = 0.5 (beta0 = 1); reachable target 0.6.
        let out = solver.solve(&model, &control(100.0, 60.0), 1e6, 1.0);
        assert!((out.chtarg - 60.0).abs() < 1e-9);
        assert!(!out.clipped);
        let ratio = model.chi_ratio(&out.beta);
        assert!((ratio - 0.6).abs() < 2e-3, "ratio {ratio}");
        assert!(out.multiplier > 0.0 && out.multiplier < 1.0);
        assert!((out.predicted_chisq - ratio * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_moves_toward_chizer() {
        let solver = StepSolver::default();
        let model = diagonal_model();
        for &(chisq, chizer) in &[(100.0, 10.0), (100.0, 60.0), (100.0, 99.0), (50.0, 80.0)] {
            let out = solver.solve(&model, &control(chisq, chizer), 1e6, 1.0);
            assert!(
                (out.chtarg - chizer).abs() <= (chisq - chizer).abs() + 1e-9,
                "chtarg {} moved away from chizer {chizer} (chisq {chisq})",
                out.chtarg
            );
        }
    }

    #[test]
    fn test_trust_region_clips_step() {
        let solver = StepSolver::default();
        let model = diagonal_model();
        let out = solver.solve(&model, &control(100.0, 10.0), 0.001, 1.0);
        assert!(out.clipped);
        // radius = factor * flux / blank = 10 * 0.001
        assert!((model.entropy_distance(&out.beta) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_chi_form_falls_back() {
        let solver = StepSolver::default();
        let model = QuadraticModel {
            s1: [0.0; 3],
            c1: [-1.0, 0.0, 0.0],
            s2: [[0.0; 3]; 3],
            c2: [[0.0; 3]; 3],
        };
        let out = solver.solve(&model, &control(100.0, 10.0), 1.0, 1.0);
        assert_eq!(out.dropped_directions, 3);
        assert_eq!(out.beta, [0.0; 3]);
        assert!(out.chtarg.is_finite());
    }

    #[test]
    fn test_nan_model_yields_zero_step() {
        let solver = StepSolver::default();
        let mut model = diagonal_model();
        model.c2[1][1] = f64::NAN;
        let out = solver.solve(&model, &control(100.0, 10.0), 1.0, 1.0);
        assert!(out.beta.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_scales_grow_on_good_prediction() {
        let mut c = control(80.0, 10.0);
        c.factor = 0.1;
        c.facfake = 0.4;
        c.last_prediction = Some(ChiPrediction {
            from: 100.0,
            predicted: 79.0,
        });
        let (factor, facfake) = adapt_scales(&c);
        assert!((factor - 0.15).abs() < 1e-12);
        assert!((facfake - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_scales_shrink_on_poor_prediction() {
        let mut c = control(99.0, 10.0);
        c.factor = 0.1;
        c.facfake = 0.5;
        c.last_prediction = Some(ChiPrediction {
            from: 100.0,
            predicted: 50.0,
        });
        let (factor, facfake) = adapt_scales(&c);
        assert!((factor - 0.05).abs() < 1e-12);
        assert!((facfake - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_scales_unchanged_without_prediction() {
        let mut c = control(99.0, 10.0);
        c.factor = 0.2;
        c.facfake = 0.3;
        assert_eq!(adapt_scales(&c), (0.2, 0.3));
    }

    #[test]
    fn test_scales_respect_bounds() {
        let mut c = control(90.0, 10.0);
        c.factor = FACTOR_MAX;
        c.facfake = FACFAKE_MAX;
        c.last_prediction = Some(ChiPrediction {
            from: 100.0,
            predicted: 90.0,
        });
        assert_eq!(adapt_scales(&c), (FACTOR_MAX, FACFAKE_MAX));

        c.factor = FACTOR_MIN;
        c.facfake = FACFAKE_MIN;
        c.chisq = 130.0;
        assert_eq!(adapt_scales(&c), (FACTOR_MIN, FACFAKE_MIN));
    }
}
