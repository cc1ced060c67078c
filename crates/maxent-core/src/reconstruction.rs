// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Reconstruction Loop
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Maximum-entropy reconstruction loop.
//!
//! Each iteration is a pure function of the [`ReconstructionState`] it is
//! handed and the read-only problem, so independent reconstructions share
//! nothing and may run on separate threads.
//!
//! The first iteration (bootstrap) takes half a Newton step along the chi
//! direction; every later iteration (steady state) runs the multiplier
//! search of [`StepSolver`] inside the trust region.

use crate::observer::{NullObserver, Progress, ReconstructionObserver};
use crate::operator::LinearOperator;
use crate::projector::{normalise_above_floor, SubspaceProjector};
use crate::step::{bootstrap_step, StepSolver};
use crate::subspace::{Evaluation, SearchSpace};
use maxent_types::config::MaxEntConfig;
use maxent_types::constants::SUBSPACE_DIM;
use maxent_types::error::{MaxEntError, MaxEntResult};
use maxent_types::state::{
    ChiPrediction, Continuation, ControlState, IterationRecord, MaxEntOutput, MaxEntProblem,
    NumericWarning, Phase, ReconstructionState, Termination,
};
use ndarray::{Array1, ArrayView1};

/// Record and warnings produced by a single iteration.
#[derive(Debug, Clone)]
pub struct IterationStep {
    pub record: IterationRecord,
    pub warnings: Vec<NumericWarning>,
}

/// Validated reconstruction of one problem with one instrument operator.
pub struct MaxEntEngine<'a, O: LinearOperator + ?Sized> {
    problem: &'a MaxEntProblem,
    config: MaxEntConfig,
    space: SearchSpace<'a, O>,
    solver: StepSolver,
    blank: f64,
    floor: f64,
}

impl<'a, O: LinearOperator + ?Sized> MaxEntEngine<'a, O> {
    /// Validate inputs and configuration. This is the only place a
    /// reconstruction can fail.
    pub fn new(operator: &'a O, problem: &'a MaxEntProblem, config: MaxEntConfig) -> MaxEntResult<Self> {
        config.validate()?;
        problem.validate(config.admit_zero_base)?;

        if operator.spectrum_len() != problem.n_bins() {
            return Err(MaxEntError::ShapeMismatch {
                what: "operator spectrum length",
                expected: vec![problem.n_bins()],
                found: vec![operator.spectrum_len()],
            });
        }
        let (n_t, n_g) = operator.data_shape();
        if (n_t, n_g) != problem.data_shape() {
            let (d_t, d_g) = problem.data_shape();
            return Err(MaxEntError::ShapeMismatch {
                what: "operator data shape",
                expected: vec![d_t, d_g],
                found: vec![n_t, n_g],
            });
        }

        let blank = config.blank.unwrap_or_else(|| problem.mean_base());
        if !blank.is_finite() || blank <= 0.0 {
            return Err(MaxEntError::Config(format!(
                "default-model level must be finite and > 0, got {blank}"
            )));
        }

        let space = SearchSpace::new(
            operator,
            problem.datum().view(),
            problem.sigma().view(),
            problem.base().view(),
            blank,
            SubspaceProjector::from_preserve_flux(config.preserve_flux),
        );

        Ok(MaxEntEngine {
            problem,
            floor: config.positivity_fraction * blank,
            config,
            space,
            solver: StepSolver::default(),
            blank,
        })
    }

    pub fn with_step_solver(mut self, solver: StepSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn config(&self) -> &MaxEntConfig {
        &self.config
    }

    pub fn blank(&self) -> f64 {
        self.blank
    }

    /// Lowest value any spectrum bin may take after an update.
    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn chizer(&self) -> f64 {
        self.problem.chizer()
    }

    /// Starting state: the continuation spectrum and scales when given,
    /// otherwise the default model with the configured scales.
    pub fn initial_state(&self, continuation: Option<&Continuation>) -> MaxEntResult<ReconstructionState> {
        let chizer = self.chizer();
        match continuation {
            None => Ok(ReconstructionState {
                spectrum: self.problem.base().clone(),
                control: ControlState::new(
                    chizer,
                    self.config.initial_factor,
                    self.config.initial_facfake,
                ),
            }),
            Some(prior) => {
                if prior.spectrum.len() != self.problem.n_bins() {
                    return Err(MaxEntError::ShapeMismatch {
                        what: "continuation spectrum",
                        expected: vec![self.problem.n_bins()],
                        found: vec![prior.spectrum.len()],
                    });
                }
                for (index, &value) in prior.spectrum.iter().enumerate() {
                    if !value.is_finite() {
                        return Err(MaxEntError::NonFinite {
                            what: "continuation spectrum",
                            index,
                            value,
                        });
                    }
                    if value < 0.0 {
                        return Err(MaxEntError::NonPositive {
                            what: "continuation spectrum",
                            index,
                            value,
                        });
                    }
                }
                for (name, value) in [("factor", prior.factor), ("facfake", prior.facfake)] {
                    if !value.is_finite() || value <= 0.0 {
                        return Err(MaxEntError::Config(format!(
                            "continuation {name} must be finite and > 0, got {value}"
                        )));
                    }
                }
                Ok(ReconstructionState {
                    spectrum: prior.spectrum.clone(),
                    control: ControlState::new(chizer, prior.factor, prior.facfake),
                })
            }
        }
    }

    /// Run one iteration: evaluate, step, update the spectrum.
    pub fn iterate(&self, state: ReconstructionState) -> (ReconstructionState, IterationStep) {
        let ReconstructionState {
            spectrum,
            mut control,
        } = state;
        let iteration = control.iteration;
        let phase = Phase::for_iteration(iteration);

        let ev = self.space.evaluate(spectrum.view(), phase, iteration);
        let mut warnings = ev.warnings.clone();
        control.chisq = ev.chisq;
        control.test = ev.test;

        let (beta, multiplier) = match phase {
            Phase::Bootstrap => self.bootstrap(&ev, &mut control, &mut warnings),
            Phase::SteadyState => self.steady_state(&ev, &mut control, &mut warnings),
        };

        let spectrum = self.advance(spectrum, &ev, &beta, iteration, &mut warnings);
        control.iteration += 1;

        let record = IterationRecord {
            iteration,
            phase,
            test: ev.test,
            entropy: ev.entropy,
            chtarg: control.chtarg,
            chisq: ev.chisq,
            flux: ev.flux,
            beta,
            model: ev.model,
            multiplier,
        };
        (
            ReconstructionState { spectrum, control },
            IterationStep { record, warnings },
        )
    }

    /// Newton step along the chi direction; no trust region exists yet.
    fn bootstrap(
        &self,
        ev: &Evaluation,
        control: &mut ControlState,
        warnings: &mut Vec<NumericWarning>,
    ) -> ([f64; SUBSPACE_DIM], f64) {
        let beta = match bootstrap_step(&ev.model) {
            Some(beta) => beta,
            None => {
                log::warn!(
                    "maxent: chi curvature {} along the chi direction is not positive; no bootstrap step",
                    ev.model.c2[0][0]
                );
                warnings.push(NumericWarning::Degenerate {
                    iteration: control.iteration,
                    dropped_directions: 1,
                });
                [0.0; SUBSPACE_DIM]
            }
        };
        control.chtarg = ev.chisq;
        control.last_prediction = Some(ChiPrediction {
            from: ev.chisq,
            predicted: ev.model.chi_ratio(&beta) * ev.chisq,
        });
        (beta, 0.0)
    }

    fn steady_state(
        &self,
        ev: &Evaluation,
        control: &mut ControlState,
        warnings: &mut Vec<NumericWarning>,
    ) -> ([f64; SUBSPACE_DIM], f64) {
        let out = self.solver.solve(&ev.model, control, ev.flux, self.blank);
        if out.dropped_directions > 0 {
            log::warn!(
                "maxent: restricted quadratic form degenerate in {} direction(s) at iteration {}",
                out.dropped_directions,
                control.iteration
            );
            warnings.push(NumericWarning::Degenerate {
                iteration: control.iteration,
                dropped_directions: out.dropped_directions,
            });
        }
        control.factor = out.factor;
        control.facfake = out.facfake;
        control.chtarg = out.chtarg;
        control.last_prediction = Some(ChiPrediction {
            from: ev.chisq,
            predicted: out.predicted_chisq,
        });
        (out.beta, out.multiplier)
    }

    /// `F + XI beta`, floored, and brought back to unit flux without
    /// undercutting the floor when flux is preserved.
    fn advance(
        &self,
        spectrum: Array1<f64>,
        ev: &Evaluation,
        beta: &[f64; SUBSPACE_DIM],
        iteration: usize,
        warnings: &mut Vec<NumericWarning>,
    ) -> Array1<f64> {
        let step = ev.xi.dot(&ArrayView1::from(&beta[..]));
        let floor = self.floor;
        let mut f = spectrum + &step;
        f.mapv_inplace(|v| if v >= floor { v } else { floor });
        if self.config.preserve_flux && !normalise_above_floor(f.view_mut(), floor) {
            log::warn!(
                "maxent: floor {:.3e} over {} bins leaves no unit-flux spectrum; using uniform",
                floor,
                f.len()
            );
            warnings.push(NumericWarning::FloorInfeasible {
                iteration,
                n_bins: f.len(),
                floor,
            });
        }
        f
    }

    fn is_converged(&self, control: &ControlState) -> bool {
        control.iteration > 1
            && control.test < self.config.test_tolerance
            && (control.chisq / control.chizer - 1.0).abs() < self.config.chi_tolerance
    }

    /// Iterate until convergence, the iteration cap, or cancellation.
    pub fn run<Obs: ReconstructionObserver + ?Sized>(
        &self,
        continuation: Option<&Continuation>,
        observer: &mut Obs,
    ) -> MaxEntResult<MaxEntOutput> {
        let mut state = self.initial_state(continuation)?;
        let mut history = Vec::new();
        let mut warnings = Vec::new();

        let termination = loop {
            let (next, step) = self.iterate(state);
            state = next;
            warnings.extend(step.warnings);
            let progress = observer.on_iteration(&step.record);
            history.push(step.record);

            if self.is_converged(&state.control) {
                break Termination::Converged;
            }
            if state.control.iteration >= self.config.max_iterations {
                break Termination::MaxIterReached;
            }
            if progress == Progress::Cancel {
                break Termination::Cancelled;
            }
        };

        let control = state.control;
        log::info!(
            "maxent: {:?} after {} iteration(s), chisq/chizer = {:.4}, test = {:.3e}",
            termination,
            control.iteration,
            control.chisq / control.chizer,
            control.test
        );

        Ok(MaxEntOutput {
            spectrum: state.spectrum,
            iterations: control.iteration,
            termination,
            chisq: control.chisq,
            chizer: control.chizer,
            test: control.test,
            factor: control.factor,
            facfake: control.facfake,
            sigma: self.problem.sigma().clone(),
            base: self.problem.base().clone(),
            history,
            warnings,
        })
    }
}

/// Reconstruct from the default model with no observer.
pub fn reconstruct<O: LinearOperator + ?Sized>(
    operator: &O,
    problem: &MaxEntProblem,
    config: MaxEntConfig,
) -> MaxEntResult<MaxEntOutput> {
    MaxEntEngine::new(operator, problem, config)?.run(None, &mut NullObserver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::MatrixOperator;
    use ndarray::Array2;

    fn blur(n: usize, width: f64) -> MatrixOperator {
        let response = Array2::from_shape_fn((n, n), |(i, j)| {
            let d = (i as f64 - j as f64) / width;
            (-0.5 * d * d).exp()
        });
        MatrixOperator::single_group(response).unwrap()
    }

    fn problem(op: &MatrixOperator, sigma: f64) -> MaxEntProblem {
        let n = op.spectrum_len();
        let truth = Array1::from_shape_fn(n, |i| {
            let d = (i as f64 - n as f64 / 2.0) / 2.0;
            0.2 + 3.0 * (-0.5 * d * d).exp()
        });
        let datum = op.forward(truth.view());
        MaxEntProblem::new(
            datum.clone(),
            Array2::from_elem(datum.dim(), sigma),
            Array1::from_elem(n, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_operator_shape_mismatch() {
        let op = blur(10, 1.5);
        let p = problem(&blur(12, 1.5), 0.1);
        let err = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).err().unwrap();
        assert!(matches!(err, MaxEntError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let op = blur(10, 1.5);
        let p = problem(&op, 0.1);
        let cfg = MaxEntConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            MaxEntEngine::new(&op, &p, cfg).err().unwrap(),
            MaxEntError::Config(_)
        ));
    }

    #[test]
    fn test_blank_defaults_to_mean_and_accepts_override() {
        let op = blur(10, 1.5);
        let p = problem(&op, 0.1);
        let engine = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).unwrap();
        assert!((engine.blank() - 1.0).abs() < 1e-15);
        assert!((engine.floor() - 1e-3).abs() < 1e-15);

        let cfg = MaxEntConfig {
            blank: Some(0.5),
            ..Default::default()
        };
        let engine = MaxEntEngine::new(&op, &p, cfg).unwrap();
        assert!((engine.blank() - 0.5).abs() < 1e-15);
        assert!((engine.floor() - 5e-4).abs() < 1e-15);
    }

    #[test]
    fn test_initial_state_defaults_to_base() {
        let op = blur(10, 1.5);
        let p = problem(&op, 0.1);
        let engine = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).unwrap();
        let s = engine.initial_state(None).unwrap();
        assert_eq!(&s.spectrum, p.base());
        assert_eq!(s.control.iteration, 0);
        assert!((s.control.chizer - 10.0).abs() < 1e-15);
        assert!((s.control.factor - 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_initial_state_from_continuation() {
        let op = blur(10, 1.5);
        let p = problem(&op, 0.1);
        let engine = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).unwrap();
        let prior = Continuation {
            spectrum: Array1::from_elem(10, 0.7),
            factor: 0.3,
            facfake: 0.2,
        };
        let s = engine.initial_state(Some(&prior)).unwrap();
        assert_eq!(s.spectrum, prior.spectrum);
        assert_eq!(s.control.factor, 0.3);
        assert_eq!(s.control.facfake, 0.2);

        let bad = Continuation {
            spectrum: Array1::from_elem(9, 0.7),
            factor: 0.3,
            facfake: 0.2,
        };
        assert!(engine.initial_state(Some(&bad)).is_err());

        let bad = Continuation {
            spectrum: Array1::from_elem(10, 0.7),
            factor: 0.0,
            facfake: 0.2,
        };
        assert!(engine.initial_state(Some(&bad)).is_err());
    }

    #[test]
    fn test_iterate_advances_state_and_phase() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let engine = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).unwrap();
        let s0 = engine.initial_state(None).unwrap();

        let (s1, step1) = engine.iterate(s0);
        assert_eq!(step1.record.phase, Phase::Bootstrap);
        assert_eq!(step1.record.iteration, 0);
        assert_eq!(s1.control.iteration, 1);
        assert_eq!(step1.record.beta[1], 0.0);
        assert_eq!(step1.record.beta[2], 0.0);

        let (s2, step2) = engine.iterate(s1);
        assert_eq!(step2.record.phase, Phase::SteadyState);
        assert_eq!(s2.control.iteration, 2);
        assert!(step2.record.test > 0.0);
        // Chi-squared must drop from the flat default model.
        assert!(step2.record.chisq < step1.record.chisq);
    }

    #[test]
    fn test_spectrum_stays_above_floor() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let cfg = MaxEntConfig {
            max_iterations: 15,
            ..Default::default()
        };
        let engine = MaxEntEngine::new(&op, &p, cfg).unwrap();
        let floor = engine.floor();
        let mut state = engine.initial_state(None).unwrap();
        for _ in 0..15 {
            let (next, _) = engine.iterate(state);
            assert!(next.spectrum.iter().all(|&v| v >= floor));
            state = next;
        }
    }

    #[test]
    fn test_flux_preserving_updates_keep_floor() {
        // Unit flux from a BASE of ones squeezes the wings toward the floor.
        let op = blur(32, 1.5);
        let p = problem(&op, 0.05);
        let cfg = MaxEntConfig {
            preserve_flux: true,
            max_iterations: 30,
            ..Default::default()
        };
        let engine = MaxEntEngine::new(&op, &p, cfg).unwrap();
        let floor = engine.floor();
        let mut state = engine.initial_state(None).unwrap();
        for _ in 0..30 {
            let (next, step) = engine.iterate(state);
            assert!((next.spectrum.sum() - 1.0).abs() < 1e-12);
            let min = next.spectrum.iter().cloned().fold(f64::INFINITY, f64::min);
            assert!(
                min >= floor,
                "iteration {}: min {:e} below floor {:e}",
                step.record.iteration,
                min,
                floor
            );
            assert!(!step
                .warnings
                .iter()
                .any(|w| matches!(w, NumericWarning::FloorInfeasible { .. })));
            state = next;
        }
    }

    #[test]
    fn test_infeasible_floor_is_reported() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let cfg = MaxEntConfig {
            preserve_flux: true,
            positivity_fraction: 0.1,
            ..Default::default()
        };
        let engine = MaxEntEngine::new(&op, &p, cfg).unwrap();
        let (next, step) = engine.iterate(engine.initial_state(None).unwrap());
        assert!(next.spectrum.iter().all(|&v| (v - 1.0 / 16.0).abs() < 1e-15));
        assert!(step.warnings.contains(&NumericWarning::FloorInfeasible {
            iteration: 0,
            n_bins: 16,
            floor: engine.floor(),
        }));
    }

    #[test]
    fn test_records_carry_zero_based_index() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let cfg = MaxEntConfig {
            max_iterations: 4,
            ..Default::default()
        };
        let engine = MaxEntEngine::new(&op, &p, cfg).unwrap();
        let mut seen = Vec::new();
        let mut obs = |r: &IterationRecord| {
            seen.push(r.iteration);
            Progress::Continue
        };
        let out = engine.run(None, &mut obs).unwrap();
        assert_eq!(out.iterations, 4);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        let last = out.history.last().unwrap();
        assert_eq!(last.iteration, out.iterations - 1);
    }

    #[test]
    fn test_cap_reached_without_convergence() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let cfg = MaxEntConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let out = reconstruct(&op, &p, cfg).unwrap();
        assert_eq!(out.iterations, 3);
        assert_eq!(out.termination, Termination::MaxIterReached);
        assert_eq!(out.history.len(), 3);
        assert_eq!(&out.sigma, p.sigma());
        assert_eq!(&out.base, p.base());
    }

    #[test]
    fn test_observer_cancellation() {
        let op = blur(16, 1.5);
        let p = problem(&op, 0.05);
        let engine = MaxEntEngine::new(&op, &p, MaxEntConfig::default()).unwrap();
        let mut calls = 0usize;
        let mut obs = |r: &IterationRecord| {
            calls += 1;
            if r.iteration == 1 {
                Progress::Cancel
            } else {
                Progress::Continue
            }
        };
        let out = engine.run(None, &mut obs).unwrap();
        assert_eq!(out.termination, Termination::Cancelled);
        assert_eq!(out.iterations, 2);
        assert_eq!(calls, 2);
    }
}
