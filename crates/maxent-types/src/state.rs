// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::SUBSPACE_DIM;
use crate::error::{MaxEntError, MaxEntResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Measured data, its uncertainties and the default model.
///
/// The arrays are caller-owned inputs: nothing in the engine mutates them.
#[derive(Debug, Clone)]
pub struct MaxEntProblem {
    datum: Array2<f64>,
    sigma: Array2<f64>,
    base: Array1<f64>,
}

impl MaxEntProblem {
    /// `datum` and `sigma` are (time channels × detector groups),
    /// `base` has one entry per spectrum bin.
    pub fn new(datum: Array2<f64>, sigma: Array2<f64>, base: Array1<f64>) -> MaxEntResult<Self> {
        if datum.is_empty() {
            return Err(MaxEntError::EmptyInput("datum"));
        }
        if base.is_empty() {
            return Err(MaxEntError::EmptyInput("base"));
        }
        if datum.shape() != sigma.shape() {
            return Err(MaxEntError::ShapeMismatch {
                what: "sigma",
                expected: datum.shape().to_vec(),
                found: sigma.shape().to_vec(),
            });
        }
        Ok(MaxEntProblem { datum, sigma, base })
    }

    /// Problem with a flat default model of `n_bins` entries at `level`.
    pub fn with_flat_model(
        datum: Array2<f64>,
        sigma: Array2<f64>,
        n_bins: usize,
        level: f64,
    ) -> MaxEntResult<Self> {
        Self::new(datum, sigma, Array1::from_elem(n_bins, level))
    }

    /// Check the values: finite data, strictly positive sigma, and a
    /// strictly positive default model (non-negative with `admit_zero_base`).
    pub fn validate(&self, admit_zero_base: bool) -> MaxEntResult<()> {
        for (index, &value) in self.datum.iter().enumerate() {
            if !value.is_finite() {
                return Err(MaxEntError::NonFinite {
                    what: "datum",
                    index,
                    value,
                });
            }
        }
        for (index, &value) in self.sigma.iter().enumerate() {
            if !value.is_finite() {
                return Err(MaxEntError::NonFinite {
                    what: "sigma",
                    index,
                    value,
                });
            }
            if value <= 0.0 {
                return Err(MaxEntError::NonPositive {
                    what: "sigma",
                    index,
                    value,
                });
            }
        }
        for (index, &value) in self.base.iter().enumerate() {
            if !value.is_finite() {
                return Err(MaxEntError::NonFinite {
                    what: "base",
                    index,
                    value,
                });
            }
            let rejected = if admit_zero_base {
                value < 0.0
            } else {
                value <= 0.0
            };
            if rejected {
                return Err(MaxEntError::NonPositive {
                    what: "base",
                    index,
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn datum(&self) -> &Array2<f64> {
        &self.datum
    }

    pub fn sigma(&self) -> &Array2<f64> {
        &self.sigma
    }

    pub fn base(&self) -> &Array1<f64> {
        &self.base
    }

    pub fn n_bins(&self) -> usize {
        self.base.len()
    }

    /// (time channels, detector groups).
    pub fn data_shape(&self) -> (usize, usize) {
        self.datum.dim()
    }

    /// Expected chi-squared: the number of data points.
    pub fn chizer(&self) -> f64 {
        self.datum.len() as f64
    }

    /// Mean of the default model.
    pub fn mean_base(&self) -> f64 {
        self.base.sum() / self.base.len() as f64
    }
}

/// State carried from a previous run that stopped at its iteration cap.
#[derive(Debug, Clone)]
pub struct Continuation {
    pub spectrum: Array1<f64>,
    pub factor: f64,
    pub facfake: f64,
}

/// Chi-squared predicted by the quadratic model for the step just taken,
/// together with the value it was predicted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiPrediction {
    pub from: f64,
    pub predicted: f64,
}

/// Scalar control quantities of the iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub chisq: f64,
    pub chizer: f64,
    pub chtarg: f64,
    pub test: f64,
    pub factor: f64,
    pub facfake: f64,
    pub iteration: usize,
    pub last_prediction: Option<ChiPrediction>,
}

impl ControlState {
    pub fn new(chizer: f64, factor: f64, facfake: f64) -> Self {
        ControlState {
            chisq: f64::NAN,
            chizer,
            chtarg: f64::NAN,
            test: 0.0,
            factor,
            facfake,
            iteration: 0,
            last_prediction: None,
        }
    }
}

/// Everything that changes from one iteration to the next.
#[derive(Debug, Clone)]
pub struct ReconstructionState {
    pub spectrum: Array1<f64>,
    pub control: ControlState,
}

/// Local linear and quadratic coefficients of entropy (S) and normalised
/// chi-squared (C) along the search directions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuadraticModel {
    pub s1: [f64; SUBSPACE_DIM],
    pub c1: [f64; SUBSPACE_DIM],
    pub s2: [[f64; SUBSPACE_DIM]; SUBSPACE_DIM],
    pub c2: [[f64; SUBSPACE_DIM]; SUBSPACE_DIM],
}

impl QuadraticModel {
    /// Normalised chi-squared predicted for a step `beta`.
    pub fn chi_ratio(&self, beta: &[f64; SUBSPACE_DIM]) -> f64 {
        let mut linear = 0.0;
        let mut quad = 0.0;
        for i in 0..SUBSPACE_DIM {
            linear += self.c1[i] * beta[i];
            for k in 0..SUBSPACE_DIM {
                quad += beta[i] * self.c2[i][k] * beta[k];
            }
        }
        1.0 + linear + 0.5 * quad
    }

    /// Entropy-metric length of a step, `-beta^T S2 beta`.
    pub fn entropy_distance(&self, beta: &[f64; SUBSPACE_DIM]) -> f64 {
        let mut w = 0.0;
        for i in 0..SUBSPACE_DIM {
            for k in 0..SUBSPACE_DIM {
                w -= beta[i] * self.s2[i][k] * beta[k];
            }
        }
        w
    }
}

/// Which update rule an iteration used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// First iteration: Newton step along the chi direction only.
    Bootstrap,
    /// All later iterations: multiplier search inside the trust region.
    SteadyState,
}

impl Phase {
    pub fn for_iteration(iteration: usize) -> Self {
        if iteration == 0 {
            Phase::Bootstrap
        } else {
            Phase::SteadyState
        }
    }
}

/// Per-iteration diagnostic record.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    /// Zero-based index of the iteration that produced this record; one
    /// less than the iteration count reported after it.
    pub iteration: usize,
    pub phase: Phase,
    pub test: f64,
    pub entropy: f64,
    pub chtarg: f64,
    pub chisq: f64,
    /// Total flux before the update.
    pub flux: f64,
    pub beta: [f64; SUBSPACE_DIM],
    pub model: QuadraticModel,
    /// Entropy weight chosen by the step solver (0 during bootstrap).
    pub multiplier: f64,
}

/// Quantities checked for NaN/Inf each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    Prediction,
    ChiGradient,
    EntropyGradient,
    SearchBasis,
    TransformedBasis,
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quantity::Prediction => "ox",
            Quantity::ChiGradient => "cgrad",
            Quantity::EntropyGradient => "sgrad",
            Quantity::SearchBasis => "xi",
            Quantity::TransformedBasis => "eta",
        };
        f.write_str(name)
    }
}

/// Recoverable numerical conditions met during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericWarning {
    NonFinite {
        iteration: usize,
        quantity: Quantity,
        count: usize,
    },
    Degenerate {
        iteration: usize,
        dropped_directions: usize,
    },
    /// `n_bins * floor >= 1`: no unit-flux spectrum clears the floor, so the
    /// update fell back to the uniform spectrum.
    FloorInfeasible {
        iteration: usize,
        n_bins: usize,
        floor: f64,
    },
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Converged,
    MaxIterReached,
    Cancelled,
}

/// Result of a reconstruction.
#[derive(Debug, Clone)]
pub struct MaxEntOutput {
    pub spectrum: Array1<f64>,
    pub iterations: usize,
    pub termination: Termination,
    pub chisq: f64,
    pub chizer: f64,
    pub test: f64,
    pub factor: f64,
    pub facfake: f64,
    /// Copies of the caller's inputs; never modified by the engine.
    pub sigma: Array2<f64>,
    pub base: Array1<f64>,
    pub history: Vec<IterationRecord>,
    pub warnings: Vec<NumericWarning>,
}

impl MaxEntOutput {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// Input for a follow-up run resuming from this one.
    pub fn continuation(&self) -> Continuation {
        Continuation {
            spectrum: self.spectrum.clone(),
            factor: self.factor,
            facfake: self.facfake,
        }
    }
}
