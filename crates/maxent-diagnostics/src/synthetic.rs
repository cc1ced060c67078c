// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Synthetic Measurements
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Synthetic multi-detector measurements.
//!
//! Forward-model a known spectrum through an instrument operator and add
//! Gaussian noise with `sigma = max(fraction * |y|, floor)`.

use maxent_core::operator::LinearOperator;
use maxent_types::error::{MaxEntError, MaxEntResult};
use maxent_types::state::MaxEntProblem;
use ndarray::{Array1, Array2, ArrayView1, Zip};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Relative noise level. 0.02 = 2 % of the signal.
const DEFAULT_NOISE_FRACTION: f64 = 0.02;

/// Absolute noise floor for channels with vanishing signal.
const DEFAULT_NOISE_FLOOR: f64 = 0.01;

/// Per-channel noise level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub fraction: f64,
    pub floor: f64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel {
            fraction: DEFAULT_NOISE_FRACTION,
            floor: DEFAULT_NOISE_FLOOR,
        }
    }
}

impl NoiseModel {
    /// Constant uncertainty on every channel.
    pub fn constant(sigma: f64) -> Self {
        NoiseModel {
            fraction: 0.0,
            floor: sigma,
        }
    }

    fn sigma(&self, clean: f64) -> f64 {
        (self.fraction * clean.abs()).max(self.floor)
    }
}

/// Noise-free prediction, noisy data and the uncertainties used.
#[derive(Debug, Clone)]
pub struct SyntheticMeasurement {
    pub clean: Array2<f64>,
    pub datum: Array2<f64>,
    pub sigma: Array2<f64>,
}

impl SyntheticMeasurement {
    pub fn generate<O, R>(
        operator: &O,
        truth: ArrayView1<f64>,
        noise: NoiseModel,
        rng: &mut R,
    ) -> MaxEntResult<Self>
    where
        O: LinearOperator + ?Sized,
        R: Rng + ?Sized,
    {
        if truth.len() != operator.spectrum_len() {
            return Err(MaxEntError::ShapeMismatch {
                what: "truth spectrum",
                expected: vec![operator.spectrum_len()],
                found: vec![truth.len()],
            });
        }
        if !noise.floor.is_finite() || noise.floor <= 0.0 {
            return Err(MaxEntError::Config(format!(
                "noise floor must be finite and > 0, got {}",
                noise.floor
            )));
        }
        if !noise.fraction.is_finite() || noise.fraction < 0.0 {
            return Err(MaxEntError::Config(format!(
                "noise fraction must be finite and >= 0, got {}",
                noise.fraction
            )));
        }

        let clean = operator.forward(truth);
        let sigma = clean.mapv(|y| noise.sigma(y));
        let mut datum = clean.clone();
        Zip::from(&mut datum).and(&sigma).for_each(|d, &s| {
            let z: f64 = StandardNormal.sample(&mut *rng);
            *d += s * z;
        });

        Ok(SyntheticMeasurement {
            clean,
            datum,
            sigma,
        })
    }

    /// Chi-squared of the noise-free prediction against the noisy data.
    pub fn true_chi_squared(&self) -> f64 {
        Zip::from(&self.clean)
            .and(&self.datum)
            .and(&self.sigma)
            .fold(0.0, |acc, &c, &d, &s| acc + ((c - d) / s).powi(2))
    }

    pub fn into_problem(self, base: Array1<f64>) -> MaxEntResult<MaxEntProblem> {
        MaxEntProblem::new(self.datum, self.sigma, base)
    }
}

/// Gaussian line of height `amplitude` on a flat `background`.
pub fn gaussian_line(n: usize, centre: f64, width: f64, amplitude: f64, background: f64) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| {
        let d = (i as f64 - centre) / width;
        background + amplitude * (-0.5 * d * d).exp()
    })
}
