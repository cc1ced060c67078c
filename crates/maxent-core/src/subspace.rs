// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Search Subspace
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gradient evaluation, search-basis construction and the local quadratic
//! model of entropy and chi-squared along the basis.

use crate::operator::LinearOperator;
use crate::projector::SubspaceProjector;
use maxent_math::linalg::weighted_dot;
use maxent_types::constants::{SUBSPACE_DIM, TEST_FLOOR};
use maxent_types::state::{NumericWarning, Phase, Quantity, QuadraticModel};
use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Dimension, Zip};
use std::f64::consts::E;

/// Weights of the chi and entropy gradients in the first two directions:
/// `xi0 = F c cgrad`, `xi1 = F (a sgrad - b cgrad)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

fn reciprocal(x: f64) -> f64 {
    if x > 0.0 {
        1.0 / x
    } else {
        0.0
    }
}

/// First iteration: `a = 1`, `b = c = 1/cnorm`.
pub fn bootstrap_coefficients(cnorm: f64) -> Coefficients {
    Coefficients {
        a: 1.0,
        b: reciprocal(cnorm),
        c: reciprocal(cnorm),
    }
}

/// Later iterations: `a = 1/(2 snorm test)`, `b = 1/(2 cnorm test)`,
/// `c = 1/cnorm`.
pub fn steady_state_coefficients(snorm: f64, cnorm: f64, test: f64) -> Coefficients {
    Coefficients {
        a: reciprocal(2.0 * snorm * test),
        b: reciprocal(2.0 * cnorm * test),
        c: reciprocal(cnorm),
    }
}

/// Angle diagnostic between the entropy and chi gradients,
/// `sqrt(|1 - cos| / 2)` in the F-weighted metric, floored at 1e-7.
pub fn gradient_angle(snorm: f64, cnorm: f64, tnorm: f64) -> f64 {
    let test = (0.5 * (1.0 - tnorm / (snorm * cnorm)).abs()).sqrt();
    if test.is_finite() {
        test.max(TEST_FLOOR)
    } else {
        TEST_FLOOR
    }
}

/// Relative entropy of `f` against `base * e`, normalised by `blank * e`.
/// Bins where the logarithm is undefined do not contribute.
pub fn entropy(f: ArrayView1<f64>, base: ArrayView1<f64>, blank: f64) -> f64 {
    let sum = Zip::from(&f).and(&base).fold(0.0, |acc, &fi, &bi| {
        let term = fi * (fi / (bi * E)).ln();
        if term.is_finite() {
            acc + term
        } else {
            acc
        }
    });
    -sum / (blank * E)
}

/// Everything one iteration learns about the current spectrum.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub chisq: f64,
    pub test: f64,
    pub entropy: f64,
    pub flux: f64,
    pub coefficients: Coefficients,
    /// Search basis, N×3.
    pub xi: Array2<f64>,
    /// Forward transform of each basis column.
    pub eta: [Array2<f64>; SUBSPACE_DIM],
    pub model: QuadraticModel,
    pub warnings: Vec<NumericWarning>,
}

/// Fixed inputs of the per-iteration evaluation.
pub struct SearchSpace<'a, O: LinearOperator + ?Sized> {
    operator: &'a O,
    datum: ArrayView2<'a, f64>,
    base: ArrayView1<'a, f64>,
    inv_var: Array2<f64>,
    blank: f64,
    projector: SubspaceProjector,
}

impl<'a, O: LinearOperator + ?Sized> SearchSpace<'a, O> {
    pub fn new(
        operator: &'a O,
        datum: ArrayView2<'a, f64>,
        sigma: ArrayView2<'a, f64>,
        base: ArrayView1<'a, f64>,
        blank: f64,
        projector: SubspaceProjector,
    ) -> Self {
        let inv_var = sigma.mapv(|s| 1.0 / (s * s));
        SearchSpace {
            operator,
            datum,
            base,
            inv_var,
            blank,
            projector,
        }
    }

    pub fn blank(&self) -> f64 {
        self.blank
    }

    /// Chi-squared of a spectrum against the data.
    pub fn chi_squared(&self, f: ArrayView1<f64>) -> f64 {
        let ox = self.operator.forward(f);
        Zip::from(&ox)
            .and(&self.datum)
            .and(&self.inv_var)
            .fold(0.0, |acc, &o, &d, &w| acc + (o - d) * (o - d) * w)
    }

    /// Gradients, search basis and quadratic model at `f`.
    pub fn evaluate(&self, f: ArrayView1<f64>, phase: Phase, iteration: usize) -> Evaluation {
        let mut warnings = Vec::new();

        let mut ox = self.operator.forward(f);
        scrub(&mut ox, Quantity::Prediction, iteration, &mut warnings);

        let resid = &ox - &self.datum;
        let chisq = Zip::from(&resid)
            .and(&self.inv_var)
            .fold(0.0, |acc, &r, &w| acc + r * r * w);

        let weighted = (&resid * &self.inv_var) * 2.0;
        let mut cgrad = self.operator.adjoint(weighted.view());
        scrub(&mut cgrad, Quantity::ChiGradient, iteration, &mut warnings);

        let blank = self.blank;
        let mut sgrad: Array1<f64> = Zip::from(&f)
            .and(&self.base)
            .map_collect(|&fi, &bi| -(fi / bi).ln() / blank);
        scrub(&mut sgrad, Quantity::EntropyGradient, iteration, &mut warnings);

        let snorm = weighted_dot(sgrad.view(), sgrad.view(), f).sqrt();
        let cnorm = weighted_dot(cgrad.view(), cgrad.view(), f).sqrt();
        let tnorm = weighted_dot(sgrad.view(), cgrad.view(), f);

        let (test, coefficients) = match phase {
            Phase::Bootstrap => (0.0, bootstrap_coefficients(cnorm)),
            Phase::SteadyState => {
                let test = gradient_angle(snorm, cnorm, tnorm);
                (test, steady_state_coefficients(snorm, cnorm, test))
            }
        };
        let Coefficients { a, b, c } = coefficients;

        let n = f.len();
        let mut xi = Array2::zeros((n, SUBSPACE_DIM));
        Zip::from(xi.rows_mut())
            .and(&f)
            .and(&sgrad)
            .and(&cgrad)
            .for_each(|mut row, &fi, &s, &cg| {
                row[0] = fi * c * cg;
                row[1] = fi * (a * s - b * cg);
            });
        self.projector.project_columns(xi.view_mut(), &[0, 1]);
        scrub(&mut xi, Quantity::SearchBasis, iteration, &mut warnings);

        let eta0 = self.operator.forward(xi.column(0));
        let eta1 = self.operator.forward(xi.column(1));

        let t = self.operator.adjoint((&eta1 * &self.inv_var).view());
        let norm = Zip::from(&t)
            .and(&f)
            .fold(0.0, |acc, &ti, &fi| acc + fi * ti * ti)
            .sqrt();
        let scale = reciprocal(norm);
        Zip::from(xi.column_mut(2))
            .and(&t)
            .and(&f)
            .for_each(|x, &ti, &fi| *x = fi * ti * scale);
        self.projector.project_columns(xi.view_mut(), &[2]);
        scrub(&mut xi, Quantity::SearchBasis, iteration, &mut warnings);

        let eta2 = self.operator.forward(xi.column(2));
        let mut eta = [eta0, eta1, eta2];
        for e in eta.iter_mut() {
            scrub(e, Quantity::TransformedBasis, iteration, &mut warnings);
        }

        let model = self.quadratic_model(f, &xi, &eta, &sgrad, &cgrad, chisq);

        Evaluation {
            chisq,
            test,
            entropy: entropy(f, self.base, blank),
            flux: f.sum(),
            coefficients,
            xi,
            eta,
            model,
            warnings,
        }
    }

    fn quadratic_model(
        &self,
        f: ArrayView1<f64>,
        xi: &Array2<f64>,
        eta: &[Array2<f64>; SUBSPACE_DIM],
        sgrad: &Array1<f64>,
        cgrad: &Array1<f64>,
        chisq: f64,
    ) -> QuadraticModel {
        let mut model = QuadraticModel::default();
        let inv_f = f.mapv(|v| if v > 0.0 { 1.0 / v } else { 0.0 });

        for k in 0..SUBSPACE_DIM {
            let xk = xi.column(k);
            model.s1[k] = xk.dot(sgrad);
            model.c1[k] = xk.dot(cgrad) / chisq;
            for l in 0..=k {
                let xl = xi.column(l);
                let s2 = -Zip::from(&xk)
                    .and(&xl)
                    .and(&inv_f)
                    .fold(0.0, |acc, &p, &q, &w| acc + p * q * w)
                    / self.blank;
                let c2 = Zip::from(&eta[k])
                    .and(&eta[l])
                    .and(&self.inv_var)
                    .fold(0.0, |acc, &p, &q, &w| acc + p * q * w)
                    * 2.0
                    / chisq;
                model.s2[k][l] = s2;
                model.s2[l][k] = s2;
                model.c2[k][l] = c2;
                model.c2[l][k] = c2;
            }
        }
        model
    }
}

/// Zero out NaN/Inf entries, recording and logging how many there were.
fn scrub<D: Dimension>(
    values: &mut Array<f64, D>,
    quantity: Quantity,
    iteration: usize,
    warnings: &mut Vec<NumericWarning>,
) {
    let mut count = 0;
    values.mapv_inplace(|v| {
        if v.is_finite() {
            v
        } else {
            count += 1;
            0.0
        }
    });
    if count > 0 {
        log::warn!("maxent: {count} non-finite {quantity} value(s) at iteration {iteration}; zeroed");
        warnings.push(NumericWarning::NonFinite {
            iteration,
            quantity,
            count,
        });
    }
}
