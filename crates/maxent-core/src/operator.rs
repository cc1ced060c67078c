// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Instrument Operators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward and adjoint instrument operators.
//!
//! The forward map takes a spectrum of `n` bins to predicted data of shape
//! (time channels × detector groups); the adjoint is its exact transpose.
//! Both are linear, deterministic and stateless.

use maxent_types::error::{MaxEntError, MaxEntResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::f64::consts::PI;

/// Linear spectrum-to-data map together with its transpose.
///
/// Implementations must satisfy `<forward(x), y> == <x, adjoint(y)>` to
/// floating-point tolerance; [`adjoint_mismatch`] measures the violation.
pub trait LinearOperator {
    /// Number of spectrum bins accepted by [`forward`](Self::forward).
    fn spectrum_len(&self) -> usize;

    /// (time channels, detector groups) produced by the forward map.
    fn data_shape(&self) -> (usize, usize);

    fn forward(&self, spectrum: ArrayView1<f64>) -> Array2<f64>;

    fn adjoint(&self, data: ArrayView2<f64>) -> Array1<f64>;
}

impl<T: LinearOperator + ?Sized> LinearOperator for &T {
    fn spectrum_len(&self) -> usize {
        (**self).spectrum_len()
    }
    fn data_shape(&self) -> (usize, usize) {
        (**self).data_shape()
    }
    fn forward(&self, spectrum: ArrayView1<f64>) -> Array2<f64> {
        (**self).forward(spectrum)
    }
    fn adjoint(&self, data: ArrayView2<f64>) -> Array1<f64> {
        (**self).adjoint(data)
    }
}

/// Relative adjointness residual
/// `|<Ax, y> - <x, A^T y>| / max(|<Ax, y>|, |<x, A^T y>|, 1e-300)`.
pub fn adjoint_mismatch<O: LinearOperator + ?Sized>(
    op: &O,
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
) -> f64 {
    let lhs = (&op.forward(x) * &y).sum();
    let rhs = x.dot(&op.adjoint(y));
    (lhs - rhs).abs() / lhs.abs().max(rhs.abs()).max(1e-300)
}

/// Dense response matrix, rows ordered time-major: row `t * groups + g`.
#[derive(Debug, Clone)]
pub struct MatrixOperator {
    response: Array2<f64>,
    n_time: usize,
    n_groups: usize,
}

impl MatrixOperator {
    pub fn new(response: Array2<f64>, n_time: usize, n_groups: usize) -> MaxEntResult<Self> {
        if response.nrows() != n_time * n_groups {
            return Err(MaxEntError::ShapeMismatch {
                what: "response rows",
                expected: vec![n_time * n_groups],
                found: vec![response.nrows()],
            });
        }
        if response.ncols() == 0 {
            return Err(MaxEntError::EmptyInput("response"));
        }
        Ok(MatrixOperator {
            response,
            n_time,
            n_groups,
        })
    }

    /// Single-group operator whose rows are the time channels.
    pub fn single_group(response: Array2<f64>) -> MaxEntResult<Self> {
        let n_time = response.nrows();
        Self::new(response, n_time, 1)
    }

    pub fn response(&self) -> &Array2<f64> {
        &self.response
    }
}

impl LinearOperator for MatrixOperator {
    fn spectrum_len(&self) -> usize {
        self.response.ncols()
    }

    fn data_shape(&self) -> (usize, usize) {
        (self.n_time, self.n_groups)
    }

    fn forward(&self, spectrum: ArrayView1<f64>) -> Array2<f64> {
        debug_assert_eq!(
            spectrum.len(),
            self.response.ncols(),
            "spectrum length does not match operator bins"
        );
        let flat = self.response.dot(&spectrum);
        flat.into_shape_with_order((self.n_time, self.n_groups))
            .unwrap_or_else(|_| Array2::zeros((self.n_time, self.n_groups)))
    }

    fn adjoint(&self, data: ArrayView2<f64>) -> Array1<f64> {
        debug_assert_eq!(data.dim(), self.data_shape(), "data shape does not match operator");
        let flat: Array1<f64> = data.iter().copied().collect();
        self.response.t().dot(&flat)
    }
}

/// Amplitude and phase of one detector group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupCalibration {
    pub amplitude: f64,
    pub phase: f64,
}

/// Quadrature-kernel instrument model.
///
/// `pred[t, g] = a_g * sum_k F_k (cos(phi_g) R[t, m_k] - sin(phi_g) I[t, m_k])`
/// where `R`/`I` are the in-phase/quadrature kernels (time × columns),
/// `m` is the bin-index map and `(a_g, phi_g)` the group calibration.
#[derive(Debug, Clone)]
pub struct KernelOperator {
    real: Array2<f64>,
    imag: Array2<f64>,
    bin_map: Vec<usize>,
    groups: Vec<GroupCalibration>,
}

impl KernelOperator {
    pub fn new(
        real: Array2<f64>,
        imag: Array2<f64>,
        bin_map: Vec<usize>,
        groups: Vec<GroupCalibration>,
    ) -> MaxEntResult<Self> {
        if real.shape() != imag.shape() {
            return Err(MaxEntError::ShapeMismatch {
                what: "quadrature kernel",
                expected: real.shape().to_vec(),
                found: imag.shape().to_vec(),
            });
        }
        if real.is_empty() {
            return Err(MaxEntError::EmptyInput("kernel"));
        }
        if bin_map.is_empty() {
            return Err(MaxEntError::EmptyInput("bin_map"));
        }
        if groups.is_empty() {
            return Err(MaxEntError::EmptyInput("groups"));
        }
        let n_cols = real.ncols();
        if let Some((index, col)) = bin_map.iter().enumerate().find(|(_, c)| **c >= n_cols) {
            return Err(MaxEntError::Config(format!(
                "bin_map[{index}] = {col} exceeds kernel column count {n_cols}"
            )));
        }
        for (index, g) in groups.iter().enumerate() {
            if !g.amplitude.is_finite() || !g.phase.is_finite() {
                return Err(MaxEntError::NonFinite {
                    what: "group calibration",
                    index,
                    value: if g.amplitude.is_finite() {
                        g.phase
                    } else {
                        g.amplitude
                    },
                });
            }
        }
        Ok(KernelOperator {
            real,
            imag,
            bin_map,
            groups,
        })
    }

    /// Precession kernels `cos(2 pi nu t)`, `sin(2 pi nu t)` damped by a
    /// Gaussian resolution envelope `exp(-(2 pi nu resolution)^2 / 2)`,
    /// one column per frequency and an identity bin map.
    pub fn precession(
        times: &[f64],
        frequencies: &[f64],
        groups: Vec<GroupCalibration>,
        resolution: f64,
    ) -> MaxEntResult<Self> {
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(MaxEntError::Config(format!(
                "resolution must be finite and >= 0, got {resolution}"
            )));
        }
        let n_t = times.len();
        let n_f = frequencies.len();
        let mut real = Array2::zeros((n_t, n_f));
        let mut imag = Array2::zeros((n_t, n_f));
        for (j, &nu) in frequencies.iter().enumerate() {
            let omega = 2.0 * PI * nu;
            let envelope = (-0.5 * (omega * resolution).powi(2)).exp();
            for (i, &t) in times.iter().enumerate() {
                real[[i, j]] = envelope * (omega * t).cos();
                imag[[i, j]] = envelope * (omega * t).sin();
            }
        }
        Self::new(real, imag, (0..n_f).collect(), groups)
    }

    pub fn groups(&self) -> &[GroupCalibration] {
        &self.groups
    }

    pub fn bin_map(&self) -> &[usize] {
        &self.bin_map
    }

    /// Kernel columns accumulated through the bin map: (R·F, I·F) per channel.
    fn mapped_sums(&self, spectrum: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
        debug_assert_eq!(
            spectrum.len(),
            self.bin_map.len(),
            "spectrum length does not match operator bins"
        );
        let mut column_weight = Array1::<f64>::zeros(self.real.ncols());
        for (&col, &f) in self.bin_map.iter().zip(spectrum.iter()) {
            column_weight[col] += f;
        }
        (self.real.dot(&column_weight), self.imag.dot(&column_weight))
    }
}

impl LinearOperator for KernelOperator {
    fn spectrum_len(&self) -> usize {
        self.bin_map.len()
    }

    fn data_shape(&self) -> (usize, usize) {
        (self.real.nrows(), self.groups.len())
    }

    fn forward(&self, spectrum: ArrayView1<f64>) -> Array2<f64> {
        let (re, im) = self.mapped_sums(spectrum);
        let mut out = Array2::zeros(self.data_shape());
        for (g, cal) in self.groups.iter().enumerate() {
            let (sin, cos) = cal.phase.sin_cos();
            let mut col = out.column_mut(g);
            for t in 0..re.len() {
                col[t] = cal.amplitude * (cos * re[t] - sin * im[t]);
            }
        }
        out
    }

    fn adjoint(&self, data: ArrayView2<f64>) -> Array1<f64> {
        debug_assert_eq!(data.dim(), self.data_shape(), "data shape does not match operator");
        let n_t = self.real.nrows();
        let mut wr = Array1::<f64>::zeros(n_t);
        let mut wi = Array1::<f64>::zeros(n_t);
        for (g, cal) in self.groups.iter().enumerate() {
            let (sin, cos) = cal.phase.sin_cos();
            let col = data.index_axis(Axis(1), g);
            wr.scaled_add(cal.amplitude * cos, &col);
            wi.scaled_add(-cal.amplitude * sin, &col);
        }
        let per_column = self.real.t().dot(&wr) + self.imag.t().dot(&wi);
        self.bin_map.iter().map(|&col| per_column[col]).collect()
    }
}
