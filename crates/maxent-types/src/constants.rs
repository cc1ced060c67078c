// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Dimension of the search subspace (chi, entropy/chi, curvature).
pub const SUBSPACE_DIM: usize = 3;

/// Floor applied to the angle diagnostic `test` once it is defined.
pub const TEST_FLOOR: f64 = 1e-7;

/// Convergence threshold on `test`.
pub const DEFAULT_TEST_TOLERANCE: f64 = 0.02;

/// Convergence threshold on |chisq/chizer - 1|.
pub const DEFAULT_CHI_TOLERANCE: f64 = 0.01;

/// Positivity floor as a fraction of `blank`.
pub const DEFAULT_POSITIVITY_FRACTION: f64 = 1e-3;

/// Initial trust-region scale (fraction of total flux / blank).
pub const DEFAULT_FACTOR: f64 = 0.1;

/// Initial fraction of the attainable chi-squared reduction pursued per step.
/// 0.5 reproduces the classical "halfway to the minimum" target.
pub const DEFAULT_FACFAKE: f64 = 0.5;

/// Trust-region scale bounds.
pub const FACTOR_MIN: f64 = 1e-3;
pub const FACTOR_MAX: f64 = 0.5;

/// Bounds on the chi-target approach fraction.
pub const FACFAKE_MIN: f64 = 0.05;
pub const FACFAKE_MAX: f64 = 0.5;

/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
