//! Diagnostics for MaxEnt reconstructions.
//!
//! Synthetic measurements with seeded noise and peak analysis of the
//! reconstructed spectra.

pub mod peaks;
pub mod synthetic;
