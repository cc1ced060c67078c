//! Mathematical primitives for the SCPN MaxEnt core.

pub mod linalg;
