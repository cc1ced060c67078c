//! Maximum-entropy spectral reconstruction engine.
//!
//! Operators, constraint projection, the subspace step solver and the
//! reconstruction loop.

pub mod observer;
pub mod operator;
pub mod projector;
pub mod reconstruction;
pub mod step;
pub mod subspace;

pub use observer::{LogObserver, NullObserver, Progress, ReconstructionObserver};
pub use operator::{adjoint_mismatch, GroupCalibration, KernelOperator, LinearOperator, MatrixOperator};
pub use reconstruction::{reconstruct, IterationStep, MaxEntEngine};
