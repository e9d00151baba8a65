//! Time integrators.

pub mod dae;
