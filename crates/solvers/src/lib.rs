//! Numerical solvers for Volta.
//!
//! - [`equation::bisection`] locates scalar roots on a bracket, which is how
//!   event crossings are pinned down inside a step.
//! - [`equation::newton`] solves square nonlinear systems, used for
//!   consistent initialization and every implicit stage.
//! - [`transient::dae`] integrates a [`DaeProblem`](volta_core::DaeProblem)
//!   with adaptive implicit Euler, events, and observers.

pub mod equation;
pub mod transient;
