//! Core traits and types for the Volta framework.
//!
//! This crate defines the shared abstractions that the symbolic, discretization,
//! solver, and model crates build on:
//!
//! - [`Model`]: a callable that maps a typed input to a typed output
//! - [`Snapshot`]: a captured input/output pair from a model call
//! - [`Observer`]: receives solver events and optionally returns control actions
//! - [`EquationProblem`], [`NonlinearProblem`], [`DaeProblem`]: problem traits
//!   that solvers drive: scalar root finding, Newton systems, and
//!   mass-matrix DAEs
//! - [`sparse`]: small helpers over `nalgebra-sparse` CSR matrices

mod model;
mod observer;
mod problems;

pub mod sparse;

pub use observer::Observer;
pub use problems::{DaeProblem, Direction, EquationProblem, NonlinearProblem};
pub use {model::Model, model::Snapshot};
