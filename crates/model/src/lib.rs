//! Model lifecycle, cached builds, and simulations for Volta.
//!
//! A [`Model`] is written symbolically while it is `Constructing`, then moves
//! one way through `Resolved`, `Simplified`, `Discretized`, and `Solved`.
//! [`Pipeline`] memoizes the expensive transitions, and [`Simulation`] drives
//! the DAE integrator over a discretized model.
//!
//! - [`chemistry`]: lead-acid and lithium-ion model templates with default
//!   parameters
//! - [`experiment`]: cycling protocols parsed from strings
//! - [`SimulationConfig`]: solver settings and mesh points loaded from TOML

mod config;
mod model;
mod pipeline;
mod simulation;

pub mod chemistry;
pub mod experiment;

pub use config::{ConfigError, SimulationConfig};
pub use model::{Model, ModelError, Stage};
pub use pipeline::Pipeline;
pub use simulation::{
    ExperimentSolution, Simulation, SimulationError, Solution, StepSolution, Termination,
};
