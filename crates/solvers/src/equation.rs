//! Solvers for equation problems.
//!
//! An [`EquationProblem`] maps solver variables `x: [f64; N]` to a model
//! input and turns the model output into residuals. A [`NonlinearProblem`]
//! is a square system with its own Jacobian.
//!
//! # Solvers
//!
//! - [`bisection`]: guaranteed convergence on a bracketed scalar root
//! - [`newton`]: quadratic convergence from a good starting point
//!
//! [`EquationProblem`]: volta_core::EquationProblem
//! [`NonlinearProblem`]: volta_core::NonlinearProblem

mod evaluate;

pub use evaluate::{EvalError, Evaluation, evaluate};

pub mod bisection;
pub mod newton;
