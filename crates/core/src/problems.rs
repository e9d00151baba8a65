mod dae;
mod equation;
mod nonlinear;

pub use dae::{DaeProblem, Direction};
pub use equation::EquationProblem;
pub use nonlinear::NonlinearProblem;
