//! Symbolic expression graphs for Volta models.
//!
//! A model is written as a tree of [`Symbol`]s over scalars, time, state
//! variables, parameters, and spatial operators. This crate provides:
//!
//! - [`Symbol`]: the immutable expression node, validated at construction
//! - [`Symbol::evaluate`]: pure evaluation against an [`EvalContext`]
//! - [`Symbol::diff`]: symbolic elementwise derivatives
//! - [`Symbol::jacobian`]: forward-mode Jacobians of discretized trees
//! - [`simplify`]: value-preserving, idempotent rewriting
//! - [`parameters`]: parameter values and the resolver that substitutes them
//! - [`System`]: the container of equations, conditions, events, and outputs

mod diff;
mod domain;
mod error;
mod evaluate;
mod function;
mod jacobian;
mod symbol;
mod system;
mod table;
mod value;

pub mod parameters;
pub mod simplify;

pub use domain::{Domain, Side};
pub use error::{EvalError, SymbolError};
pub use evaluate::{EvalContext, Inputs};
pub use function::{FunctionTable, NamedFunction};
pub use simplify::{simplify, simplify_system};
pub use symbol::{BinaryOp, Kind, ReduceOp, SpatialOp, Symbol, UnaryOp};
pub use system::{
    BoundaryCondition, BoundaryConditions, BoundaryKind, Equation, EquationKind, Event, System,
};
pub use table::{TableError, TableLookup};
pub use value::Value;
