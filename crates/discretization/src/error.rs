use thiserror::Error;
use volta_symbolic::{Domain, Side};

use crate::CoordinateSystem;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    #[error("no submesh for subdomain `{name}`")]
    UnknownDomain { name: String },

    #[error("submeshes `{left}` and `{right}` do not share an edge (gap {gap})")]
    NonContiguousMesh {
        left: String,
        right: String,
        gap: f64,
    },

    #[error("submeshes `{left}` ({left_system:?}) and `{right}` ({right_system:?}) use different coordinate systems")]
    CoordinateMismatch {
        left: String,
        left_system: CoordinateSystem,
        right: String,
        right_system: CoordinateSystem,
    },

    #[error("invalid edges: {reason}")]
    InvalidEdges { reason: String },

    #[error("subdomain `{name}` needs at least one cell")]
    ZeroCells { name: String },

    #[error("cannot build a mesh for the empty domain")]
    EmptyDomain,
}

#[derive(Debug, Error)]
pub enum DiscretizationError {
    /// No rule exists for this operator, coordinate system, and operand location.
    #[error("unsupported operator `{operator}` on {domain}: {reason}")]
    UnsupportedOperator {
        operator: String,
        domain: Domain,
        reason: String,
    },

    #[error("`{symbol}` on {domain} needs a {side} boundary condition")]
    BoundaryConditionMissing {
        symbol: String,
        domain: Domain,
        side: Side,
    },

    #[error("parameter `{name}` was not resolved before discretization")]
    UnresolvedParameter { name: String },

    #[error("variable `{name}` has no initial condition")]
    InitialConditionMissing { name: String },

    #[error("variable `{name}` has no governing equation")]
    UnknownVariable { name: String },

    #[error("event `{name}` must evaluate to a scalar")]
    NonScalarEvent { name: String },

    #[error("equation for `{name}` evaluates on {found} but `{name}` lives on cell centres")]
    EquationShape { name: String, found: String },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Symbol(#[from] volta_symbolic::SymbolError),
}
