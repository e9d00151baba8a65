use ninterp::error::InterpolateError;
use thiserror::Error;

use crate::Domain;

/// An invalid symbol construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolError {
    /// Operands live on different, non-empty domains.
    #[error("domain mismatch in `{operator}`: {left} vs {right}")]
    DomainMismatch {
        operator: String,
        left: Domain,
        right: Domain,
    },

    /// A spatial operator was applied to a domain-agnostic child.
    #[error("`{operator}` needs a child on a non-empty domain, got `{symbol}`")]
    EmptyDomain { operator: String, symbol: String },

    /// Concatenation children share a subdomain or have none.
    #[error("concatenation children must sit on disjoint non-empty domains, got {domain}")]
    OverlappingDomains { domain: Domain },

    #[error("concatenation needs at least one child")]
    EmptyConcatenation,

    /// Only domain-agnostic children can be broadcast.
    #[error("cannot broadcast `{symbol}` from {from} onto {to}")]
    InvalidBroadcast {
        symbol: String,
        from: Domain,
        to: Domain,
    },

    #[error("function `{name}` expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("`{symbol}` has no elementwise derivative with respect to `{wrt}`")]
    NotDifferentiable { symbol: String, wrt: String },

    /// A rebuild supplied the wrong number of children.
    #[error("`{symbol}` takes {expected} children, got {got}")]
    ChildCount {
        symbol: String,
        expected: usize,
        got: usize,
    },
}

/// An evaluation failure.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A spatial operator or variable needs discretizing before evaluation.
    #[error("`{symbol}` must be discretized before it can be evaluated")]
    NotDiscretized { symbol: String },

    #[error("no value bound for variable `{name}`")]
    UnboundVariable { name: String },

    #[error("no value bound for parameter `{name}`")]
    UnboundParameter { name: String },

    #[error("no value supplied for input `{name}`")]
    UnboundInput { name: String },

    #[error("`{symbol}` reads the state vector but none was supplied")]
    MissingState { symbol: String },

    #[error("state slice `{name}` [{start}, {end}) is outside a state of length {len}")]
    StateOutOfRange {
        name: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("shape mismatch in `{operator}`: lengths {left} and {right}")]
    ShapeMismatch {
        operator: String,
        left: usize,
        right: usize,
    },

    #[error("table `{table}` lookup failed")]
    Interpolation {
        table: String,
        #[source]
        source: InterpolateError,
    },
}
