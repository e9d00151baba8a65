//! Capability traits for cross-solver observers.
//!
//! These traits abstract over solver-specific event and action types, enabling
//! observers to work generically across different solvers.
//!
//! # Event traits
//!
//! - [`HasTime`]: events emitted at a point in simulated time
//! - [`HasResidual`]: events that carry a residual value
//!
//! # Action traits
//!
//! - [`CanStopEarly`]: actions that can signal early termination
//!
//! # Example
//!
//! ```rust
//! use volta_core::Observer;
//! use volta_observers::traits::{CanStopEarly, HasTime};
//!
//! struct StopAt {
//!     t_stop: f64,
//! }
//!
//! impl<E: HasTime, A: CanStopEarly> Observer<E, A> for StopAt {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         (event.time() >= self.t_stop).then(A::stop_early)
//!     }
//! }
//! ```

use volta_solvers::{equation::bisection, transient::dae};

/// An event emitted at a point in simulated time.
pub trait HasTime {
    fn time(&self) -> f64;

    /// Accepted steps so far, or `None` for iteration-based solvers.
    fn step(&self) -> Option<usize> {
        None
    }
}

/// An event that carries a residual value.
pub trait HasResidual {
    fn residual(&self) -> f64;
}

/// An action type that can signal early termination.
pub trait CanStopEarly {
    /// Returns the action that stops the solver early.
    fn stop_early() -> Self;
}

impl HasTime for dae::Event {
    fn time(&self) -> f64 {
        self.t
    }

    fn step(&self) -> Option<usize> {
        Some(self.step)
    }
}

impl HasResidual for bisection::Event {
    fn residual(&self) -> f64 {
        self.residual
    }
}

impl CanStopEarly for bisection::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}

impl CanStopEarly for dae::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
