//! Reusable observers for the Volta solvers.
//!
//! This crate provides [`Observer`] implementations and capability traits that
//! work across the solvers in `volta-solvers`.
//!
//! # Modules
//!
//! - [`traits`]: Capability traits for cross-solver observers
//!   ([`HasTime`], [`HasResidual`], [`CanStopEarly`])
//! - [`Cancellation`]: a shared flag another thread can raise to stop a solve
//! - [`ProgressLog`]: logs solver progress through `tracing`
//!
//! [`Observer`]: volta_core::Observer
//! [`HasTime`]: traits::HasTime
//! [`HasResidual`]: traits::HasResidual
//! [`CanStopEarly`]: traits::CanStopEarly

mod cancellation;
mod progress;

pub mod traits;

pub use cancellation::Cancellation;
pub use progress::ProgressLog;
