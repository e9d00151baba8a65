use volta_core::Snapshot;

use crate::equation::Evaluation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The bracket or the residual met its tolerance.
    Converged,
    /// Ran out of iterations; the best point so far is reported.
    MaxIters,
    StoppedByObserver,
}

#[derive(Debug, Clone)]
pub struct Solution<I, O> {
    pub status: Status,
    /// Best estimate of the root.
    pub x: f64,
    pub residual: f64,
    pub snapshot: Snapshot<I, O>,
    pub iters: usize,
}

impl<I, O> Solution<I, O> {
    pub(super) fn from_eval(eval: Evaluation<I, O, 1>, status: Status, iters: usize) -> Self {
        Self {
            status,
            x: eval.x[0],
            residual: eval.residuals[0],
            snapshot: eval.snapshot,
            iters,
        }
    }
}
