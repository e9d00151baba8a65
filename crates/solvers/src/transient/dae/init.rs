use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::Deserialize;
use tracing::warn;
use volta_core::{DaeProblem, NonlinearProblem, sparse};

use crate::equation::newton;

use super::{Config, Error};

/// What to do when the initial algebraic residual exceeds `consistency_tol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialConditionPolicy {
    /// Solve the algebraic rows for consistency, keeping the others fixed.
    #[default]
    Adjust,
    /// Fail instead of changing the given state.
    Reject,
}

/// The algebraic rows `0 = f_a(t, y)` as a system in `y_a`, other rows fixed.
pub(super) struct Algebraic<'a, P> {
    problem: &'a P,
    t: f64,
    y: &'a DVector<f64>,
    rows: &'a [usize],
}

impl<'a, P: DaeProblem> Algebraic<'a, P> {
    pub(super) fn new(problem: &'a P, t: f64, y: &'a DVector<f64>, rows: &'a [usize]) -> Self {
        Self { problem, t, y, rows }
    }

    fn full(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = self.y.clone();
        for (k, row) in self.rows.iter().enumerate() {
            y[*row] = x[k];
        }
        y
    }

    fn unknowns_at(&self) -> DVector<f64> {
        DVector::from_iterator(self.rows.len(), self.rows.iter().map(|row| self.y[*row]))
    }

    /// Solves for the algebraic rows, returning the full state.
    pub(super) fn project(&self, config: &newton::Config) -> Result<DVector<f64>, newton::Error> {
        if self.rows.is_empty() {
            return Ok(self.y.clone());
        }
        let solution = newton::solve(self, self.unknowns_at(), config)?;
        Ok(self.full(&solution.x))
    }
}

impl<P: DaeProblem> NonlinearProblem for Algebraic<'_, P> {
    type Error = P::Error;

    fn unknowns(&self) -> usize {
        self.rows.len()
    }

    fn residual(&self, x: &DVector<f64>) -> Result<DVector<f64>, Self::Error> {
        let f = self.problem.rhs(self.t, &self.full(x))?;
        Ok(DVector::from_iterator(
            self.rows.len(),
            self.rows.iter().map(|row| f[*row]),
        ))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<CsrMatrix<f64>, Self::Error> {
        let jac = self.problem.rhs_jacobian(self.t, &self.full(x))?;
        Ok(sparse::submatrix(&jac, self.rows, self.rows))
    }
}

/// Row and magnitude of the largest algebraic residual.
fn worst_residual<P: DaeProblem>(
    problem: &P,
    t: f64,
    y: &DVector<f64>,
    rows: &[usize],
) -> Result<Option<(usize, f64)>, Error> {
    let f = problem.rhs(t, y).map_err(|e| Error::problem(t, e))?;
    Ok(rows
        .iter()
        .map(|row| (*row, f[*row].abs()))
        .fold(None, |worst, (row, r)| match worst {
            Some((_, w)) if !(r.is_nan() || r > w) => worst,
            _ => Some((row, r)),
        }))
}

/// Makes `y0` consistent with the algebraic rows according to the policy.
///
/// A state that is already consistent comes back unchanged.
pub(super) fn consistent_state<P: DaeProblem>(
    problem: &P,
    t: f64,
    y0: DVector<f64>,
    rows: &[usize],
    config: &Config,
) -> Result<DVector<f64>, Error> {
    let Some((row, residual)) = worst_residual(problem, t, &y0, rows)? else {
        return Ok(y0);
    };
    if residual <= config.consistency_tol {
        return Ok(y0);
    }

    let inconsistent = Error::InconsistentInitialCondition { t, row, residual };
    match config.initialization {
        InitialConditionPolicy::Reject => Err(inconsistent),
        InitialConditionPolicy::Adjust => {
            let newton = config
                .newton
                .with_residual_tol(config.consistency_tol.min(config.newton.residual_tol()));
            let y = match Algebraic::new(problem, t, &y0, rows).project(&newton) {
                Ok(y) => y,
                Err(newton::Error::Problem(source)) => return Err(Error::Problem { t, source }),
                Err(_) => return Err(inconsistent),
            };
            warn!(t, row, residual, "adjusted inconsistent algebraic initial conditions");
            Ok(y)
        }
    }
}
