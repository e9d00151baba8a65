//! Damped Newton iteration for square nonlinear systems.
//!
//! Each iteration solves `J(x) Δ = -F(x)` with a dense LU factorization and
//! backtracks along `Δ` until the residual norm stops growing.

use std::error::Error as StdError;

use nalgebra::DVector;
use thiserror::Error;
use volta_core::{NonlinearProblem, sparse};

/// Newton iteration limits and tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    residual_tol: f64,
    step_tol: f64,
    max_backtracks: usize,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be at least one")]
    MaxIters,

    #[error("residual_tol must be finite and positive")]
    ResidualTol,

    #[error("step_tol must be finite and non-negative")]
    StepTol,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 20,
            residual_tol: 1e-10,
            step_tol: 1e-12,
            max_backtracks: 8,
        }
    }
}

impl Config {
    /// Creates a validated config.
    ///
    /// # Errors
    ///
    /// Fails if `max_iters` is zero or a tolerance is out of range.
    pub fn new(
        max_iters: usize,
        residual_tol: f64,
        step_tol: f64,
        max_backtracks: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_iters,
            residual_tol,
            step_tol,
            max_backtracks,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Names the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if !self.residual_tol.is_finite() || self.residual_tol <= 0.0 {
            return Err(ConfigError::ResidualTol);
        }
        if !self.step_tol.is_finite() || self.step_tol < 0.0 {
            return Err(ConfigError::StepTol);
        }
        Ok(())
    }

    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    #[must_use]
    pub fn residual_tol(&self) -> f64 {
        self.residual_tol
    }

    #[must_use]
    pub fn step_tol(&self) -> f64 {
        self.step_tol
    }

    #[must_use]
    pub fn with_residual_tol(mut self, residual_tol: f64) -> Self {
        self.residual_tol = residual_tol;
        self
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("problem evaluation failed")]
    Problem(#[source] Box<dyn StdError + Send + Sync>),

    #[error("singular Jacobian at iteration {iter}")]
    SingularJacobian { iter: usize },

    #[error("non-finite residual at iteration {iter}")]
    NonFiniteResidual { iter: usize },

    #[error("no convergence after {iters} iterations (residual norm {residual_norm:e})")]
    NotConverged { iters: usize, residual_norm: f64 },
}

impl Error {
    fn problem<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Problem(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: DVector<f64>,
    pub residual: DVector<f64>,
    pub iters: usize,
}

impl Solution {
    /// Largest residual component.
    #[must_use]
    pub fn residual_norm(&self) -> f64 {
        max_abs(&self.residual)
    }
}

/// Solves `F(x) = 0` starting from `x0`.
///
/// Converges when the largest residual component is at most
/// `residual_tol`, or when the last update was below `step_tol` relative to
/// `x` while the residual is already within `residual_tol · 1e3`.
///
/// # Errors
///
/// Fails on an invalid config, a problem error, a singular Jacobian, a
/// non-finite residual, or when the iteration limit is reached.
pub fn solve<P: NonlinearProblem>(
    problem: &P,
    x0: DVector<f64>,
    config: &Config,
) -> Result<Solution, Error> {
    config.validate()?;

    let mut x = x0;
    let mut residual = problem.residual(&x).map_err(Error::problem)?;
    let mut norm = max_abs(&residual);
    if !norm.is_finite() {
        return Err(Error::NonFiniteResidual { iter: 0 });
    }

    for iter in 1..=config.max_iters {
        if norm <= config.residual_tol {
            return Ok(Solution {
                x,
                residual,
                iters: iter - 1,
            });
        }

        let jacobian = sparse::to_dense(&problem.jacobian(&x).map_err(Error::problem)?);
        let delta = jacobian
            .lu()
            .solve(&(-&residual))
            .ok_or(Error::SingularJacobian { iter })?;

        let mut scale = 1.0;
        let mut candidate = &x + &delta;
        let mut candidate_residual = problem.residual(&candidate).map_err(Error::problem)?;
        let mut candidate_norm = max_abs(&candidate_residual);
        for _ in 0..config.max_backtracks {
            if candidate_norm.is_finite() && candidate_norm < norm {
                break;
            }
            scale *= 0.5;
            candidate = &x + &delta * scale;
            candidate_residual = problem.residual(&candidate).map_err(Error::problem)?;
            candidate_norm = max_abs(&candidate_residual);
        }
        if !candidate_norm.is_finite() {
            return Err(Error::NonFiniteResidual { iter });
        }

        let step = max_abs(&(&delta * scale)) / (1.0 + max_abs(&candidate));
        x = candidate;
        residual = candidate_residual;
        norm = candidate_norm;

        if step <= config.step_tol && norm <= config.residual_tol * 1e3 {
            return Ok(Solution {
                x,
                residual,
                iters: iter,
            });
        }
    }

    if norm <= config.residual_tol {
        return Ok(Solution {
            x,
            residual,
            iters: config.max_iters,
        });
    }
    Err(Error::NotConverged {
        iters: config.max_iters,
        residual_norm: norm,
    })
}

fn max_abs(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc: f64, x| {
        if acc.is_nan() || x.is_nan() {
            f64::NAN
        } else {
            acc.max(x.abs())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;
    use nalgebra_sparse::CsrMatrix;

    /// `x² - 2 = 0`, `x·y - 1 = 0`.
    struct Coupled;

    impl NonlinearProblem for Coupled {
        type Error = Infallible;

        fn unknowns(&self) -> usize {
            2
        }

        fn residual(&self, x: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::from_vec(vec![x[0] * x[0] - 2.0, x[0] * x[1] - 1.0]))
        }

        fn jacobian(&self, x: &DVector<f64>) -> Result<CsrMatrix<f64>, Infallible> {
            Ok(sparse::from_triplets(
                2,
                2,
                [(0, 0, 2.0 * x[0]), (1, 0, x[1]), (1, 1, x[0])],
            ))
        }
    }

    /// `0 · x = 1` has a singular Jacobian.
    struct Singular;

    impl NonlinearProblem for Singular {
        type Error = Infallible;

        fn unknowns(&self) -> usize {
            1
        }

        fn residual(&self, _x: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::from_element(1, 1.0))
        }

        fn jacobian(&self, _x: &DVector<f64>) -> Result<CsrMatrix<f64>, Infallible> {
            Ok(sparse::zeros(1, 1))
        }
    }

    #[test]
    fn solves_coupled_system() {
        let solution = solve(&Coupled, DVector::from_vec(vec![1.0, 1.0]), &Config::default())
            .unwrap();

        assert_relative_eq!(solution.x[0], 2.0_f64.sqrt(), epsilon = 1e-10);
        assert_relative_eq!(solution.x[1], 1.0 / 2.0_f64.sqrt(), epsilon = 1e-10);
        assert!(solution.residual_norm() <= 1e-10);
    }

    #[test]
    fn converged_start_takes_no_iterations() {
        let x0 = DVector::from_vec(vec![2.0_f64.sqrt(), 1.0 / 2.0_f64.sqrt()]);
        let solution = solve(&Coupled, x0, &Config::default().with_residual_tol(1e-9)).unwrap();
        assert_eq!(solution.iters, 0);
    }

    #[test]
    fn reports_singular_jacobian() {
        let err = solve(&Singular, DVector::zeros(1), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::SingularJacobian { iter: 1 }));
    }

    #[test]
    fn reports_iteration_limit() {
        let config = Config::new(1, 1e-14, 0.0, 0).unwrap();
        let err = solve(&Coupled, DVector::from_vec(vec![10.0, 1.0]), &config).unwrap_err();
        assert!(matches!(err, Error::NotConverged { iters: 1, .. }));
    }

    #[test]
    fn validates_config() {
        assert_eq!(Config::new(0, 1e-8, 0.0, 0), Err(ConfigError::MaxIters));
        assert_eq!(Config::new(5, 0.0, 0.0, 0), Err(ConfigError::ResidualTol));
        assert_eq!(Config::new(5, 1e-8, f64::NAN, 0), Err(ConfigError::StepTol));
    }
}
