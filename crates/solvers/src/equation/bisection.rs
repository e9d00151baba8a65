//! Bisection on a bracketed scalar root.

mod bracket;
mod config;
mod error;
mod solution;

pub use bracket::{Bracket, BracketError, Sign};
pub use config::{Config, ConfigError};
pub use error::Error;
pub use solution::{Solution, Status};

use volta_core::{EquationProblem, Model, Observer};

use crate::equation::{Evaluation, evaluate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop and return the best evaluation so far.
    StopEarly,
}

/// Emitted after each midpoint evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// 1-based iteration counter.
    pub iter: usize,
    /// The bracket the midpoint was taken from.
    pub bracket: [f64; 2],
    pub x: f64,
    pub residual: f64,
}

/// Finds a root of a scalar equation problem inside `bracket`.
///
/// # Errors
///
/// Fails if the config or bracket is invalid, the residuals at the bracket
/// ends share a sign, a residual is not finite, or an evaluation fails.
pub fn solve<M, P, Obs>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
    mut observer: Obs,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
    Obs: Observer<Event, Action>,
{
    config.validate()?;
    let [left, right] = Bracket::bounds(bracket)?;

    let eval_at = |x: f64| -> Result<Evaluation<M::Input, M::Output, 1>, Error> {
        let eval = evaluate(model, problem, [x]).map_err(|e| Error::evaluation(x, e))?;
        let residual = eval.residuals[0];
        if residual.is_finite() {
            Ok(eval)
        } else {
            Err(Error::NonFiniteResidual { x, residual })
        }
    };

    let left_eval = eval_at(left)?;
    if left_eval.residuals[0].abs() <= config.residual_tol {
        return Ok(Solution::from_eval(left_eval, Status::Converged, 0));
    }
    let right_eval = eval_at(right)?;
    if right_eval.residuals[0].abs() <= config.residual_tol {
        return Ok(Solution::from_eval(right_eval, Status::Converged, 0));
    }

    let mut bracket = Bracket::new(
        [left, right],
        left_eval.residuals[0],
        right_eval.residuals[0],
    )?;
    let mut best = if left_eval.residuals[0].abs() <= right_eval.residuals[0].abs() {
        left_eval
    } else {
        right_eval
    };

    for iter in 1..=config.max_iters {
        let x = bracket.midpoint();
        let eval = eval_at(x)?;
        let residual = eval.residuals[0];
        let is_better = residual.abs() < best.residuals[0].abs();

        let event = Event {
            iter,
            bracket: bracket.as_array(),
            x,
            residual,
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            let best = if is_better { eval } else { best };
            return Ok(Solution::from_eval(best, Status::StoppedByObserver, iter));
        }

        bracket.shrink(x, residual);
        if residual.abs() <= config.residual_tol
            || bracket.is_x_converged(config.x_abs_tol, config.x_rel_tol)
        {
            return Ok(Solution::from_eval(eval, Status::Converged, iter));
        }
        if is_better {
            best = eval;
        }
    }

    Ok(Solution::from_eval(best, Status::MaxIters, config.max_iters))
}

/// Runs [`solve`] without an observer.
///
/// # Errors
///
/// See [`solve`].
pub fn solve_unobserved<M, P>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    solve(model, problem, bracket, config, ())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;

    struct Cube;

    impl Model for Cube {
        type Input = f64;
        type Output = f64;
        type Error = Infallible;

        fn call(&self, input: &f64) -> Result<f64, Infallible> {
            Ok(input.powi(3))
        }
    }

    /// Residual `output - target`.
    struct Target(f64);

    impl EquationProblem<1> for Target {
        type Input = f64;
        type Output = f64;
        type InputError = Infallible;
        type ResidualError = Infallible;

        fn input(&self, x: &[f64; 1]) -> Result<f64, Infallible> {
            Ok(x[0])
        }

        fn residuals(&self, _input: &f64, output: &f64) -> Result<[f64; 1], Infallible> {
            Ok([output - self.0])
        }
    }

    #[test]
    fn finds_cube_root() {
        let solution = solve_unobserved(&Cube, &Target(27.0), [0.0, 10.0], &Config::default())
            .unwrap();

        assert_eq!(solution.status, Status::Converged);
        assert_relative_eq!(solution.x, 3.0, epsilon = 1e-10);
        assert_relative_eq!(solution.snapshot.output, 27.0, epsilon = 1e-9);
    }

    #[test]
    fn reversed_bracket_is_normalized() {
        let solution = solve_unobserved(&Cube, &Target(-8.0), [1.0, -5.0], &Config::default())
            .unwrap();
        assert_relative_eq!(solution.x, -2.0, epsilon = 1e-10);
    }

    #[test]
    fn endpoint_roots_return_immediately() {
        let solution = solve_unobserved(&Cube, &Target(8.0), [0.0, 2.0], &Config::default())
            .unwrap();
        assert_eq!(solution.iters, 0);
        assert_relative_eq!(solution.x, 2.0);
    }

    #[test]
    fn observer_can_stop_iteration() {
        let mut seen = Vec::new();
        let observer = |event: &Event| {
            seen.push(event.iter);
            (event.iter == 3).then_some(Action::StopEarly)
        };

        let solution = solve(&Cube, &Target(27.0), [0.0, 10.0], &Config::default(), observer)
            .unwrap();

        assert_eq!(solution.status, Status::StoppedByObserver);
        assert_eq!(solution.iters, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_bad_input() {
        let config = Config::default();
        assert!(matches!(
            solve_unobserved(&Cube, &Target(27.0), [4.0, 10.0], &config),
            Err(Error::InvalidBracket(BracketError::NoSignChange))
        ));
        assert!(matches!(
            solve_unobserved(&Cube, &Target(27.0), [1.0, 1.0], &config),
            Err(Error::InvalidBracket(BracketError::ZeroWidth))
        ));

        let config = Config {
            residual_tol: -1.0,
            ..Config::default()
        };
        assert!(matches!(
            solve_unobserved(&Cube, &Target(27.0), [0.0, 10.0], &config),
            Err(Error::InvalidConfig(ConfigError::Residual))
        ));
    }

    #[test]
    fn zero_iterations_report_the_better_endpoint() {
        let config = Config {
            max_iters: 0,
            ..Config::default()
        };
        let solution = solve_unobserved(&Cube, &Target(27.0), [2.0, 10.0], &config).unwrap();

        assert_eq!(solution.status, Status::MaxIters);
        assert_relative_eq!(solution.x, 2.0);
    }
}
