use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use volta_core::{DaeProblem, NonlinearProblem};

use crate::equation::newton;

use super::{Config, Error, init::Algebraic};

/// One implicit Euler stage: `M (y - y_prev) / h = f(t + h, y)`.
struct ImplicitStage<'a, P> {
    problem: &'a P,
    t: f64,
    h: f64,
    y_prev: &'a DVector<f64>,
}

impl<P: DaeProblem> ImplicitStage<'_, P> {
    fn ydot(&self, y: &DVector<f64>) -> DVector<f64> {
        (y - self.y_prev) / self.h
    }
}

impl<P: DaeProblem> NonlinearProblem for ImplicitStage<'_, P> {
    type Error = P::Error;

    fn unknowns(&self) -> usize {
        self.y_prev.len()
    }

    fn residual(&self, y: &DVector<f64>) -> Result<DVector<f64>, P::Error> {
        self.problem.residual(self.t + self.h, y, &self.ydot(y))
    }

    fn jacobian(&self, y: &DVector<f64>) -> Result<CsrMatrix<f64>, P::Error> {
        self.problem
            .jacobian(self.t + self.h, y, &self.ydot(y), 1.0 / self.h)
    }
}

/// A step that converged, with its weighted error norm.
#[derive(Debug)]
pub(super) struct Trial {
    pub y: DVector<f64>,
    pub error: f64,
}

#[derive(Debug)]
pub(super) enum Outcome {
    Converged(Trial),
    /// Newton failed to converge; retry with a smaller step.
    Diverged(newton::Error),
}

/// Advances the state by `h` with implicit Euler and step doubling.
///
/// The full step and two half steps give an error estimate and the
/// extrapolated state `2 y_half - y_full`, whose algebraic rows are then
/// re-solved at `t + h`.
pub(super) fn attempt<P: DaeProblem>(
    problem: &P,
    t: f64,
    y: &DVector<f64>,
    h: f64,
    rows: &[usize],
    config: &Config,
) -> Result<Outcome, Error> {
    let stage = |t: f64, h: f64, y_prev: &DVector<f64>| {
        let stage = ImplicitStage {
            problem,
            t,
            h,
            y_prev,
        };
        newton::solve(&stage, y_prev.clone(), &config.newton).map(|solution| solution.x)
    };
    let run = || -> Result<Trial, newton::Error> {
        let full = stage(t, h, y)?;
        let mid = stage(t, 0.5 * h, y)?;
        let half = stage(t + 0.5 * h, 0.5 * h, &mid)?;

        let error = error_norm(&full, &half, y, config);
        let extrapolated = &half * 2.0 - &full;
        let y = Algebraic::new(problem, t + h, &extrapolated, rows).project(&config.newton)?;
        Ok(Trial { y, error })
    };

    match run() {
        Ok(trial) => Ok(Outcome::Converged(trial)),
        Err(newton::Error::Problem(source)) => Err(Error::Problem { t, source }),
        Err(err) => Ok(Outcome::Diverged(err)),
    }
}

/// Weighted RMS of `half - full` with scale `atol + rtol · max(|y|, |half|)`.
fn error_norm(
    full: &DVector<f64>,
    half: &DVector<f64>,
    y: &DVector<f64>,
    config: &Config,
) -> f64 {
    let n = full.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n)
        .map(|i| {
            let scale = config.atol + config.rtol * y[i].abs().max(half[i].abs());
            ((half[i] - full[i]) / scale).powi(2)
        })
        .sum();
    (sum / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;
    use volta_core::sparse;

    /// `dy/dt = -y`.
    struct Decay {
        mass: CsrMatrix<f64>,
    }

    impl DaeProblem for Decay {
        type Error = Infallible;

        fn state_len(&self) -> usize {
            1
        }

        fn initial_state(&self) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::from_element(1, 1.0))
        }

        fn mass_matrix(&self) -> &CsrMatrix<f64> {
            &self.mass
        }

        fn rhs(&self, _t: f64, y: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
            Ok(-y)
        }

        fn rhs_jacobian(&self, _t: f64, _y: &DVector<f64>) -> Result<CsrMatrix<f64>, Infallible> {
            Ok(sparse::diagonal(&[-1.0]))
        }
    }

    fn extrapolated(problem: &Decay, h: f64) -> Trial {
        let y0 = DVector::from_element(1, 1.0);
        match attempt(problem, 0.0, &y0, h, &[], &Config::default()).unwrap() {
            Outcome::Converged(trial) => trial,
            Outcome::Diverged(err) => panic!("step diverged: {err}"),
        }
    }

    #[test]
    fn extrapolated_step_is_second_order() {
        let problem = Decay {
            mass: sparse::diagonal(&[1.0]),
        };
        let h = 0.1;
        let trial = extrapolated(&problem, h);

        // y_full = 1/(1+h), y_half = 1/(1+h/2)².
        let full = 1.0 / (1.0 + h);
        let half = 1.0 / (1.0 + 0.5 * h).powi(2);
        assert_relative_eq!(trial.y[0], 2.0 * half - full, epsilon = 1e-9);
        assert!(trial.error > 1.0);

        // A second-order method has a local error of O(h³).
        let coarse = (trial.y[0] - (-h).exp()).abs();
        let fine = (extrapolated(&problem, 0.5 * h).y[0] - (-0.5 * h).exp()).abs();
        assert!(coarse < 2e-2 * h * h, "local error {coarse}");
        assert!(coarse / fine > 6.0, "error ratio {}", coarse / fine);
    }

    #[test]
    fn error_norm_tracks_the_half_step_error() {
        let h = 0.1_f64;
        let y0 = DVector::from_element(1, 1.0);
        let full = DVector::from_element(1, 1.0 / (1.0 + h));
        let half = DVector::from_element(1, 1.0 / (1.0 + 0.5 * h).powi(2));
        let unscaled = Config {
            atol: 1.0,
            rtol: 0.0,
            ..Config::default()
        };

        let estimate = error_norm(&full, &half, &y0, &unscaled);
        let actual = (half[0] - (-h).exp()).abs();
        assert_relative_eq!(estimate, actual, max_relative = 0.1);
    }

    #[test]
    fn empty_state_has_zero_error() {
        let empty = DVector::zeros(0);
        assert_eq!(error_norm(&empty, &empty, &empty, &Config::default()), 0.0);
    }
}
