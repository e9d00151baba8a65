use std::convert::Infallible;

use nalgebra::DVector;
use volta_core::{DaeProblem, EquationProblem, Model};

use crate::equation::bisection;

use super::Error;

/// Event values along the straight line between two accepted states.
struct StepInterpolant<'a, P> {
    problem: &'a P,
    t0: f64,
    t1: f64,
    y0: &'a DVector<f64>,
    y1: &'a DVector<f64>,
}

impl<P> StepInterpolant<'_, P> {
    fn state(&self, t: f64) -> DVector<f64> {
        interpolate(self.t0, self.y0, self.t1, self.y1, t)
    }
}

impl<P: DaeProblem> Model for StepInterpolant<'_, P> {
    type Input = f64;
    type Output = DVector<f64>;
    type Error = P::Error;

    fn call(&self, t: &f64) -> Result<DVector<f64>, P::Error> {
        self.problem.events(*t, &self.state(*t))
    }
}

/// Zero of event `index`.
struct Crossing {
    index: usize,
}

impl EquationProblem<1> for Crossing {
    type Input = f64;
    type Output = DVector<f64>;
    type InputError = Infallible;
    type ResidualError = Infallible;

    fn input(&self, x: &[f64; 1]) -> Result<f64, Infallible> {
        Ok(x[0])
    }

    fn residuals(&self, _t: &f64, events: &DVector<f64>) -> Result<[f64; 1], Infallible> {
        Ok([events[self.index]])
    }
}

/// Linear interpolation, exact at both ends.
pub(super) fn interpolate(
    t0: f64,
    y0: &DVector<f64>,
    t1: f64,
    y1: &DVector<f64>,
    t: f64,
) -> DVector<f64> {
    if t >= t1 {
        return y1.clone();
    }
    if t <= t0 {
        return y0.clone();
    }
    let theta = (t - t0) / (t1 - t0);
    y0 * (1.0 - theta) + y1 * theta
}

/// Time at which event `index` crosses zero inside the step `[t0, t1]`.
pub(super) fn locate<P: DaeProblem>(
    problem: &P,
    index: usize,
    (t0, y0): (f64, &DVector<f64>),
    (t1, y1): (f64, &DVector<f64>),
    config: &bisection::Config,
) -> Result<f64, Error> {
    let interpolant = StepInterpolant {
        problem,
        t0,
        t1,
        y0,
        y1,
    };
    bisection::solve_unobserved(&interpolant, &Crossing { index }, [t0, t1], config)
        .map(|solution| solution.x)
        .map_err(|source| Error::EventLocation {
            index,
            t0,
            t1,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra_sparse::CsrMatrix;
    use volta_core::{Direction, sparse};

    /// A single state with the events `y - 0.25` and `y - 2`.
    struct Thresholds {
        mass: CsrMatrix<f64>,
    }

    impl DaeProblem for Thresholds {
        type Error = Infallible;

        fn state_len(&self) -> usize {
            1
        }

        fn initial_state(&self) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::zeros(1))
        }

        fn mass_matrix(&self) -> &CsrMatrix<f64> {
            &self.mass
        }

        fn rhs(&self, _t: f64, _y: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::from_element(1, 1.0))
        }

        fn rhs_jacobian(&self, _t: f64, _y: &DVector<f64>) -> Result<CsrMatrix<f64>, Infallible> {
            Ok(sparse::zeros(1, 1))
        }

        fn events(&self, _t: f64, y: &DVector<f64>) -> Result<DVector<f64>, Infallible> {
            Ok(DVector::from_vec(vec![y[0] - 0.25, y[0] - 2.0]))
        }

        fn event_directions(&self) -> Vec<Direction> {
            vec![Direction::Increasing, Direction::Increasing]
        }
    }

    #[test]
    fn locates_a_crossing_inside_the_step() {
        let problem = Thresholds {
            mass: sparse::diagonal(&[1.0]),
        };
        let y0 = DVector::from_element(1, 0.0);
        let y1 = DVector::from_element(1, 1.0);

        let t = locate(&problem, 0, (1.0, &y0), (2.0, &y1), &bisection::Config::default())
            .unwrap();
        assert_relative_eq!(t, 1.25, epsilon = 1e-10);
    }

    #[test]
    fn reports_a_missing_sign_change() {
        let problem = Thresholds {
            mass: sparse::diagonal(&[1.0]),
        };
        let y0 = DVector::from_element(1, 0.0);
        let y1 = DVector::from_element(1, 1.0);

        let err = locate(&problem, 1, (0.0, &y0), (1.0, &y1), &bisection::Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::EventLocation { index: 1, .. }));
    }

    #[test]
    fn interpolation_is_exact_at_the_ends() {
        let y0 = DVector::from_vec(vec![0.1, 0.2]);
        let y1 = DVector::from_vec(vec![0.3, -0.7]);

        assert_eq!(interpolate(0.0, &y0, 0.3, &y1, 0.3), y1);
        assert_eq!(interpolate(0.0, &y0, 0.3, &y1, 0.0), y0);
        assert_relative_eq!(interpolate(0.0, &y0, 0.2, &y1, 0.1)[1], -0.25);
    }
}
