use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::sparse;

/// Direction of a zero-crossing that triggers an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// The event value goes from negative to non-negative.
    Increasing,
    /// The event value goes from positive to non-positive.
    #[default]
    Decreasing,
    /// Either crossing triggers the event.
    Either,
}

impl Direction {
    /// Returns true if moving from `before` to `after` crosses zero in this direction.
    #[must_use]
    pub fn crossed(self, before: f64, after: f64) -> bool {
        let increasing = before < 0.0 && after >= 0.0;
        let decreasing = before > 0.0 && after <= 0.0;
        match self {
            Self::Increasing => increasing,
            Self::Decreasing => decreasing,
            Self::Either => increasing || decreasing,
        }
    }
}

/// A semi-explicit DAE in mass-matrix form: `M · dy/dt = f(t, y)`.
///
/// This is the contract between a discretized model and any time integrator.
/// Rows where the mass matrix diagonal is zero are algebraic constraints
/// `0 = f_i(t, y)`; the remaining rows are differential.
///
/// The residual and Jacobian follow the implicit convention used by IDA-style
/// integrators:
///
/// ```text
/// residual(t, y, ydot)    = M · ydot − f(t, y)
/// jacobian(t, y, ydot, c) = c · M − ∂f/∂y
/// ```
pub trait DaeProblem {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Length of the global state vector.
    fn state_len(&self) -> usize;

    /// Initial state, before any consistency correction.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the initial conditions cannot be evaluated.
    fn initial_state(&self) -> Result<DVector<f64>, Self::Error>;

    /// The (constant) mass matrix.
    fn mass_matrix(&self) -> &CsrMatrix<f64>;

    /// Evaluates the right-hand side `f(t, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if evaluation fails.
    fn rhs(&self, t: f64, y: &DVector<f64>) -> Result<DVector<f64>, Self::Error>;

    /// Evaluates `∂f/∂y` at `(t, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if evaluation fails.
    fn rhs_jacobian(&self, t: f64, y: &DVector<f64>) -> Result<CsrMatrix<f64>, Self::Error>;

    /// Evaluates the implicit residual `M · ydot − f(t, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if evaluation of `f` fails.
    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        ydot: &DVector<f64>,
    ) -> Result<DVector<f64>, Self::Error> {
        let f = self.rhs(t, y)?;
        Ok(sparse::mul_vec(self.mass_matrix(), ydot) - f)
    }

    /// Evaluates the implicit Jacobian `c · M − ∂f/∂y`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if evaluation of `∂f/∂y` fails.
    fn jacobian(
        &self,
        t: f64,
        y: &DVector<f64>,
        _ydot: &DVector<f64>,
        c: f64,
    ) -> Result<CsrMatrix<f64>, Self::Error> {
        let jac = self.rhs_jacobian(t, y)?;
        Ok(sparse::linear_combination(
            &[(c, self.mass_matrix()), (-1.0, &jac)],
            self.state_len(),
            self.state_len(),
        ))
    }

    /// Evaluates every event function at `(t, y)`.
    ///
    /// The default implementation has no events.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if evaluation fails.
    fn events(&self, _t: f64, _y: &DVector<f64>) -> Result<DVector<f64>, Self::Error> {
        Ok(DVector::zeros(0))
    }

    /// Crossing direction for each event, in the order of [`DaeProblem::events`].
    fn event_directions(&self) -> Vec<Direction> {
        Vec::new()
    }

    /// Indices of algebraic rows (zero mass-matrix diagonal).
    fn algebraic_rows(&self) -> Vec<usize> {
        let diagonal = sparse::diagonal_of(self.mass_matrix());
        diagonal
            .iter()
            .enumerate()
            .filter_map(|(i, d)| (*d == 0.0).then_some(i))
            .collect()
    }
}
