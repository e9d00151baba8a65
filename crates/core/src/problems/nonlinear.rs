use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// A square nonlinear system `F(x) = 0` with a sparse Jacobian.
///
/// Newton-type solvers work against this trait. Consistent initialization of
/// algebraic states and each implicit integration stage are both expressed
/// as a `NonlinearProblem`.
pub trait NonlinearProblem {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of unknowns (and residuals).
    fn unknowns(&self) -> usize;

    /// Evaluates the residual vector at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the residual cannot be evaluated.
    fn residual(&self, x: &DVector<f64>) -> Result<DVector<f64>, Self::Error>;

    /// Evaluates the Jacobian `dF/dx` at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the Jacobian cannot be evaluated.
    fn jacobian(&self, x: &DVector<f64>) -> Result<CsrMatrix<f64>, Self::Error>;
}
