use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ndarray::Array1;
use ninterp::{
    error::{InterpolateError, ValidateError},
    interpolator::Extrapolate,
    prelude::{Interp1DOwned, Interpolator},
    strategy::enums::Strategy1DEnum,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table `{name}` has {x} abscissae but {y} values")]
    LengthMismatch { name: String, x: usize, y: usize },

    #[error("table `{name}` is invalid")]
    Validation {
        name: String,
        #[source]
        source: ValidateError,
    },
}

/// A named piecewise-linear lookup table, clamped outside its range.
pub struct TableLookup {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    interp: Interp1DOwned<f64, Strategy1DEnum>,
}

impl TableLookup {
    /// Creates a table from strictly increasing abscissae and their values.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] if the columns differ in length or `ninterp`
    /// rejects the data.
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Result<Self, TableError> {
        let name = name.into();
        if x.len() != y.len() {
            return Err(TableError::LengthMismatch {
                name,
                x: x.len(),
                y: y.len(),
            });
        }

        let interp = Interp1DOwned::new(
            Array1::from(x.clone()),
            Array1::from(y.clone()),
            ninterp::strategy::Linear.into(),
            Extrapolate::Clamp,
        );

        match interp {
            Ok(interp) => Ok(Self { name, x, y, interp }),
            Err(source) => Err(TableError::Validation { name, source }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interpolated value at `at`.
    ///
    /// # Errors
    ///
    /// Propagates interpolation failures from `ninterp`.
    pub fn value(&self, at: f64) -> Result<f64, InterpolateError> {
        self.interp.interpolate(&[at])
    }

    /// Slope of the interpolant at `at`, zero outside the table range.
    #[must_use]
    pub fn slope(&self, at: f64) -> f64 {
        let n = self.x.len();
        if n < 2 || at < self.x[0] || at > self.x[n - 1] {
            return 0.0;
        }
        let upper = self.x.partition_point(|x| *x <= at).clamp(1, n - 1);
        let lower = upper - 1;
        (self.y[upper] - self.y[lower]) / (self.x[upper] - self.x[lower])
    }
}

impl fmt::Debug for TableLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLookup")
            .field("name", &self.name)
            .field("points", &self.x.len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for TableLookup {
    fn eq(&self, other: &Self) -> bool {
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        self.name == other.name && bits(&self.x) == bits(&other.x) && bits(&self.y) == bits(&other.y)
    }
}

impl Eq for TableLookup {}

impl Hash for TableLookup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for x in self.x.iter().chain(&self.y) {
            x.to_bits().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn ocv() -> TableLookup {
        TableLookup::new("ocv", vec![0.0, 0.5, 1.0], vec![3.0, 3.5, 4.5]).unwrap()
    }

    #[test]
    fn interpolates_linearly_between_points() {
        let table = ocv();
        assert_relative_eq!(table.value(0.25).unwrap(), 3.25);
        assert_relative_eq!(table.value(0.75).unwrap(), 4.0);
    }

    #[test]
    fn clamps_outside_the_range() {
        let table = ocv();
        assert_relative_eq!(table.value(-1.0).unwrap(), 3.0);
        assert_relative_eq!(table.value(2.0).unwrap(), 4.5);
        assert_relative_eq!(table.slope(2.0), 0.0);
    }

    #[test]
    fn slope_follows_segments() {
        let table = ocv();
        assert_relative_eq!(table.slope(0.25), 1.0);
        assert_relative_eq!(table.slope(0.75), 2.0);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = TableLookup::new("bad", vec![0.0, 1.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { x: 2, y: 1, .. }));
    }
}
