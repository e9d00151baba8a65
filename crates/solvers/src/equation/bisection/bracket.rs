use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BracketError {
    #[error("bracket endpoints must be finite")]
    NonFinite,

    #[error("bracket has zero width")]
    ZeroWidth,

    #[error("residuals at both endpoints have the same sign")]
    NoSignChange,
}

/// The sign of a residual, with zero counted as positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    #[must_use]
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }
}

/// An ordered interval known to contain a sign change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    left: f64,
    right: f64,
    left_sign: Sign,
}

impl Bracket {
    /// Orders the endpoints and checks that they are finite and distinct.
    pub(super) fn bounds(bracket: [f64; 2]) -> Result<[f64; 2], BracketError> {
        let [a, b] = bracket;
        if !a.is_finite() || !b.is_finite() {
            return Err(BracketError::NonFinite);
        }
        #[allow(clippy::float_cmp)]
        if a == b {
            return Err(BracketError::ZeroWidth);
        }
        Ok(if a < b { [a, b] } else { [b, a] })
    }

    pub(super) fn new(
        [left, right]: [f64; 2],
        left_residual: f64,
        right_residual: f64,
    ) -> Result<Self, BracketError> {
        let left_sign = Sign::of(left_residual);
        if left_sign == Sign::of(right_residual) {
            return Err(BracketError::NoSignChange);
        }
        Ok(Self {
            left,
            right,
            left_sign,
        })
    }

    #[must_use]
    pub fn as_array(&self) -> [f64; 2] {
        [self.left, self.right]
    }

    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.left + self.right)
    }

    #[must_use]
    pub fn is_x_converged(&self, x_abs_tol: f64, x_rel_tol: f64) -> bool {
        self.right - self.left <= x_abs_tol + x_rel_tol * self.midpoint().abs()
    }

    /// Replaces the endpoint whose residual has the same sign as `residual`.
    pub(super) fn shrink(&mut self, x: f64, residual: f64) {
        if Sign::of(residual) == self.left_sign {
            self.left = x;
        } else {
            self.right = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn bounds_are_ordered_and_checked() {
        assert_eq!(Bracket::bounds([3.0, 1.0]), Ok([1.0, 3.0]));
        assert_eq!(Bracket::bounds([f64::NAN, 1.0]), Err(BracketError::NonFinite));
        assert_eq!(Bracket::bounds([2.0, 2.0]), Err(BracketError::ZeroWidth));
    }

    #[test]
    fn requires_a_sign_change() {
        assert_eq!(
            Bracket::new([0.0, 1.0], 1.0, 2.0),
            Err(BracketError::NoSignChange)
        );
        // Zero counts as positive.
        assert!(Bracket::new([0.0, 1.0], -1.0, 0.0).is_ok());
    }

    #[test]
    fn shrink_keeps_the_sign_change() {
        let mut bracket = Bracket::new([0.0, 2.0], -1.0, 1.0).unwrap();

        bracket.shrink(1.0, -0.5);
        assert_eq!(bracket.as_array(), [1.0, 2.0]);

        bracket.shrink(1.5, 0.25);
        assert_eq!(bracket.as_array(), [1.0, 1.5]);
        assert_relative_eq!(bracket.midpoint(), 1.25);
    }
}
