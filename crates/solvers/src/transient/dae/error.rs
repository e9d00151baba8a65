use std::error::Error as StdError;

use thiserror::Error;

use crate::equation::{bisection, newton};

use super::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("time span [{start}, {end}] must be finite and increasing")]
    InvalidSpan { start: f64, end: f64 },

    #[error("problem evaluation failed at t = {t}")]
    Problem {
        t: f64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("initial conditions are inconsistent at t = {t}: algebraic row {row} has residual {residual:e}")]
    InconsistentInitialCondition { t: f64, row: usize, residual: f64 },

    #[error("step size {h:e} fell below the minimum at t = {t}")]
    StepSizeTooSmall { t: f64, h: f64 },

    #[error("step limit of {steps} reached at t = {t}")]
    MaxStepsExceeded { t: f64, steps: usize },

    #[error("Newton iteration failed at t = {t} with step {h:e}")]
    NewtonFailed {
        t: f64,
        h: f64,
        #[source]
        source: newton::Error,
    },

    #[error("could not locate event {index} in [{t0}, {t1}]")]
    EventLocation {
        index: usize,
        t0: f64,
        t1: f64,
        #[source]
        source: bisection::Error,
    },
}

impl Error {
    pub(crate) fn problem<E: StdError + Send + Sync + 'static>(t: f64, err: E) -> Self {
        Self::Problem {
            t,
            source: Box::new(err),
        }
    }

    /// The last time the integrator reached successfully, if the failure
    /// happened while stepping.
    #[must_use]
    pub fn last_time(&self) -> Option<f64> {
        match self {
            Self::Problem { t, .. }
            | Self::InconsistentInitialCondition { t, .. }
            | Self::StepSizeTooSmall { t, .. }
            | Self::MaxStepsExceeded { t, .. }
            | Self::NewtonFailed { t, .. } => Some(*t),
            Self::EventLocation { t0, .. } => Some(*t0),
            Self::InvalidConfig(_) | Self::InvalidSpan { .. } => None,
        }
    }
}
