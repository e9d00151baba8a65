use thiserror::Error;

use crate::equation::{bisection, newton};

use super::InitialConditionPolicy;

/// Tolerances and limits for the DAE integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub rtol: f64,
    pub atol: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
    /// Limit on step attempts, accepted or rejected.
    pub max_steps: usize,
    pub initialization: InitialConditionPolicy,
    /// Largest algebraic residual accepted as consistent.
    pub consistency_tol: f64,
    pub newton: newton::Config,
    pub events: bisection::Config,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rtol must be finite and non-negative")]
    RelTol,

    #[error("atol must be finite and positive")]
    AbsTol,

    #[error("step sizes must satisfy 0 < min_step <= initial_step <= max_step")]
    StepSizes,

    #[error("max_steps must be at least one")]
    MaxSteps,

    #[error("consistency_tol must be finite and positive")]
    ConsistencyTol,

    #[error("newton: {0}")]
    Newton(#[from] newton::ConfigError),

    #[error("event location: {0}")]
    Events(#[from] bisection::ConfigError),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            initial_step: 1e-3,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            max_steps: 100_000,
            initialization: InitialConditionPolicy::default(),
            consistency_tol: 1e-8,
            newton: newton::Config::default(),
            events: bisection::Config::default(),
        }
    }
}

impl Config {
    /// # Errors
    ///
    /// Names the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rtol.is_finite() || self.rtol < 0.0 {
            return Err(ConfigError::RelTol);
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(ConfigError::AbsTol);
        }
        let ordered = self.min_step > 0.0
            && self.min_step <= self.initial_step
            && self.initial_step <= self.max_step;
        if !ordered || !self.initial_step.is_finite() {
            return Err(ConfigError::StepSizes);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::MaxSteps);
        }
        if !self.consistency_tol.is_finite() || self.consistency_tol <= 0.0 {
            return Err(ConfigError::ConsistencyTol);
        }
        self.newton.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_unordered_steps() {
        let config = Config {
            initial_step: 1.0,
            max_step: 0.5,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::StepSizes));

        let config = Config {
            min_step: 0.0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::StepSizes));
    }

    #[test]
    fn nested_configs_are_checked() {
        let config = Config {
            events: bisection::Config {
                x_abs_tol: f64::NAN,
                ..bisection::Config::default()
            },
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Events(bisection::ConfigError::XAbs))
        );
    }
}
