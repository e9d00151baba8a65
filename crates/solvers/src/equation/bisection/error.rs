use std::error::Error as StdError;

use thiserror::Error;

use crate::equation::EvalError;

use super::{bracket::BracketError, config::ConfigError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bracket: {0}")]
    InvalidBracket(#[from] BracketError),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("residual at x = {x} is not finite ({residual})")]
    NonFiniteResidual { x: f64, residual: f64 },

    #[error("evaluation at x = {x} failed")]
    Evaluation {
        x: f64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    pub(super) fn evaluation<IE, ME, RE>(x: f64, err: EvalError<IE, ME, RE>) -> Self
    where
        IE: StdError + Send + Sync + 'static,
        ME: StdError + Send + Sync + 'static,
        RE: StdError + Send + Sync + 'static,
    {
        let source: Box<dyn StdError + Send + Sync> = match err {
            EvalError::Input(e) => Box::new(e),
            EvalError::Model(e) => Box::new(e),
            EvalError::Residual(e) => Box::new(e),
        };
        Self::Evaluation { x, source }
    }
}
