use std::path::PathBuf;

use thiserror::Error;

use crate::{SymbolError, TableError};

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("parameter `{name}` is undefined (referenced by `{referenced_by}`)")]
    UndefinedParameter { name: String, referenced_by: String },

    #[error("circular parameter definition: {}", cycle.join(" -> "))]
    CircularParameter { cycle: Vec<String> },

    #[error("parameter `{parameter}` refers to unknown function `{function}`")]
    UnknownFunction { parameter: String, function: String },

    #[error("invalid value for parameter `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("failed to read parameters from {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse parameter table")]
    Parse(#[from] toml::de::Error),
}
