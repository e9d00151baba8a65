use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;
use volta_discretization::MeshPoints;
use volta_solvers::transient::dae::{self, InitialConditionPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid simulation config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid solver settings: {0}")]
    Solver(#[from] dae::ConfigError),
}

/// Solver tolerances, initialization policy, and mesh points.
///
/// Every field is optional in TOML and defaults to the integrator's
/// defaults:
///
/// ```toml
/// rtol = 1e-6
/// atol = 1e-8
/// initialization = "reject"
///
/// [mesh]
/// "negative electrode" = 10
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub rtol: f64,
    pub atol: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
    pub max_steps: usize,
    pub initialization: InitialConditionPolicy,
    pub consistency_tol: f64,
    /// Cells per subdomain, overriding a chemistry's defaults.
    pub mesh: MeshPoints,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let solver = dae::Config::default();
        Self {
            rtol: solver.rtol,
            atol: solver.atol,
            initial_step: solver.initial_step,
            min_step: solver.min_step,
            max_step: solver.max_step,
            max_steps: solver.max_steps,
            initialization: solver.initialization,
            consistency_tol: solver.consistency_tol,
            mesh: MeshPoints::new(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Fails if the text is not valid TOML for this config or the solver
    /// settings are out of range.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.solver()?;
        Ok(config)
    }

    /// Reads a config from an explicit path.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The validated integrator config.
    ///
    /// # Errors
    ///
    /// Names the first out-of-range setting.
    pub fn solver(&self) -> Result<dae::Config, ConfigError> {
        let config = dae::Config {
            rtol: self.rtol,
            atol: self.atol,
            initial_step: self.initial_step,
            min_step: self.min_step,
            max_step: self.max_step,
            max_steps: self.max_steps,
            initialization: self.initialization,
            consistency_tol: self.consistency_tol,
            ..dae::Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// `defaults` with this config's mesh points layered on top.
    #[must_use]
    pub fn mesh_points(&self, defaults: &MeshPoints) -> MeshPoints {
        let mut points = defaults.clone();
        points.extend(self.mesh.iter().map(|(k, v)| (k.clone(), *v)));
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_gives_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.solver().unwrap(), dae::Config::default());
    }

    #[test]
    fn reads_policy_and_mesh() {
        let config = SimulationConfig::from_toml_str(
            r#"
            rtol = 1e-5
            initialization = "reject"

            [mesh]
            "negative particle" = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.rtol, 1e-5);
        assert_eq!(config.initialization, InitialConditionPolicy::Reject);

        let defaults = MeshPoints::from([
            ("negative particle".to_owned(), 5),
            ("positive particle".to_owned(), 5),
        ]);
        let points = config.mesh_points(&defaults);
        assert_eq!(points["negative particle"], 12);
        assert_eq!(points["positive particle"], 5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SimulationConfig::from_toml_str("atol = -1.0"),
            Err(ConfigError::Solver(dae::ConfigError::AbsTol))
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("tolerance = 1.0"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SimulationConfig::from_path("/nonexistent/volta.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
