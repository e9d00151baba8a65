use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::debug;
use volta_core::Direction;
use volta_discretization::{DiscretizationError, DiscretizedModel, Mesh, MeshError, discretize};
use volta_symbolic::{
    BoundaryConditions, Equation, EquationKind, Event, Kind, Symbol, SymbolError, System,
    parameters::{ParameterError, ParameterValues, resolve},
    simplify_system,
};

use crate::Solution;

/// Where a [`Model`] is in its lifecycle.
///
/// Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Constructing,
    Resolved,
    Simplified,
    Discretized,
    Solved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Constructing => "constructing",
            Stage::Resolved => "resolved",
            Stage::Simplified => "simplified",
            Stage::Discretized => "discretized",
            Stage::Solved => "solved",
        })
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model `{model}` is {stage} and can no longer be changed")]
    ModelFrozen { model: String, stage: Stage },

    #[error("cannot move a model from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("`{symbol}` is not a variable")]
    NotAVariable { symbol: String },

    #[error("variable `{name}` already has a governing equation")]
    DuplicateEquation { name: String },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Discretization(#[from] DiscretizationError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

#[derive(Debug, Clone)]
enum Content {
    Symbolic(System),
    Numeric {
        discretized: Arc<DiscretizedModel>,
        solution: Option<Arc<Solution>>,
    },
}

/// A named system of equations and its lifecycle stage.
///
/// Equations, conditions, events, and outputs can only be added while the
/// model is [`Stage::Constructing`]. Each transition returns a new model and
/// leaves the receiver untouched.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    stage: Stage,
    content: Content,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: Stage::Constructing,
            content: Content::Symbolic(System::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The symbolic system, until the model is discretized.
    #[must_use]
    pub fn system(&self) -> Option<&System> {
        match &self.content {
            Content::Symbolic(system) => Some(system),
            Content::Numeric { .. } => None,
        }
    }

    #[must_use]
    pub fn discretized(&self) -> Option<&Arc<DiscretizedModel>> {
        match &self.content {
            Content::Numeric { discretized, .. } => Some(discretized),
            Content::Symbolic(_) => None,
        }
    }

    #[must_use]
    pub fn solution(&self) -> Option<&Solution> {
        match &self.content {
            Content::Numeric {
                solution: Some(solution),
                ..
            } => Some(solution),
            _ => None,
        }
    }

    /// Adds `d variable / dt = rhs`.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen, `variable` is not a variable, or it
    /// already has an equation.
    pub fn add_rhs(&mut self, variable: Symbol, rhs: Symbol) -> Result<&mut Self, ModelError> {
        self.add_equation(variable, rhs, EquationKind::Differential)
    }

    /// Adds the constraint `0 = residual`, solved for `variable`.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen, `variable` is not a variable, or it
    /// already has an equation.
    pub fn add_algebraic(
        &mut self,
        variable: Symbol,
        residual: Symbol,
    ) -> Result<&mut Self, ModelError> {
        self.add_equation(variable, residual, EquationKind::Algebraic)
    }

    fn add_equation(
        &mut self,
        variable: Symbol,
        expression: Symbol,
        kind: EquationKind,
    ) -> Result<&mut Self, ModelError> {
        let name = variable_name(&variable)?;
        let system = self.system_mut()?;
        if system.equations.contains_key(&name) {
            return Err(ModelError::DuplicateEquation { name });
        }
        system.equations.insert(
            name,
            Equation {
                variable,
                expression,
                kind,
            },
        );
        Ok(self)
    }

    /// Sets the initial value of `variable`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen or `variable` is not a variable.
    pub fn set_initial_condition(
        &mut self,
        variable: &Symbol,
        value: impl Into<Symbol>,
    ) -> Result<&mut Self, ModelError> {
        let name = variable_name(variable)?;
        self.system_mut()?
            .initial_conditions
            .insert(name, value.into());
        Ok(self)
    }

    /// Sets the boundary conditions for the spatial derivatives of `expression`.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen.
    pub fn set_boundary_conditions(
        &mut self,
        expression: Symbol,
        conditions: BoundaryConditions,
    ) -> Result<&mut Self, ModelError> {
        self.system_mut()?
            .boundary_conditions
            .insert(expression, conditions);
        Ok(self)
    }

    /// Adds an event that ends a solve when `expression` crosses zero.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen.
    pub fn add_event(
        &mut self,
        name: impl Into<String>,
        expression: Symbol,
        direction: Direction,
    ) -> Result<&mut Self, ModelError> {
        self.system_mut()?.events.push(Event {
            name: name.into(),
            expression,
            direction,
        });
        Ok(self)
    }

    /// Registers a named output, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Fails if the model is frozen.
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        expression: Symbol,
    ) -> Result<&mut Self, ModelError> {
        self.system_mut()?.outputs.insert(name.into(), expression);
        Ok(self)
    }

    /// Substitutes parameter values throughout the model.
    ///
    /// # Errors
    ///
    /// Fails outside [`Stage::Constructing`] or when resolution fails.
    pub fn resolve(&self, values: &ParameterValues) -> Result<Model, ModelError> {
        let system = self.symbolic(Stage::Constructing, Stage::Resolved)?;
        let resolved = resolve(system, values)?;
        debug!(model = %self.name, parameters = values.len(), "resolved parameters");
        Ok(self.advance(Stage::Resolved, Content::Symbolic(resolved)))
    }

    /// # Errors
    ///
    /// Fails outside [`Stage::Resolved`].
    pub fn simplify(&self) -> Result<Model, ModelError> {
        let system = self.symbolic(Stage::Resolved, Stage::Simplified)?;
        let simplified = simplify_system(system);
        debug!(model = %self.name, "simplified");
        Ok(self.advance(Stage::Simplified, Content::Symbolic(simplified)))
    }

    /// # Errors
    ///
    /// Fails outside [`Stage::Simplified`] or when discretization fails.
    pub fn discretize(&self, mesh: &Mesh) -> Result<Model, ModelError> {
        let system = self.symbolic(Stage::Simplified, Stage::Discretized)?;
        let discretized = discretize(system, mesh)?;
        debug!(
            model = %self.name,
            states = discretized.state_len(),
            "discretized"
        );
        Ok(self.advance(
            Stage::Discretized,
            Content::Numeric {
                discretized: Arc::new(discretized),
                solution: None,
            },
        ))
    }

    /// Attaches a solution to a discretized model.
    ///
    /// # Errors
    ///
    /// Fails outside [`Stage::Discretized`].
    pub fn solved(&self, solution: Solution) -> Result<Model, ModelError> {
        let transition = ModelError::InvalidTransition {
            from: self.stage,
            to: Stage::Solved,
        };
        let (Stage::Discretized, Content::Numeric { discretized, .. }) = (self.stage, &self.content)
        else {
            return Err(transition);
        };
        Ok(self.advance(
            Stage::Solved,
            Content::Numeric {
                discretized: Arc::clone(discretized),
                solution: Some(Arc::new(solution)),
            },
        ))
    }

    fn advance(&self, stage: Stage, content: Content) -> Model {
        Model {
            name: self.name.clone(),
            stage,
            content,
        }
    }

    pub(crate) fn symbolic(&self, from: Stage, to: Stage) -> Result<&System, ModelError> {
        match &self.content {
            Content::Symbolic(system) if self.stage == from => Ok(system),
            _ => Err(ModelError::InvalidTransition {
                from: self.stage,
                to,
            }),
        }
    }

    fn system_mut(&mut self) -> Result<&mut System, ModelError> {
        match &mut self.content {
            Content::Symbolic(system) if self.stage == Stage::Constructing => Ok(system),
            _ => Err(ModelError::ModelFrozen {
                model: self.name.clone(),
                stage: self.stage,
            }),
        }
    }
}

fn variable_name(symbol: &Symbol) -> Result<String, ModelError> {
    match symbol.kind() {
        Kind::Variable(name) => Ok(name.clone()),
        _ => Err(ModelError::NotAVariable {
            symbol: symbol.to_string(),
        }),
    }
}
