use std::{
    collections::hash_map::DefaultHasher,
    convert::Infallible,
    hash::{Hash, Hasher},
};

use indexmap::IndexMap;
use volta_core::Direction;

use crate::{Side, Symbol};

/// Whether an equation gives a rate (`dx/dt = f`) or a constraint (`0 = g`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquationKind {
    Differential,
    Algebraic,
}

/// The governing equation of one variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Equation {
    pub variable: Symbol,
    pub expression: Symbol,
    pub kind: EquationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    Dirichlet,
    Neumann,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundaryCondition {
    pub kind: BoundaryKind,
    pub value: Symbol,
}

impl BoundaryCondition {
    pub fn dirichlet(value: impl Into<Symbol>) -> Self {
        Self {
            kind: BoundaryKind::Dirichlet,
            value: value.into(),
        }
    }

    pub fn neumann(value: impl Into<Symbol>) -> Self {
        Self {
            kind: BoundaryKind::Neumann,
            value: value.into(),
        }
    }
}

/// Conditions at both ends of the domain of one expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BoundaryConditions {
    pub left: Option<BoundaryCondition>,
    pub right: Option<BoundaryCondition>,
}

impl BoundaryConditions {
    #[must_use]
    pub fn new(left: BoundaryCondition, right: BoundaryCondition) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
        }
    }

    #[must_use]
    pub fn get(&self, side: Side) -> Option<&BoundaryCondition> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }
}

/// A scalar expression whose zero-crossing ends a solve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub name: String,
    pub expression: Symbol,
    pub direction: Direction,
}

/// Equations, conditions, events, and outputs of one model.
///
/// Equations and initial conditions are keyed by variable name. Boundary
/// conditions are keyed by the expression whose spatial derivative needs
/// them, which carries its own domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct System {
    pub equations: IndexMap<String, Equation>,
    pub initial_conditions: IndexMap<String, Symbol>,
    pub boundary_conditions: IndexMap<Symbol, BoundaryConditions>,
    pub events: Vec<Event>,
    pub outputs: IndexMap<String, Symbol>,
}

impl System {
    /// Applies `f` to every expression, boundary-condition keys included.
    ///
    /// Equation variables are left alone.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first error from `f`.
    pub fn try_map<E>(&self, mut f: impl FnMut(&Symbol) -> Result<Symbol, E>) -> Result<Self, E> {
        let mut equations = IndexMap::with_capacity(self.equations.len());
        for (name, eq) in &self.equations {
            let equation = Equation {
                variable: eq.variable.clone(),
                expression: f(&eq.expression)?,
                kind: eq.kind,
            };
            equations.insert(name.clone(), equation);
        }

        let mut initial_conditions = IndexMap::with_capacity(self.initial_conditions.len());
        for (name, ic) in &self.initial_conditions {
            initial_conditions.insert(name.clone(), f(ic)?);
        }

        let mut boundary_conditions: IndexMap<Symbol, BoundaryConditions> = IndexMap::new();
        for (key, bcs) in &self.boundary_conditions {
            let mut map_side = |bc: &Option<BoundaryCondition>| {
                bc.as_ref()
                    .map(|bc| {
                        f(&bc.value).map(|value| BoundaryCondition {
                            kind: bc.kind,
                            value,
                        })
                    })
                    .transpose()
            };
            let mapped = BoundaryConditions {
                left: map_side(&bcs.left)?,
                right: map_side(&bcs.right)?,
            };
            let key = f(key)?;
            let entry = boundary_conditions.entry(key).or_default();
            entry.left = mapped.left.or(entry.left.take());
            entry.right = mapped.right.or(entry.right.take());
        }

        let mut events = Vec::with_capacity(self.events.len());
        for event in &self.events {
            events.push(Event {
                name: event.name.clone(),
                expression: f(&event.expression)?,
                direction: event.direction,
            });
        }

        let mut outputs = IndexMap::with_capacity(self.outputs.len());
        for (name, output) in &self.outputs {
            outputs.insert(name.clone(), f(output)?);
        }

        Ok(Self {
            equations,
            initial_conditions,
            boundary_conditions,
            events,
            outputs,
        })
    }

    /// Infallible [`System::try_map`].
    #[must_use]
    pub fn map(&self, mut f: impl FnMut(&Symbol) -> Symbol) -> Self {
        match self.try_map(|s| Ok::<_, Infallible>(f(s))) {
            Ok(system) => system,
            Err(never) => match never {},
        }
    }

    /// Every expression in the system, equation variables excluded.
    pub fn expressions(&self) -> impl Iterator<Item = &Symbol> {
        let bcs = self.boundary_conditions.iter().flat_map(|(key, bcs)| {
            std::iter::once(key).chain(
                [&bcs.left, &bcs.right]
                    .into_iter()
                    .flatten()
                    .map(|bc| &bc.value),
            )
        });
        self.equations
            .values()
            .map(|eq| &eq.expression)
            .chain(self.initial_conditions.values())
            .chain(bcs)
            .chain(self.events.iter().map(|e| &e.expression))
            .chain(self.outputs.values())
    }

    /// A structural hash over names, kinds, and expressions, in order.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (name, eq) in &self.equations {
            name.hash(&mut hasher);
            eq.hash(&mut hasher);
        }
        for (name, ic) in &self.initial_conditions {
            name.hash(&mut hasher);
            ic.hash(&mut hasher);
        }
        for (key, bcs) in &self.boundary_conditions {
            key.hash(&mut hasher);
            bcs.hash(&mut hasher);
        }
        self.events.hash(&mut hasher);
        for (name, output) in &self.outputs {
            name.hash(&mut hasher);
            output.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Domain, simplify};

    use super::*;

    fn system() -> System {
        let c = Symbol::variable("c", Domain::from("separator"));
        let mut system = System::default();
        system.equations.insert(
            "c".into(),
            Equation {
                variable: c.clone(),
                expression: c.clone().mul(Symbol::parameter("k")).unwrap(),
                kind: EquationKind::Differential,
            },
        );
        system
            .initial_conditions
            .insert("c".into(), Symbol::scalar(1.0).add(0.0).unwrap());
        system.boundary_conditions.insert(
            c.clone().mul(1.0).unwrap(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(0.0),
                BoundaryCondition::dirichlet(Symbol::parameter("c_max")),
            ),
        );
        system.events.push(Event {
            name: "empty".into(),
            expression: c.clone().minimum(),
            direction: Direction::Decreasing,
        });
        system.outputs.insert("c".into(), c);
        system
    }

    #[test]
    fn map_rewrites_boundary_keys() {
        let simplified = system().map(simplify);
        let c = Symbol::variable("c", Domain::from("separator"));

        assert!(simplified.boundary_conditions.contains_key(&c));
        assert_eq!(simplified.initial_conditions["c"], Symbol::scalar(1.0));
    }

    #[test]
    fn expressions_cover_every_part() {
        // equation, initial condition, key, two bc values, event, output
        assert_eq!(system().expressions().count(), 7);
    }

    #[test]
    fn structural_hash_is_stable() {
        assert_eq!(system().structural_hash(), system().structural_hash());

        let mut other = system();
        other.outputs.insert("extra".into(), Symbol::time());
        assert_ne!(system().structural_hash(), other.structural_hash());
    }
}
