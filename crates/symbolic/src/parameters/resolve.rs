use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{Kind, NamedFunction, Symbol, System, TableLookup};

use super::{ParameterError, ParameterValue, ParameterValues};

/// Replaces every parameter in `system` with its value.
///
/// Parameters are defined once each, in dependency order, and the input
/// system is left untouched so one model can be resolved against many
/// parameter sets.
///
/// # Errors
///
/// Fails on undefined or circular parameters, unknown function handles, and
/// values that cannot be applied to their references.
pub fn resolve(system: &System, values: &ParameterValues) -> Result<System, ParameterError> {
    let resolver = Resolver::new(values, system.expressions())?;
    debug!(
        parameters = resolver.definitions.len(),
        "resolved parameter definitions"
    );
    system.try_map(|symbol| resolver.substitute(symbol))
}

/// Resolves the parameters of a single expression.
///
/// # Errors
///
/// See [`resolve`].
pub fn resolve_symbol(symbol: &Symbol, values: &ParameterValues) -> Result<Symbol, ParameterError> {
    Resolver::new(values, std::iter::once(symbol))?.substitute(symbol)
}

#[derive(Debug, Clone)]
enum Definition {
    Fixed(Symbol),
    Table(Arc<TableLookup>),
    Function(Arc<NamedFunction>),
    Input,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Resolver<'a> {
    values: &'a ParameterValues,
    definitions: HashMap<String, Definition>,
}

impl<'a> Resolver<'a> {
    fn new<'s>(
        values: &'a ParameterValues,
        roots: impl Iterator<Item = &'s Symbol>,
    ) -> Result<Self, ParameterError> {
        let mut order = Vec::new();
        let mut marks = HashMap::new();
        let mut stack = Vec::new();

        for root in roots {
            let context = root.to_string();
            for name in referenced_parameters(root) {
                visit(values, &name, &context, &mut marks, &mut stack, &mut order)?;
            }
        }

        let mut resolver = Self {
            values,
            definitions: HashMap::with_capacity(order.len()),
        };
        for name in order {
            let definition = resolver.define(&name)?;
            resolver.definitions.insert(name, definition);
        }
        Ok(resolver)
    }

    /// Builds the definition of `name`, whose dependencies are already defined.
    fn define(&self, name: &str) -> Result<Definition, ParameterError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ParameterError::UndefinedParameter {
                name: name.to_owned(),
                referenced_by: name.to_owned(),
            })?;

        Ok(match value {
            ParameterValue::Constant(x) => Definition::Fixed(Symbol::scalar(*x)),
            ParameterValue::Expression(symbol) => Definition::Fixed(self.substitute(symbol)?),
            ParameterValue::Table(table) => Definition::Table(Arc::clone(table)),
            ParameterValue::Function(handle) => {
                let function = self.values.functions().get(&handle.0).ok_or_else(|| {
                    ParameterError::UnknownFunction {
                        parameter: name.to_owned(),
                        function: handle.0.clone(),
                    }
                })?;
                Definition::Function(function)
            }
            ParameterValue::Input => Definition::Input,
        })
    }

    fn definition(&self, name: &str) -> Result<&Definition, ParameterError> {
        self.definitions
            .get(name)
            .ok_or_else(|| ParameterError::UndefinedParameter {
                name: name.to_owned(),
                referenced_by: "expression".to_owned(),
            })
    }

    fn substitute(&self, symbol: &Symbol) -> Result<Symbol, ParameterError> {
        match symbol.kind() {
            Kind::Parameter(name) => self.plain(name),
            Kind::FunctionParameter { name, inputs } => {
                let inputs = inputs
                    .iter()
                    .map(|input| self.substitute(input))
                    .collect::<Result<Vec<_>, _>>()?;
                self.applied(name, symbol, inputs)
            }
            _ => {
                let children = symbol
                    .children()
                    .into_iter()
                    .map(|child| self.substitute(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(symbol.with_children(children)?)
            }
        }
    }

    fn plain(&self, name: &str) -> Result<Symbol, ParameterError> {
        match self.definition(name)? {
            Definition::Fixed(symbol) => Ok(symbol.clone()),
            Definition::Table(table) => Ok(Symbol::interpolant(Arc::clone(table), Symbol::time())),
            Definition::Function(function) => {
                let args = match function.arity() {
                    0 => Vec::new(),
                    1 => vec![Symbol::time()],
                    arity => {
                        return Err(ParameterError::InvalidValue {
                            name: name.to_owned(),
                            reason: format!(
                                "function `{}` takes {arity} arguments but the parameter has no inputs",
                                function.name()
                            ),
                        });
                    }
                };
                Ok(Symbol::function(Arc::clone(function), args)?)
            }
            Definition::Input => Ok(Symbol::input_parameter(name)),
        }
    }

    /// Resolves a function parameter applied to already-resolved `inputs`.
    fn applied(
        &self,
        name: &str,
        node: &Symbol,
        inputs: Vec<Symbol>,
    ) -> Result<Symbol, ParameterError> {
        let resolved = match self.definition(name)? {
            Definition::Fixed(symbol) => symbol.clone(),
            Definition::Input => Symbol::input_parameter(name),
            Definition::Table(table) => {
                let Some(first) = inputs.into_iter().next() else {
                    return Err(ParameterError::InvalidValue {
                        name: name.to_owned(),
                        reason: "a table needs at least one input".to_owned(),
                    });
                };
                Symbol::interpolant(Arc::clone(table), first)
            }
            Definition::Function(function) => {
                if function.arity() != inputs.len() {
                    return Err(ParameterError::InvalidValue {
                        name: name.to_owned(),
                        reason: format!(
                            "function `{}` takes {} arguments, got {}",
                            function.name(),
                            function.arity(),
                            inputs.len()
                        ),
                    });
                }
                Symbol::function(Arc::clone(function), inputs)?
            }
        };

        if resolved.domain().is_empty() && !node.domain().is_empty() {
            Ok(Symbol::broadcast(resolved, node.domain().clone())?)
        } else {
            Ok(resolved)
        }
    }
}

/// Depth-first visit that appends `name` after all of its dependencies.
fn visit(
    values: &ParameterValues,
    name: &str,
    referenced_by: &str,
    marks: &mut HashMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), ParameterError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].to_vec();
            cycle.push(name.to_owned());
            return Err(ParameterError::CircularParameter { cycle });
        }
        None => {}
    }

    let value = values
        .get(name)
        .ok_or_else(|| ParameterError::UndefinedParameter {
            name: name.to_owned(),
            referenced_by: referenced_by.to_owned(),
        })?;

    marks.insert(name.to_owned(), Mark::Visiting);
    stack.push(name.to_owned());
    if let ParameterValue::Expression(symbol) = value {
        for dependency in referenced_parameters(symbol) {
            visit(values, &dependency, name, marks, stack, order)?;
        }
    }
    stack.pop();
    marks.insert(name.to_owned(), Mark::Done);
    order.push(name.to_owned());
    Ok(())
}

/// Parameter names referenced below `symbol`, in tree order without repeats.
fn referenced_parameters(symbol: &Symbol) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    symbol.visit(&mut |s| {
        if let Kind::Parameter(name) | Kind::FunctionParameter { name, .. } = s.kind()
            && !names.contains(name)
        {
            names.push(name.clone());
        }
    });
    names
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use approx::assert_relative_eq;
    use volta_core::Direction;

    use crate::{
        Domain, EvalContext, Equation, EquationKind, Event, FunctionTable, Inputs, Value,
        parameters::FunctionHandle,
    };

    use super::*;

    fn c() -> Symbol {
        Symbol::variable("c", Domain::from("separator"))
    }

    fn scalar_at(symbol: &Symbol, t: f64) -> f64 {
        symbol.evaluate(&EvalContext::new(t)).unwrap().as_scalar().unwrap()
    }

    #[test]
    fn constants_and_expressions_resolve_in_dependency_order() {
        let mut values = ParameterValues::new();
        values
            .set("area", Symbol::parameter("width").mul(Symbol::parameter("height")).unwrap())
            .set("width", 2.0)
            .set("height", Symbol::parameter("width").mul(1.5).unwrap());

        let resolved = resolve_symbol(&Symbol::parameter("area"), &values).unwrap();
        assert_relative_eq!(scalar_at(&resolved, 0.0), 6.0);
    }

    #[test]
    fn cycles_are_reported_with_their_path() {
        let mut values = ParameterValues::new();
        values
            .set("A", Symbol::parameter("B").add(1.0).unwrap())
            .set("B", Symbol::parameter("A").mul(2.0).unwrap());

        let err = resolve_symbol(&Symbol::parameter("A"), &values).unwrap_err();
        match err {
            ParameterError::CircularParameter { cycle } => {
                assert_eq!(cycle, vec!["A", "B", "A"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut values = ParameterValues::new();
        values.set("A", Symbol::parameter("A"));
        assert!(matches!(
            resolve_symbol(&Symbol::parameter("A"), &values),
            Err(ParameterError::CircularParameter { .. })
        ));
    }

    #[test]
    fn undefined_parameters_name_their_referrer() {
        let mut values = ParameterValues::new();
        values.set("D", Symbol::parameter("D_ref").mul(2.0).unwrap());

        let err = resolve_symbol(&Symbol::parameter("D"), &values).unwrap_err();
        assert!(matches!(
            err,
            ParameterError::UndefinedParameter { ref name, ref referenced_by }
                if name == "D_ref" && referenced_by == "D"
        ));
    }

    #[test]
    fn unknown_function_handles_fail() {
        let mut values = ParameterValues::new();
        values.set("I", FunctionHandle::from("drive cycle"));
        assert!(matches!(
            resolve_symbol(&Symbol::parameter("I"), &values),
            Err(ParameterError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn tables_and_functions_of_time() {
        let mut functions = FunctionTable::new();
        functions.register(NamedFunction::new("ramp", 1, |t| 2.0 * t[0]));
        let mut values = ParameterValues::new().with_functions(functions);
        values
            .set("I", FunctionHandle::from("ramp"))
            .set(
                "T",
                TableLookup::new("ambient", vec![0.0, 10.0], vec![300.0, 310.0]).unwrap(),
            );

        let current = resolve_symbol(&Symbol::parameter("I"), &values).unwrap();
        let temperature = resolve_symbol(&Symbol::parameter("T"), &values).unwrap();
        assert_relative_eq!(scalar_at(&current, 3.0), 6.0);
        assert_relative_eq!(scalar_at(&temperature, 5.0), 305.0);
    }

    #[test]
    fn function_parameters_apply_to_their_inputs() {
        let mut functions = FunctionTable::new();
        functions.register(NamedFunction::new("diffusivity", 1, |c| 1e-10 * (1.0 + c[0])));
        let mut values = ParameterValues::new().with_functions(functions);
        values.set("D_e", FunctionHandle::from("diffusivity"));

        let d = Symbol::function_parameter("D_e", vec![c()]).unwrap();
        let resolved = resolve_symbol(&d, &values).unwrap();

        assert!(matches!(resolved.kind(), Kind::Function { .. }));
        assert_eq!(resolved.domain(), c().domain());

        let variables = HashMap::from([("c".to_owned(), Value::Scalar(1.0))]);
        let value = resolved
            .evaluate(&EvalContext::new(0.0).with_variables(&variables))
            .unwrap();
        assert_relative_eq!(value.as_scalar().unwrap(), 2e-10);
    }

    #[test]
    fn constant_function_parameters_keep_their_domain() {
        let mut values = ParameterValues::new();
        values.set("D_e", 3.0);

        let d = Symbol::function_parameter("D_e", vec![c()]).unwrap();
        let resolved = resolve_symbol(&d, &values).unwrap();
        assert_eq!(resolved.domain(), c().domain());
        assert_eq!(resolved.as_scalar(), Some(3.0));
    }

    #[test]
    fn inputs_stay_symbolic() {
        let mut values = ParameterValues::new();
        values.set("Current function [A]", ParameterValue::Input);

        let resolved =
            resolve_symbol(&Symbol::parameter("Current function [A]"), &values).unwrap();
        let inputs: Inputs = HashMap::from([("Current function [A]".to_owned(), 0.7)]);
        let value = resolved
            .evaluate(&EvalContext::new(0.0).with_inputs(&inputs))
            .unwrap();
        assert_eq!(value, Value::Scalar(0.7));
    }

    #[test]
    fn whole_systems_resolve_without_mutating_the_input() {
        let mut system = System::default();
        system.equations.insert(
            "c".into(),
            Equation {
                variable: c(),
                expression: c().mul(Symbol::parameter("k")).unwrap().neg(),
                kind: EquationKind::Differential,
            },
        );
        system
            .initial_conditions
            .insert("c".into(), Symbol::parameter("c0"));
        system.events.push(Event {
            name: "low".into(),
            expression: c().minimum().sub(Symbol::parameter("c_min")).unwrap(),
            direction: Direction::Decreasing,
        });

        let mut values = ParameterValues::new();
        values.set("k", 1.0).set("c0", 1.0).set("c_min", 0.1);

        let resolved = resolve(&system, &values).unwrap();
        let still_symbolic = |s: &Symbol| s.any(&|n| matches!(n.kind(), Kind::Parameter(_)));

        assert!(!resolved.expressions().any(still_symbolic));
        assert!(system.expressions().any(still_symbolic));
    }
}
