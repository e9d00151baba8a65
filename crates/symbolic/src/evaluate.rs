use std::collections::HashMap;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use volta_core::sparse;

use crate::{
    BinaryOp, EvalError, Kind, NamedFunction, ReduceOp, Symbol, TableLookup, Value,
};

/// Runtime input values, keyed by parameter name.
pub type Inputs = HashMap<String, f64>;

/// Everything a symbol may read while being evaluated.
///
/// Discretized trees read `t`, `y`, and `inputs`. Symbolic trees may
/// instead bind variables and parameters by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub t: f64,
    pub y: Option<&'a DVector<f64>>,
    pub variables: Option<&'a HashMap<String, Value>>,
    pub parameters: Option<&'a HashMap<String, f64>>,
    pub inputs: Option<&'a Inputs>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(t: f64) -> Self {
        Self {
            t,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_state(mut self, y: &'a DVector<f64>) -> Self {
        self.y = Some(y);
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: &'a HashMap<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: &'a HashMap<String, f64>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: &'a Inputs) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub(crate) fn variable(&self, name: &str) -> Result<Value, EvalError> {
        self.variables
            .and_then(|vars| vars.get(name))
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable {
                name: name.to_owned(),
            })
    }

    pub(crate) fn parameter(&self, name: &str) -> Result<f64, EvalError> {
        self.parameters
            .and_then(|params| params.get(name))
            .copied()
            .ok_or_else(|| EvalError::UnboundParameter {
                name: name.to_owned(),
            })
    }

    pub(crate) fn input(&self, name: &str) -> Result<f64, EvalError> {
        self.inputs
            .and_then(|inputs| inputs.get(name))
            .copied()
            .ok_or_else(|| EvalError::UnboundInput {
                name: name.to_owned(),
            })
    }

    pub(crate) fn state_slice(
        &self,
        symbol: &Symbol,
        name: &str,
        start: usize,
        len: usize,
    ) -> Result<Value, EvalError> {
        let y = self.y.ok_or_else(|| EvalError::MissingState {
            symbol: symbol.to_string(),
        })?;
        if start + len > y.len() {
            return Err(EvalError::StateOutOfRange {
                name: name.to_owned(),
                start,
                end: start + len,
                len: y.len(),
            });
        }
        Ok(shape(symbol, y.rows(start, len).into_owned()))
    }
}

/// Collapses a length-one vector on the empty domain to a scalar.
pub(crate) fn shape(symbol: &Symbol, values: DVector<f64>) -> Value {
    if values.len() == 1 && symbol.domain().is_empty() {
        Value::Scalar(values[0])
    } else {
        Value::Vector(values)
    }
}

pub(crate) fn combine(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    left.zip_with(right, |a, b| op.apply(a, b))
        .ok_or_else(|| EvalError::ShapeMismatch {
            operator: format!("{op:?}"),
            left: left.len(),
            right: right.len(),
        })
}

/// Common broadcast length of function arguments.
pub(crate) fn args_len(name: &str, args: &[Value]) -> Result<usize, EvalError> {
    let mut len = 1;
    for arg in args {
        len = match (len, arg.len()) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            (a, b) => {
                return Err(EvalError::ShapeMismatch {
                    operator: name.to_owned(),
                    left: a,
                    right: b,
                });
            }
        };
    }
    Ok(len)
}

/// Evaluates `function` (or one of its partials) entrywise over broadcast args.
pub(crate) fn call_function(
    function: &NamedFunction,
    partials: &[usize],
    args: &[Value],
) -> Result<Value, EvalError> {
    let all_scalar = args.iter().all(|a| matches!(a, Value::Scalar(_)));
    let len = args_len(function.name(), args)?;
    let mut point = vec![0.0; args.len()];
    let mut at = |i: usize| {
        for (slot, arg) in point.iter_mut().zip(args) {
            *slot = arg.get(i);
        }
        function.partial(partials, &point)
    };
    if all_scalar {
        Ok(Value::Scalar(at(0)))
    } else {
        Ok(Value::Vector(DVector::from_fn(len, |i, _| at(i))))
    }
}

pub(crate) fn lookup(
    table: &TableLookup,
    derivative: bool,
    at: &Value,
) -> Result<Value, EvalError> {
    if derivative {
        return Ok(at.map(|x| table.slope(x)));
    }
    at.try_map(|x| table.value(x))
        .map_err(|source| EvalError::Interpolation {
            table: table.name().to_owned(),
            source,
        })
}

pub(crate) fn reduce(op: ReduceOp, values: &Value) -> (usize, f64) {
    if values.is_empty() {
        return (0, f64::NAN);
    }
    let mut best = (0, values.get(0));
    for (i, x) in values.iter().enumerate().skip(1) {
        let better = match op {
            ReduceOp::Min => x < best.1,
            ReduceOp::Max => x > best.1,
        };
        if better {
            best = (i, x);
        }
    }
    best
}

/// Expands a child value to the column count of a linear map.
pub(crate) fn map_input(
    matrix: &CsrMatrix<f64>,
    child: &Value,
) -> Result<DVector<f64>, EvalError> {
    if child.len() != matrix.ncols() && child.len() != 1 {
        return Err(EvalError::ShapeMismatch {
            operator: "linear_map".to_owned(),
            left: matrix.ncols(),
            right: child.len(),
        });
    }
    Ok(child.to_vector(matrix.ncols()))
}

impl Symbol {
    /// Evaluates the tree.
    ///
    /// Spatial operators and unbound variables fail: discretize first, or
    /// bind variables through the context.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] naming the node that could not be evaluated.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match self.kind() {
            Kind::Scalar(x) => Ok(Value::Scalar(*x)),
            Kind::Time => Ok(Value::Scalar(ctx.t)),
            Kind::Variable(name) => ctx.variable(name),
            Kind::Parameter(name) => ctx.parameter(name).map(Value::Scalar),
            Kind::InputParameter(name) => ctx.input(name).map(Value::Scalar),
            Kind::FunctionParameter { .. } | Kind::Spatial { .. } => {
                Err(EvalError::NotDiscretized {
                    symbol: self.to_string(),
                })
            }
            Kind::Binary { op, left, right } => {
                combine(*op, &left.evaluate(ctx)?, &right.evaluate(ctx)?)
            }
            Kind::Unary { op, child } => Ok(child.evaluate(ctx)?.map(|x| op.apply(x))),
            Kind::Reduce { op, child } => {
                let values = child.evaluate(ctx)?;
                Ok(Value::Scalar(reduce(*op, &values).1))
            }
            Kind::Broadcast(child) => child.evaluate(ctx),
            Kind::Concatenation(children) => {
                let mut stacked = Vec::new();
                for child in children {
                    stacked.extend(child.evaluate(ctx)?.iter());
                }
                Ok(Value::Vector(DVector::from_vec(stacked)))
            }
            Kind::Function {
                function,
                args,
                partials,
            } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(function, partials, &args)
            }
            Kind::Interpolant {
                table,
                child,
                derivative,
            } => lookup(table, *derivative, &child.evaluate(ctx)?),
            Kind::StateVector { name, start, len } => ctx.state_slice(self, name, *start, *len),
            Kind::Vector(values) => Ok(shape(self, values.as_ref().clone())),
            Kind::LinearMap { matrix, child } => {
                let input = map_input(matrix, &child.evaluate(ctx)?)?;
                Ok(shape(self, sparse::mul_vec(matrix, &input)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use approx::assert_relative_eq;

    use crate::Domain;

    #[test]
    fn evaluates_arithmetic_over_bindings() {
        let x = Symbol::variable("x", Domain::empty());
        let expr = x
            .clone()
            .mul(Symbol::parameter("k"))
            .unwrap()
            .add(Symbol::time())
            .unwrap();

        let variables = HashMap::from([("x".to_owned(), Value::Scalar(3.0))]);
        let parameters = HashMap::from([("k".to_owned(), 2.0)]);
        let ctx = EvalContext::new(0.5)
            .with_variables(&variables)
            .with_parameters(&parameters);

        assert_relative_eq!(expr.evaluate(&ctx).unwrap().as_scalar().unwrap(), 6.5);
    }

    #[test]
    fn unbound_names_are_reported() {
        let err = Symbol::input_parameter("Current function [A]")
            .evaluate(&EvalContext::default())
            .unwrap_err();
        assert!(matches!(err, EvalError::UnboundInput { name } if name == "Current function [A]"));
    }

    #[test]
    fn spatial_operators_need_discretization() {
        let c = Symbol::variable("c", Domain::from("separator"));
        let err = c.gradient().unwrap().evaluate(&EvalContext::default());
        assert!(matches!(err, Err(EvalError::NotDiscretized { .. })));
    }

    #[test]
    fn state_slices_and_linear_maps() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let ctx = EvalContext::new(0.0).with_state(&y);

        let slice = Symbol::state_vector("c", 1, 2, "separator");
        assert_eq!(
            slice.evaluate(&ctx).unwrap(),
            Value::Vector(DVector::from_vec(vec![2.0, 3.0]))
        );

        let sum = sparse::from_triplets(1, 2, [(0, 0, 1.0), (0, 1, 1.0)]);
        let total = Symbol::linear_map(Arc::new(sum), slice, Domain::empty());
        assert_eq!(total.evaluate(&ctx).unwrap(), Value::Scalar(5.0));

        let past_end = Symbol::state_vector("c", 3, 2, "separator");
        assert!(matches!(
            past_end.evaluate(&ctx),
            Err(EvalError::StateOutOfRange { end: 5, len: 4, .. })
        ));
    }

    #[test]
    fn functions_broadcast_over_vectors() {
        let f = Arc::new(NamedFunction::new("scale", 2, |x| x[0] * x[1]));
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let ctx = EvalContext::new(0.0).with_state(&y);
        let expr = Symbol::function(
            f,
            vec![Symbol::state_vector("c", 0, 2, "separator"), Symbol::scalar(10.0)],
        )
        .unwrap();

        let value = expr.evaluate(&ctx).unwrap();
        assert_relative_eq!(value.get(0), 10.0);
        assert_relative_eq!(value.get(1), 20.0);
    }
}
