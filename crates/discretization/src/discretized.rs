use std::collections::BTreeSet;

use indexmap::IndexMap;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use volta_core::{DaeProblem, Direction, sparse};
use volta_symbolic::{Domain, EquationKind, EvalContext, EvalError, Inputs, Kind, Symbol, Value};

/// Where one variable lives in the global state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSlot {
    pub name: String,
    pub domain: Domain,
    pub start: usize,
    pub len: usize,
    pub kind: EquationKind,
}

impl StateSlot {
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteEvent {
    pub name: String,
    pub expression: Symbol,
    pub direction: Direction,
}

/// A system reduced to expressions over one global state vector.
///
/// Holds one right-hand-side and one initial-condition expression per
/// state slot, in layout order. Runtime inputs stay symbolic until
/// [`DiscretizedModel::bind`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiscretizedModel {
    layout: IndexMap<String, StateSlot>,
    state_len: usize,
    mass: CsrMatrix<f64>,
    rhs: Vec<Symbol>,
    initial: Vec<Symbol>,
    events: Vec<DiscreteEvent>,
    outputs: IndexMap<String, Symbol>,
}

impl DiscretizedModel {
    pub(crate) fn new(
        layout: IndexMap<String, StateSlot>,
        mass: CsrMatrix<f64>,
        rhs: Vec<Symbol>,
        initial: Vec<Symbol>,
        events: Vec<DiscreteEvent>,
        outputs: IndexMap<String, Symbol>,
    ) -> Self {
        let state_len: usize = layout.values().map(|slot| slot.len).sum();
        Self {
            layout,
            state_len,
            mass,
            rhs,
            initial,
            events,
            outputs,
        }
    }

    #[must_use]
    pub fn layout(&self) -> &IndexMap<String, StateSlot> {
        &self.layout
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&StateSlot> {
        self.layout.get(name)
    }

    #[must_use]
    pub fn state_len(&self) -> usize {
        self.state_len
    }

    #[must_use]
    pub fn mass_matrix(&self) -> &CsrMatrix<f64> {
        &self.mass
    }

    #[must_use]
    pub fn rhs_expressions(&self) -> &[Symbol] {
        &self.rhs
    }

    #[must_use]
    pub fn events(&self) -> &[DiscreteEvent] {
        &self.events
    }

    #[must_use]
    pub fn outputs(&self) -> &IndexMap<String, Symbol> {
        &self.outputs
    }

    /// Names of the runtime inputs read anywhere in the model, sorted.
    #[must_use]
    pub fn input_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let symbols = self
            .rhs
            .iter()
            .chain(&self.initial)
            .chain(self.events.iter().map(|event| &event.expression))
            .chain(self.outputs.values());
        for symbol in symbols {
            symbol.visit(&mut |node| {
                if let Kind::InputParameter(name) = node.kind() {
                    names.insert(name.clone());
                }
            });
        }
        names
    }

    /// Evaluates the initial-condition expressions into a state vector.
    ///
    /// # Errors
    ///
    /// Fails if an initial condition cannot be evaluated without state.
    pub fn initial_state(&self, inputs: &Inputs) -> Result<DVector<f64>, EvalError> {
        let ctx = EvalContext::new(0.0).with_inputs(inputs);
        self.stack(&self.initial, |symbol| symbol.evaluate(&ctx))
    }

    /// Evaluates `f(t, y)`.
    ///
    /// # Errors
    ///
    /// Fails if a right-hand side cannot be evaluated.
    pub fn rhs(&self, t: f64, y: &DVector<f64>, inputs: &Inputs) -> Result<DVector<f64>, EvalError> {
        let ctx = EvalContext::new(t).with_state(y).with_inputs(inputs);
        self.stack(&self.rhs, |symbol| symbol.evaluate(&ctx))
    }

    /// Evaluates `∂f/∂y` by forward-mode differentiation of each block.
    ///
    /// # Errors
    ///
    /// Fails if a right-hand side cannot be evaluated.
    pub fn rhs_jacobian(
        &self,
        t: f64,
        y: &DVector<f64>,
        inputs: &Inputs,
    ) -> Result<CsrMatrix<f64>, EvalError> {
        let ctx = EvalContext::new(t).with_state(y).with_inputs(inputs);
        let mut blocks = Vec::with_capacity(self.rhs.len());
        for (slot, symbol) in self.layout.values().zip(&self.rhs) {
            let (_, jac) = symbol.jacobian(&ctx, self.state_len)?;
            let block = if jac.nrows() == 1 && slot.len != 1 {
                sparse::repeat_row(&jac, slot.len)
            } else {
                jac
            };
            check_len(slot, block.nrows())?;
            blocks.push(block);
        }
        Ok(sparse::vstack(&blocks, self.state_len))
    }

    /// Evaluates every event expression.
    ///
    /// # Errors
    ///
    /// Fails if an event cannot be evaluated.
    pub fn event_values(
        &self,
        t: f64,
        y: &DVector<f64>,
        inputs: &Inputs,
    ) -> Result<DVector<f64>, EvalError> {
        let ctx = EvalContext::new(t).with_state(y).with_inputs(inputs);
        let mut values = DVector::zeros(self.events.len());
        for (i, event) in self.events.iter().enumerate() {
            values[i] = event.expression.evaluate(&ctx)?.get(0);
        }
        Ok(values)
    }

    /// Evaluates a named output at one point of a trajectory.
    ///
    /// Returns `None` if no output has that name.
    ///
    /// # Errors
    ///
    /// Fails if the output cannot be evaluated.
    pub fn evaluate_output(
        &self,
        name: &str,
        t: f64,
        y: &DVector<f64>,
        inputs: &Inputs,
    ) -> Option<Result<Value, EvalError>> {
        let output = self.outputs.get(name)?;
        let ctx = EvalContext::new(t).with_state(y).with_inputs(inputs);
        Some(output.evaluate(&ctx))
    }

    /// Binds runtime inputs, giving a [`DaeProblem`].
    #[must_use]
    pub fn bind<'a>(&'a self, inputs: &'a Inputs) -> Bound<'a> {
        Bound {
            model: self,
            inputs,
            initial: None,
        }
    }

    fn stack(
        &self,
        blocks: &[Symbol],
        eval: impl Fn(&Symbol) -> Result<Value, EvalError>,
    ) -> Result<DVector<f64>, EvalError> {
        let mut out = DVector::zeros(self.state_len);
        for (slot, symbol) in self.layout.values().zip(blocks) {
            let value = eval(symbol)?;
            if value.len() != 1 {
                check_len(slot, value.len())?;
            }
            out.rows_mut(slot.start, slot.len)
                .copy_from(&value.to_vector(slot.len));
        }
        Ok(out)
    }
}

fn check_len(slot: &StateSlot, found: usize) -> Result<(), EvalError> {
    if found == slot.len {
        Ok(())
    } else {
        Err(EvalError::ShapeMismatch {
            operator: format!("equation for `{}`", slot.name),
            left: slot.len,
            right: found,
        })
    }
}

/// A [`DiscretizedModel`] with its runtime inputs bound.
#[derive(Debug, Clone)]
pub struct Bound<'a> {
    model: &'a DiscretizedModel,
    inputs: &'a Inputs,
    initial: Option<DVector<f64>>,
}

impl Bound<'_> {
    /// Starts from `y0` instead of the model's initial conditions.
    #[must_use]
    pub fn starting_from(mut self, y0: DVector<f64>) -> Self {
        self.initial = Some(y0);
        self
    }

    #[must_use]
    pub fn model(&self) -> &DiscretizedModel {
        self.model
    }

    #[must_use]
    pub fn inputs(&self) -> &Inputs {
        self.inputs
    }
}

impl DaeProblem for Bound<'_> {
    type Error = EvalError;

    fn state_len(&self) -> usize {
        self.model.state_len
    }

    fn initial_state(&self) -> Result<DVector<f64>, Self::Error> {
        match &self.initial {
            Some(y0) => Ok(y0.clone()),
            None => self.model.initial_state(self.inputs),
        }
    }

    fn mass_matrix(&self) -> &CsrMatrix<f64> {
        &self.model.mass
    }

    fn rhs(&self, t: f64, y: &DVector<f64>) -> Result<DVector<f64>, Self::Error> {
        self.model.rhs(t, y, self.inputs)
    }

    fn rhs_jacobian(&self, t: f64, y: &DVector<f64>) -> Result<CsrMatrix<f64>, Self::Error> {
        self.model.rhs_jacobian(t, y, self.inputs)
    }

    fn events(&self, t: f64, y: &DVector<f64>) -> Result<DVector<f64>, Self::Error> {
        self.model.event_values(t, y, self.inputs)
    }

    fn event_directions(&self) -> Vec<Direction> {
        self.model.events.iter().map(|e| e.direction).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn discretized_models_are_shareable() {
        assert_send_sync::<DiscretizedModel>();
        assert_send_sync::<Bound<'static>>();
    }
}
