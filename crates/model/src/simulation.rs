use std::sync::Arc;

use nalgebra::DVector;
use thiserror::Error;
use tracing::{debug, info};
use volta_core::Observer;
use volta_discretization::DiscretizedModel;
use volta_solvers::transient::dae::{self, Action, InitialConditionPolicy, Status};
use volta_symbolic::{EvalError, Inputs, Value};

use crate::{
    ConfigError, SimulationConfig,
    experiment::{
        CAPACITY_OUTPUT, CONTROL_INPUT, CURRENT_INPUT, CURRENT_OUTPUT, CutOff, Drive, Experiment,
        Operation, Step, TEMPERATURE_INPUT, TerminationCondition, UNBOUNDED_STEP, VOLTAGE_INPUT,
        VOLTAGE_OUTPUT,
    },
};

/// Direct solves run under current control.
const CONTROL_DEFAULTS: [(&str, f64); 2] = [(CONTROL_INPUT, 1.0), (VOLTAGE_INPUT, 0.0)];

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("time span [{start}, {end}] must be finite and increasing")]
    InvalidSpan { start: f64, end: f64 },

    #[error("no value supplied for input `{name}`")]
    MissingInput { name: String },

    /// The integrator could not start from the given initial state.
    ///
    /// This is a solver failure at `t`, kept apart from [`SolverFailure`]
    /// because no step was taken. Use [`SimulationError::failed_at`] to
    /// handle both together.
    ///
    /// [`SolverFailure`]: SimulationError::SolverFailure
    #[error(
        "initial conditions are inconsistent at t = {t}: algebraic row {row} has residual {residual:e}"
    )]
    InconsistentInitialCondition { t: f64, row: usize, residual: f64 },

    #[error("solver failed after reaching t = {t}")]
    SolverFailure {
        t: f64,
        #[source]
        source: dae::Error,
    },

    #[error("the model has no output named `{name}`")]
    UnknownOutput { name: String },

    #[error(
        "step `{step}` holds a voltage, but the model does not read \
         `Current control switch` and `Voltage function [V]` as inputs"
    )]
    VoltageControl { step: String },

    #[error("output `{name}` could not be evaluated at t = {t}")]
    Output {
        name: String,
        t: f64,
        #[source]
        source: EvalError,
    },
}

impl SimulationError {
    /// The last time the integrator reached, for failures of the solver
    /// itself, including inconsistent initial conditions.
    #[must_use]
    pub fn failed_at(&self) -> Option<f64> {
        match *self {
            Self::SolverFailure { t, .. } | Self::InconsistentInitialCondition { t, .. } => Some(t),
            _ => None,
        }
    }

    fn from_solver(err: dae::Error, start: f64) -> Self {
        match err {
            dae::Error::InvalidConfig(err) => ConfigError::Solver(err).into(),
            dae::Error::InvalidSpan { start, end } => Self::InvalidSpan { start, end },
            dae::Error::InconsistentInitialCondition { t, row, residual } => {
                Self::InconsistentInitialCondition { t, row, residual }
            }
            source => Self::SolverFailure {
                t: source.last_time().unwrap_or(start),
                source,
            },
        }
    }
}

/// Solves a discretized model over time for given runtime inputs.
///
/// The model is shared, so any number of simulations, on any number of
/// threads, can solve it at once.
#[derive(Debug, Clone)]
pub struct Simulation {
    model: Arc<DiscretizedModel>,
    config: dae::Config,
}

impl Simulation {
    /// A simulation with the integrator's default settings.
    #[must_use]
    pub fn new(model: Arc<DiscretizedModel>) -> Self {
        Self {
            model,
            config: dae::Config::default(),
        }
    }

    /// # Errors
    ///
    /// Fails if `config` is out of range.
    pub fn with_config(mut self, config: dae::Config) -> Result<Self, SimulationError> {
        config.validate().map_err(ConfigError::from)?;
        self.config = config;
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails if the solver settings in `config` are out of range.
    pub fn from_config(
        model: Arc<DiscretizedModel>,
        config: &SimulationConfig,
    ) -> Result<Self, SimulationError> {
        Ok(Self {
            model,
            config: config.solver()?,
        })
    }

    #[must_use]
    pub fn model(&self) -> &Arc<DiscretizedModel> {
        &self.model
    }

    #[must_use]
    pub fn config(&self) -> &dae::Config {
        &self.config
    }

    /// Solves over `t_span` from the model's initial conditions.
    ///
    /// # Errors
    ///
    /// Fails if an input is missing, the initial conditions are rejected, or
    /// the integrator fails. Failures while stepping are reported with the
    /// last time reached.
    pub fn solve(&self, t_span: [f64; 2], inputs: &Inputs) -> Result<Solution, SimulationError> {
        self.solve_observed(t_span, inputs, None, ())
    }

    /// Solves with an observer that sees every accepted step and may stop
    /// the solve, and optionally from `y0` instead of the initial conditions.
    ///
    /// A stopped solve returns the partial trajectory with
    /// [`Status::Cancelled`].
    ///
    /// # Errors
    ///
    /// See [`Simulation::solve`].
    pub fn solve_observed<Obs>(
        &self,
        t_span: [f64; 2],
        inputs: &Inputs,
        y0: Option<DVector<f64>>,
        observer: Obs,
    ) -> Result<Solution, SimulationError>
    where
        Obs: Observer<dae::Event, Action>,
    {
        self.run(t_span, inputs, y0, &self.config, observer)
    }

    /// Runs every step of `experiment` in order, each from the last state
    /// of the one before.
    ///
    /// # Errors
    ///
    /// Fails if a step fails to solve, if the experiment needs an output
    /// the model lacks (terminal voltage for voltage cut-offs, current for
    /// current cut-offs, nominal capacity for C-rates), or if it holds a
    /// voltage on a model without voltage control.
    pub fn run_experiment(
        &self,
        experiment: &Experiment,
        inputs: &Inputs,
    ) -> Result<ExperimentSolution, SimulationError> {
        self.run_experiment_observed(experiment, inputs, ())
    }

    /// Like [`Simulation::run_experiment`], with an observer that sees every
    /// accepted step of every experiment step. Stopping it cancels the rest
    /// of the experiment.
    ///
    /// # Errors
    ///
    /// See [`Simulation::run_experiment`].
    pub fn run_experiment_observed<Obs>(
        &self,
        experiment: &Experiment,
        inputs: &Inputs,
        mut observer: Obs,
    ) -> Result<ExperimentSolution, SimulationError>
    where
        Obs: Observer<dae::Event, Action>,
    {
        let any_step = |f: fn(&Step) -> bool| experiment.steps().any(|(_, step)| f(step));
        let needs_voltage = any_step(|step| matches!(step.cut_off(), Some(CutOff::Voltage(_))))
            || experiment
                .termination()
                .iter()
                .any(|term| matches!(term, TerminationCondition::Voltage(_)));
        let needs_current = any_step(|step| matches!(step.cut_off(), Some(CutOff::Current(_))));
        let needs_capacity = any_step(|step| matches!(step.drive(), Drive::CRate(_)));
        for (name, needed) in [
            (VOLTAGE_OUTPUT, needs_voltage),
            (CURRENT_OUTPUT, needs_current),
            (CAPACITY_OUTPUT, needs_capacity),
        ] {
            if needed && !self.model.outputs().contains_key(name) {
                return Err(SimulationError::UnknownOutput {
                    name: name.to_owned(),
                });
            }
        }
        if let Some((_, step)) = experiment
            .steps()
            .find(|(_, step)| step.operation() == Operation::Hold)
        {
            let declared = self.model.input_names();
            if !(declared.contains(CONTROL_INPUT) && declared.contains(VOLTAGE_INPUT)) {
                return Err(SimulationError::VoltageControl {
                    step: step.to_string(),
                });
            }
        }

        let mut steps: Vec<StepSolution> = Vec::new();
        let mut capacities = Vec::new();
        let mut t = 0.0;
        let mut y = None;

        for (cycle, cycle_steps) in experiment.cycles().iter().enumerate() {
            let mut capacity = 0.0;
            for step in cycle_steps {
                let inputs = self.step_inputs(experiment, step, inputs)?;
                let config = self.step_config(experiment, step, steps.is_empty());
                let t_end = t + step.duration().unwrap_or(UNBOUNDED_STEP);
                info!(cycle, step = %step, t_start = t, "experiment step");

                let mut cut_off = false;
                let mut failure = None;
                let solution = self.run([t, t_end], &inputs, y.take(), &config, |event: &dae::Event| {
                    if let Some(action) = observer.observe(event) {
                        return Some(action);
                    }
                    let reading = match step.cut_off()? {
                        CutOff::Voltage(_) => self.voltage(event.t, &event.y, &inputs),
                        CutOff::Current(_) => {
                            self.scalar_output(CURRENT_OUTPUT, event.t, &event.y, &inputs)
                        }
                    };
                    match reading {
                        Ok(reading) if step.is_cut_off(reading) => {
                            cut_off = true;
                            Some(Action::StopEarly)
                        }
                        Ok(_) => None,
                        Err(err) => {
                            failure = Some(err);
                            Some(Action::StopEarly)
                        }
                    }
                })?;
                if let Some(err) = failure {
                    return Err(err);
                }

                let t_start = t;
                t = solution.last_time().unwrap_or(t);
                y = solution.last_state().cloned();
                if step.operation() == Operation::Discharge
                    && let Some(current) = inputs.get(CURRENT_INPUT)
                {
                    capacity += current * (t - t_start) / 3600.0;
                }

                let status = solution.status();
                let final_voltage = match (&y, needs_voltage) {
                    (Some(state), true) => Some(self.voltage(t, state, &inputs)?),
                    _ => None,
                };
                steps.push(StepSolution {
                    cycle,
                    step: step.clone(),
                    cut_off,
                    solution,
                });

                if let Status::EventTriggered { index, .. } = status {
                    let name = self.model.events()[index].name.clone();
                    info!(cycle, event = %name, t, "experiment stopped by event");
                    return Ok(ExperimentSolution::new(steps, capacities, Termination::Event { name }));
                }
                if status == Status::Cancelled && !cut_off {
                    info!(cycle, t, "experiment cancelled");
                    return Ok(ExperimentSolution::new(steps, capacities, Termination::Cancelled));
                }
                if let Some(voltage) = final_voltage
                    && let Some(term) = experiment
                        .termination()
                        .iter()
                        .find(|term| term.voltage_reached(voltage))
                {
                    info!(cycle, %term, voltage, "experiment terminated");
                    return Ok(ExperimentSolution::new(
                        steps,
                        capacities,
                        Termination::Condition(*term),
                    ));
                }
            }

            capacities.push(capacity);
            let first = capacities[0];
            if let Some(term) = experiment
                .termination()
                .iter()
                .find(|term| term.capacity_reached(capacity, first))
            {
                info!(cycle, %term, capacity, "experiment terminated");
                return Ok(ExperimentSolution::new(
                    steps,
                    capacities,
                    Termination::Condition(*term),
                ));
            }
        }

        info!(steps = steps.len(), t, "experiment complete");
        Ok(ExperimentSolution::new(steps, capacities, Termination::Complete))
    }

    fn run<Obs>(
        &self,
        t_span: [f64; 2],
        inputs: &Inputs,
        y0: Option<DVector<f64>>,
        config: &dae::Config,
        observer: Obs,
    ) -> Result<Solution, SimulationError>
    where
        Obs: Observer<dae::Event, Action>,
    {
        let declared = self.model.input_names();
        let mut inputs = inputs.clone();
        for (name, default) in CONTROL_DEFAULTS {
            if declared.contains(name) && !inputs.contains_key(name) {
                inputs.insert(name.to_owned(), default);
            }
        }
        if let Some(name) = declared.into_iter().find(|name| !inputs.contains_key(name)) {
            return Err(SimulationError::MissingInput { name });
        }

        let problem = self.model.bind(&inputs);
        let problem = match y0 {
            Some(y0) => problem.starting_from(y0),
            None => problem,
        };
        debug!(state_len = self.model.state_len(), ?t_span, "solving");

        let solution = dae::solve(&problem, t_span, config, observer)
            .map_err(|err| SimulationError::from_solver(err, t_span[0]))?;

        Ok(Solution {
            model: Arc::clone(&self.model),
            inputs,
            status: solution.status,
            times: solution.times,
            states: solution.states,
            steps: solution.steps,
            rejected: solution.rejected,
        })
    }

    /// Caps the step size at the recording period. Steps after the first
    /// always adjust their algebraic rows, since changing the current moves
    /// the constraint.
    fn step_config(&self, experiment: &Experiment, step: &Step, first: bool) -> dae::Config {
        let max_step = self.config.max_step.min(experiment.period_for(step));
        let initial_step = self.config.initial_step.min(max_step);
        dae::Config {
            max_step,
            initial_step,
            min_step: self.config.min_step.min(initial_step),
            initialization: if first {
                self.config.initialization
            } else {
                InitialConditionPolicy::Adjust
            },
            ..self.config
        }
    }

    fn voltage(&self, t: f64, y: &DVector<f64>, inputs: &Inputs) -> Result<f64, SimulationError> {
        self.scalar_output(VOLTAGE_OUTPUT, t, y, inputs)
    }

    fn scalar_output(
        &self,
        name: &str,
        t: f64,
        y: &DVector<f64>,
        inputs: &Inputs,
    ) -> Result<f64, SimulationError> {
        match self.model.evaluate_output(name, t, y, inputs) {
            Some(Ok(value)) => Ok(value.get(0)),
            Some(Err(source)) => Err(SimulationError::Output {
                name: name.to_owned(),
                t,
                source,
            }),
            None => Err(SimulationError::UnknownOutput {
                name: name.to_owned(),
            }),
        }
    }

    /// The inputs of one step. C-rates are resolved against the nominal
    /// capacity output, which reads no state.
    fn step_inputs(
        &self,
        experiment: &Experiment,
        step: &Step,
        inputs: &Inputs,
    ) -> Result<Inputs, SimulationError> {
        let mut inputs = inputs.clone();
        if let Some(temperature) = experiment.temperature_for(step) {
            inputs.insert(TEMPERATURE_INPUT.to_owned(), temperature);
        }

        let (current, control, voltage) = match step.drive() {
            Drive::Current(amps) => (amps, 1.0, 0.0),
            Drive::CRate(rate) => {
                let y = DVector::zeros(self.model.state_len());
                let capacity = self.scalar_output(CAPACITY_OUTPUT, 0.0, &y, &inputs)?;
                (rate * capacity, 1.0, 0.0)
            }
            Drive::Voltage(volts) => (0.0, 0.0, volts),
        };
        inputs.insert(CURRENT_INPUT.to_owned(), current);
        inputs.insert(CONTROL_INPUT.to_owned(), control);
        inputs.insert(VOLTAGE_INPUT.to_owned(), voltage);
        Ok(inputs)
    }
}

/// A solved trajectory together with the model and inputs that produced it.
#[derive(Debug, Clone)]
pub struct Solution {
    model: Arc<DiscretizedModel>,
    inputs: Inputs,
    status: Status,
    times: Vec<f64>,
    states: Vec<DVector<f64>>,
    steps: usize,
    rejected: usize,
}

impl Solution {
    #[must_use]
    pub fn model(&self) -> &Arc<DiscretizedModel> {
        &self.model
    }

    #[must_use]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Name of the event that ended the solve, if one did.
    #[must_use]
    pub fn triggered_event(&self) -> Option<&str> {
        match self.status {
            Status::EventTriggered { index, .. } => {
                self.model.events().get(index).map(|e| e.name.as_str())
            }
            Status::Complete | Status::Cancelled => None,
        }
    }

    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[must_use]
    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    /// Accepted integrator steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Rejected integrator steps.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    #[must_use]
    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    #[must_use]
    pub fn last_state(&self) -> Option<&DVector<f64>> {
        self.states.last()
    }

    /// Evaluates a named output at every accepted time.
    ///
    /// # Errors
    ///
    /// Fails if there is no such output or it cannot be evaluated.
    pub fn evaluate_output(&self, name: &str) -> Result<Vec<Value>, SimulationError> {
        self.times
            .iter()
            .zip(&self.states)
            .map(|(t, y)| self.output_at(name, *t, y))
            .collect()
    }

    /// Like [`Solution::evaluate_output`], keeping the first entry of each
    /// value. Suited to scalar outputs such as voltages.
    ///
    /// # Errors
    ///
    /// See [`Solution::evaluate_output`].
    pub fn scalar_output(&self, name: &str) -> Result<Vec<f64>, SimulationError> {
        Ok(self
            .evaluate_output(name)?
            .iter()
            .map(|value| value.get(0))
            .collect())
    }

    /// The state at `t`, linearly interpolated between accepted steps and
    /// clamped to the solved span.
    #[must_use]
    pub fn interpolate(&self, t: f64) -> Option<DVector<f64>> {
        let (first, last) = (self.times.first()?, self.times.last()?);
        if t <= *first {
            return self.states.first().cloned();
        }
        if t >= *last {
            return self.states.last().cloned();
        }
        let i = self.times.partition_point(|ti| *ti <= t);
        let (t0, t1) = (self.times[i - 1], self.times[i]);
        let theta = (t - t0) / (t1 - t0);
        Some(&self.states[i - 1] * (1.0 - theta) + &self.states[i] * theta)
    }

    /// Evaluates a named output on the interpolated state at `t`.
    ///
    /// # Errors
    ///
    /// Fails if the solution is empty, there is no such output, or it cannot
    /// be evaluated.
    pub fn output_at_time(&self, name: &str, t: f64) -> Result<Value, SimulationError> {
        let y = self.interpolate(t).ok_or_else(|| SimulationError::Output {
            name: name.to_owned(),
            t,
            source: EvalError::MissingState {
                symbol: name.to_owned(),
            },
        })?;
        self.output_at(name, t, &y)
    }

    fn output_at(&self, name: &str, t: f64, y: &DVector<f64>) -> Result<Value, SimulationError> {
        match self.model.evaluate_output(name, t, y, &self.inputs) {
            Some(result) => result.map_err(|source| SimulationError::Output {
                name: name.to_owned(),
                t,
                source,
            }),
            None => Err(SimulationError::UnknownOutput {
                name: name.to_owned(),
            }),
        }
    }
}

/// Why an experiment stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Every step of every cycle ran.
    Complete,
    /// A model event fired.
    Event { name: String },
    /// A global termination condition was met.
    Condition(TerminationCondition),
    /// An observer stopped the experiment.
    Cancelled,
}

/// The solution of one experiment step.
#[derive(Debug, Clone)]
pub struct StepSolution {
    cycle: usize,
    step: Step,
    cut_off: bool,
    solution: Solution,
}

impl StepSolution {
    #[must_use]
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    #[must_use]
    pub fn step(&self) -> &Step {
        &self.step
    }

    /// True if the step ended at its voltage cut-off.
    #[must_use]
    pub fn reached_cut_off(&self) -> bool {
        self.cut_off
    }

    #[must_use]
    pub fn solution(&self) -> &Solution {
        &self.solution
    }
}

/// Every step solved by [`Simulation::run_experiment`], in run order.
#[derive(Debug, Clone)]
pub struct ExperimentSolution {
    steps: Vec<StepSolution>,
    capacities: Vec<f64>,
    termination: Termination,
}

impl ExperimentSolution {
    fn new(steps: Vec<StepSolution>, capacities: Vec<f64>, termination: Termination) -> Self {
        Self {
            steps,
            capacities,
            termination,
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[StepSolution] {
        &self.steps
    }

    #[must_use]
    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    /// Discharge capacity, in A.h, of each completed cycle.
    #[must_use]
    pub fn cycle_capacities(&self) -> &[f64] {
        &self.capacities
    }

    /// The solved steps of one cycle.
    pub fn cycle(&self, cycle: usize) -> impl Iterator<Item = &StepSolution> {
        self.steps.iter().filter(move |step| step.cycle == cycle)
    }

    #[must_use]
    pub fn last_state(&self) -> Option<&DVector<f64>> {
        self.steps.last()?.solution.last_state()
    }

    /// Accepted times of every step, end to end.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        self.steps
            .iter()
            .flat_map(|step| step.solution.times().iter().copied())
            .collect()
    }

    /// Evaluates a named output over every step, end to end.
    ///
    /// # Errors
    ///
    /// See [`Solution::evaluate_output`].
    pub fn evaluate_output(&self, name: &str) -> Result<Vec<Value>, SimulationError> {
        let mut values = Vec::new();
        for step in &self.steps {
            values.extend(step.solution.evaluate_output(name)?);
        }
        Ok(values)
    }
}
