use std::{collections::HashMap, sync::Arc, thread};

use approx::assert_relative_eq;
use volta_core::Direction;
use volta_discretization::Mesh;
use volta_model::{Model, Pipeline, Simulation, SimulationError, Stage};
use volta_observers::Cancellation;
use volta_solvers::transient::dae::{self, Action, InitialConditionPolicy, Status};
use volta_symbolic::{
    Domain, Inputs, Symbol,
    parameters::{ParameterValue, ParameterValues},
};

/// `dc/dt = -k c`, `c(0) = 1`, with `c` as an output.
fn decay() -> Model {
    let c = Symbol::variable("c", Domain::empty());
    let rate = c.clone().mul(Symbol::parameter("k")).unwrap().neg();
    let mut model = Model::new("decay");
    model
        .add_rhs(c.clone(), rate)
        .unwrap()
        .set_initial_condition(&c, 1.0)
        .unwrap()
        .add_output("c", c)
        .unwrap();
    model
}

fn swept() -> ParameterValues {
    let mut values = ParameterValues::new();
    values.set("k", ParameterValue::Input);
    values
}

fn inputs(k: f64) -> Inputs {
    HashMap::from([("k".to_owned(), k)])
}

fn fine() -> dae::Config {
    dae::Config {
        max_step: 0.02,
        ..dae::Config::default()
    }
}

#[test]
fn exponential_decay_matches_the_exact_solution() {
    let mut values = ParameterValues::new();
    values.set("k", 1.0);
    let model = Pipeline::new()
        .build(&decay(), &values, &Mesh::default())
        .unwrap();

    let solution = Simulation::new(model)
        .with_config(fine())
        .unwrap()
        .solve([0.0, 5.0], &Inputs::new())
        .unwrap();

    assert_eq!(solution.status(), Status::Complete);
    assert_eq!(solution.last_time(), Some(5.0));
    for t in [0.0, 1.0, 2.0, 5.0] {
        let c = solution.output_at_time("c", t).unwrap().get(0);
        assert_relative_eq!(c, (-t).exp(), epsilon = 1e-3);
    }

    let series = solution.scalar_output("c").unwrap();
    assert_eq!(series.len(), solution.times().len());
    assert!(series.windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn events_truncate_the_trajectory() {
    let mut model = decay();
    let c = Symbol::variable("c", Domain::empty());
    model
        .add_event("half", c.sub(0.5).unwrap(), Direction::Decreasing)
        .unwrap();

    let model = Pipeline::new()
        .build(&model, &swept(), &Mesh::default())
        .unwrap();
    let solution = Simulation::new(model)
        .with_config(fine())
        .unwrap()
        .solve([0.0, 5.0], &inputs(1.0))
        .unwrap();

    assert!(matches!(solution.status(), Status::EventTriggered { index: 0, .. }));
    assert_eq!(solution.triggered_event(), Some("half"));
    assert_relative_eq!(
        solution.last_time().unwrap(),
        2.0_f64.ln(),
        epsilon = 1e-3
    );
}

#[test]
fn one_discretization_serves_a_parameter_sweep() {
    let mut pipeline = Pipeline::new();
    let first = pipeline
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    let second = pipeline
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let simulation = Simulation::new(first).with_config(fine()).unwrap();
    for k in [0.5, 1.0, 2.0] {
        let solution = simulation.solve([0.0, 1.0], &inputs(k)).unwrap();
        let c = solution.scalar_output("c").unwrap();
        assert_relative_eq!(*c.last().unwrap(), (-k).exp(), epsilon = 1e-4);
        assert_eq!(solution.inputs()["k"], k);
    }
}

#[test]
fn concurrent_solves_share_one_model() {
    let model = Pipeline::new()
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    let simulation = Simulation::new(model).with_config(fine()).unwrap();

    let finals: Vec<f64> = thread::scope(|s| {
        let handles: Vec<_> = [0.5, 1.0, 1.5, 2.0]
            .into_iter()
            .map(|k| {
                let simulation = &simulation;
                s.spawn(move || {
                    let solution = simulation.solve([0.0, 1.0], &inputs(k)).unwrap();
                    *solution.last_state().unwrap().as_slice().first().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (c, k) in finals.into_iter().zip([0.5_f64, 1.0, 1.5, 2.0]) {
        assert_relative_eq!(c, (-k).exp(), epsilon = 1e-4);
    }
}

#[test]
fn cancellation_returns_a_partial_trajectory() {
    let model = Pipeline::new()
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    let simulation = Simulation::new(model);

    let token = Cancellation::new();
    token.cancel();
    let solution = simulation
        .solve_observed([0.0, 5.0], &inputs(1.0), None, &token)
        .unwrap();
    assert_eq!(solution.status(), Status::Cancelled);
    assert_eq!(solution.times(), [0.0]);

    let solution = simulation
        .solve_observed([0.0, 5.0], &inputs(1.0), None, |event: &dae::Event| {
            (event.step == 3).then_some(Action::StopEarly)
        })
        .unwrap();
    assert_eq!(solution.status(), Status::Cancelled);
    assert_eq!(solution.times().len(), 4);
    assert!(solution.last_time().unwrap() < 5.0);
}

#[test]
fn solves_can_start_from_a_given_state() {
    let model = Pipeline::new()
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    let simulation = Simulation::new(model).with_config(fine()).unwrap();

    let y0 = nalgebra::DVector::from_element(1, 2.0);
    let solution = simulation
        .solve_observed([0.0, 1.0], &inputs(1.0), Some(y0), ())
        .unwrap();
    let c = solution.scalar_output("c").unwrap();
    assert_eq!(c[0], 2.0);
    assert_relative_eq!(*c.last().unwrap(), 2.0 * (-1.0_f64).exp(), epsilon = 1e-4);
}

#[test]
fn missing_inputs_and_outputs_are_reported() {
    let model = Pipeline::new()
        .build(&decay(), &swept(), &Mesh::default())
        .unwrap();
    let simulation = Simulation::new(model);

    assert!(matches!(
        simulation.solve([0.0, 1.0], &Inputs::new()),
        Err(SimulationError::MissingInput { name }) if name == "k"
    ));

    let solution = simulation.solve([0.0, 1.0], &inputs(1.0)).unwrap();
    assert!(matches!(
        solution.evaluate_output("nope"),
        Err(SimulationError::UnknownOutput { name }) if name == "nope"
    ));
}

/// `dc/dt = -c` with the constraint `0 = 2c - a`, starting from `a = 1`.
fn constrained() -> Arc<volta_discretization::DiscretizedModel> {
    let c = Symbol::variable("c", Domain::empty());
    let a = Symbol::variable("a", Domain::empty());
    let mut model = Model::new("constrained");
    model
        .add_rhs(c.clone(), c.clone().neg())
        .unwrap()
        .add_algebraic(a.clone(), c.clone().mul(2.0).unwrap().sub(a.clone()).unwrap())
        .unwrap()
        .set_initial_condition(&c, 1.0)
        .unwrap()
        .set_initial_condition(&a, 1.0)
        .unwrap()
        .add_output("a", a)
        .unwrap();
    Pipeline::new()
        .build(&model, &ParameterValues::new(), &Mesh::default())
        .unwrap()
}

#[test]
fn inconsistent_initial_conditions_follow_the_policy() {
    let reject = dae::Config {
        initialization: InitialConditionPolicy::Reject,
        ..dae::Config::default()
    };
    let err = Simulation::new(constrained())
        .with_config(reject)
        .unwrap()
        .solve([0.0, 1.0], &Inputs::new())
        .unwrap_err();
    assert_eq!(err.failed_at(), Some(0.0));
    match err {
        SimulationError::InconsistentInitialCondition { t, row, residual } => {
            assert_eq!(t, 0.0);
            assert_eq!(row, 1);
            assert_relative_eq!(residual, 1.0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let solution = Simulation::new(constrained())
        .solve([0.0, 1.0], &Inputs::new())
        .unwrap();
    let a = solution.scalar_output("a").unwrap();
    assert_relative_eq!(a[0], 2.0, epsilon = 1e-8);
    assert_relative_eq!(*a.last().unwrap(), 2.0 * (-1.0_f64).exp(), epsilon = 1e-3);
}

#[test]
fn stepping_failures_report_the_last_time_reached() {
    let config = dae::Config {
        max_step: 1e-3,
        max_steps: 3,
        ..dae::Config::default()
    };
    let err = Simulation::new(constrained())
        .with_config(config)
        .unwrap()
        .solve([0.0, 1.0], &Inputs::new())
        .unwrap_err();

    assert!(err.failed_at().is_some_and(|t| t > 0.0 && t < 1.0));
    let SimulationError::SolverFailure { t, source } = err else {
        panic!("expected a solver failure, got {err}");
    };
    assert!(t > 0.0 && t < 1.0);
    assert!(matches!(source, dae::Error::MaxStepsExceeded { steps: 3, .. }));

    let err = Simulation::new(constrained())
        .solve([1.0, 0.0], &Inputs::new())
        .unwrap_err();
    assert!(matches!(err, SimulationError::InvalidSpan { .. }));
    assert_eq!(err.failed_at(), None);
}

#[test]
fn solved_models_carry_their_solution() {
    let mut values = ParameterValues::new();
    values.set("k", 1.0);
    let discretized = decay()
        .resolve(&values)
        .unwrap()
        .simplify()
        .unwrap()
        .discretize(&Mesh::default())
        .unwrap();

    let model = Arc::clone(discretized.discretized().unwrap());
    let solution = Simulation::new(model).solve([0.0, 1.0], &Inputs::new()).unwrap();
    let solved = discretized.solved(solution).unwrap();

    assert_eq!(solved.stage(), Stage::Solved);
    assert_eq!(solved.solution().unwrap().last_time(), Some(1.0));
}
