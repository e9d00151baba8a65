//! Adaptive implicit Euler for mass-matrix DAEs.
//!
//! Each step runs one full implicit Euler step and two half steps. Their
//! difference drives the step size, and the Richardson-extrapolated state
//! `2 y_half - y_full` is accepted, with algebraic rows re-solved at the new
//! time. Event functions are checked between accepted states and located
//! by bisection on the linear interpolant of the step.

mod action;
mod config;
mod error;
mod event;
mod init;
mod roots;
mod solution;
mod step;

pub use action::Action;
pub use config::{Config, ConfigError};
pub use error::Error;
pub use event::Event;
pub use init::InitialConditionPolicy;
pub use solution::{Solution, Status};

use nalgebra::DVector;
use tracing::{info, trace};
use volta_core::{DaeProblem, Observer};

use init::Algebraic;
use step::Outcome;

/// Integrates `problem` over `t_span`.
///
/// The initial state is made consistent first, according to
/// [`Config::initialization`]. The observer sees the consistent initial
/// state as step 0 and then every accepted step; returning
/// [`Action::StopEarly`] ends the solve with [`Status::Cancelled`].
///
/// # Errors
///
/// Fails on an invalid config or span, inconsistent initial conditions, a
/// problem evaluation error, a step size below `min_step`, or when
/// `max_steps` attempts are used up before the end of the span.
pub fn solve<P, Obs>(
    problem: &P,
    t_span: [f64; 2],
    config: &Config,
    mut observer: Obs,
) -> Result<Solution, Error>
where
    P: DaeProblem,
    Obs: Observer<Event, Action>,
{
    config.validate()?;
    let [start, end] = t_span;
    if !(start.is_finite() && end.is_finite() && start < end) {
        return Err(Error::InvalidSpan { start, end });
    }

    let rows = problem.algebraic_rows();
    let directions = problem.event_directions();

    let y0 = problem
        .initial_state()
        .map_err(|e| Error::problem(start, e))?;
    let mut y = init::consistent_state(problem, start, y0, &rows, config)?;
    let mut events = problem.events(start, &y).map_err(|e| Error::problem(start, e))?;

    let mut solution = Solution {
        status: Status::Complete,
        times: vec![start],
        states: vec![y.clone()],
        steps: 0,
        rejected: 0,
    };
    let initial = Event {
        step: 0,
        t: start,
        h: 0.0,
        y: y.clone(),
    };
    if let Some(Action::StopEarly) = observer.observe(&initial) {
        solution.status = Status::Cancelled;
        return Ok(solution);
    }

    let mut t = start;
    let mut h = config.initial_step;
    let mut attempts = 0;

    while t < end {
        if attempts >= config.max_steps {
            return Err(Error::MaxStepsExceeded {
                t,
                steps: attempts,
            });
        }
        attempts += 1;

        let remaining = end - t;
        let last = h >= remaining;
        let step = if last { remaining } else { h };

        let trial = match step::attempt(problem, t, &y, step, &rows, config)? {
            Outcome::Converged(trial) => trial,
            Outcome::Diverged(source) => {
                solution.rejected += 1;
                h = step * 0.25;
                if h < config.min_step {
                    return Err(Error::NewtonFailed { t, h: step, source });
                }
                trace!(t, h = step, %source, "newton failed, shrinking step");
                continue;
            }
        };

        let factor = step_factor(trial.error);
        if !(trial.error <= 1.0) {
            solution.rejected += 1;
            h = step * factor;
            trace!(t, h = step, error = trial.error, "step rejected");
            if h < config.min_step {
                return Err(Error::StepSizeTooSmall { t, h });
            }
            continue;
        }

        let t_next = if last { end } else { t + step };
        let next_events = problem
            .events(t_next, &trial.y)
            .map_err(|e| Error::problem(t_next, e))?;

        let mut first: Option<(usize, f64)> = None;
        for (index, direction) in directions.iter().enumerate() {
            let (Some(before), Some(after)) = (events.get(index), next_events.get(index)) else {
                continue;
            };
            if !direction.crossed(*before, *after) {
                continue;
            }
            let root = roots::locate(
                problem,
                index,
                (t, &y),
                (t_next, &trial.y),
                &config.events,
            )?;
            if first.is_none_or(|(_, t_first)| root < t_first) {
                first = Some((index, root));
            }
        }

        solution.steps += 1;
        trace!(t = t_next, h = step, error = trial.error, "step accepted");

        if let Some((index, t_event)) = first {
            let y_event = event_state(problem, (t, &y), (t_next, &trial.y), t_event, &rows, config)?;
            solution.times.push(t_event);
            solution.states.push(y_event.clone());
            solution.status = Status::EventTriggered { index, t: t_event };
            observer.observe(&Event {
                step: solution.steps,
                t: t_event,
                h: t_event - t,
                y: y_event,
            });
            info!(index, t = t_event, steps = solution.steps, "event triggered");
            return Ok(solution);
        }

        t = t_next;
        y = trial.y;
        events = next_events;
        solution.times.push(t);
        solution.states.push(y.clone());

        let accepted = Event {
            step: solution.steps,
            t,
            h: step,
            y: y.clone(),
        };
        if let Some(Action::StopEarly) = observer.observe(&accepted) {
            solution.status = Status::Cancelled;
            info!(t, steps = solution.steps, "integration cancelled");
            return Ok(solution);
        }

        h = (step * factor).min(config.max_step);
    }

    info!(
        t = end,
        steps = solution.steps,
        rejected = solution.rejected,
        "integration complete"
    );
    Ok(solution)
}

/// Runs [`solve`] without an observer.
///
/// # Errors
///
/// See [`solve`].
pub fn solve_unobserved<P: DaeProblem>(
    problem: &P,
    t_span: [f64; 2],
    config: &Config,
) -> Result<Solution, Error> {
    solve(problem, t_span, config, ())
}

/// Step size multiplier for a weighted error norm.
fn step_factor(error: f64) -> f64 {
    if error == 0.0 {
        5.0
    } else if error.is_finite() {
        (0.9 / error.sqrt()).clamp(0.2, 5.0)
    } else {
        0.2
    }
}

/// Interpolated state at an event time, with algebraic rows re-solved.
fn event_state<P: DaeProblem>(
    problem: &P,
    (t0, y0): (f64, &DVector<f64>),
    (t1, y1): (f64, &DVector<f64>),
    t: f64,
    rows: &[usize],
    config: &Config,
) -> Result<DVector<f64>, Error> {
    let y = roots::interpolate(t0, y0, t1, y1, t);
    Algebraic::new(problem, t, &y, rows)
        .project(&config.newton)
        .map_err(|source| match source {
            crate::equation::newton::Error::Problem(source) => Error::Problem { t, source },
            source => Error::NewtonFailed {
                t,
                h: t - t0,
                source,
            },
        })
}
