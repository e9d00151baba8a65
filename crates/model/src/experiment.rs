//! Cycling protocols parsed from strings.
//!
//! An [`Experiment`] is a list of cycles, each a list of [`Step`]s run in
//! order. Steps draw the `"Current function [A]"` input, so any model that
//! declares that parameter as a runtime input can follow an experiment.
//!
//! Voltage holds also need the model to carry its current as an algebraic
//! state switched by [`CONTROL_INPUT`], and C-rates need the
//! [`CAPACITY_OUTPUT`] output. The chemistry templates provide both.

mod step;
mod units;

use std::{fmt, str::FromStr};

use thiserror::Error;

pub use step::{CutOff, Drive, Operation, Step};

/// Runtime input that carries the applied current of each step, in A.
pub const CURRENT_INPUT: &str = "Current function [A]";

/// Runtime input that carries the ambient temperature of each step, in K.
pub const TEMPERATURE_INPUT: &str = "Ambient temperature [K]";

/// Runtime input that selects current control at one and voltage control
/// at zero.
pub const CONTROL_INPUT: &str = "Current control switch";

/// Runtime input that carries the voltage of a hold step, in V.
pub const VOLTAGE_INPUT: &str = "Voltage function [V]";

/// Output checked against voltage cut-offs and terminations.
pub const VOLTAGE_OUTPUT: &str = "Terminal voltage [V]";

/// Output checked against the current cut-offs of hold steps.
pub const CURRENT_OUTPUT: &str = "Current [A]";

/// Output that C-rates are resolved against, in A.h.
pub const CAPACITY_OUTPUT: &str = "Nominal cell capacity [A.h]";

pub(crate) const ZERO_CELSIUS: f64 = 273.15;

/// Time allowed for a step that only ends at a voltage cut-off.
pub(crate) const UNBOUNDED_STEP: f64 = 86_400.0;

const DEFAULT_PERIOD: &str = "1 minute";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    #[error("invalid step `{step}`: {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("`{step}` is a {kind} step, which is not supported")]
    UnsupportedStep { step: String, kind: &'static str },

    #[error("invalid duration `{text}`: expected a positive number and a time unit")]
    InvalidDuration { text: String },

    #[error("{reason}")]
    InvalidTermination { term: String, reason: &'static str },

    #[error("an experiment needs at least one step in every cycle")]
    EmptyExperiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityUnit {
    Percent,
    AmpHours,
}

/// Ends an experiment before all cycles have run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminationCondition {
    /// Stop once a cycle's discharge capacity falls below this value, either
    /// as a percentage of the first cycle or in A.h.
    Capacity { value: f64, unit: CapacityUnit },
    /// Stop once a step ends below this terminal voltage.
    Voltage(f64),
}

impl TerminationCondition {
    /// Parses `"80% capacity"`, `"4 Ah capacity"`, `"4 A.h capacity"`, or
    /// `"2.5 V"`.
    ///
    /// # Errors
    ///
    /// Fails with [`ExperimentError::InvalidTermination`] for any other form.
    pub fn parse(term: &str) -> Result<Self, ExperimentError> {
        let invalid = |reason| ExperimentError::InvalidTermination {
            term: term.to_owned(),
            reason,
        };

        let words: Vec<&str> = term.split_whitespace().collect();
        if let Some((&"capacity", value)) = words.split_last() {
            let value = value.concat().replace("A.h", "Ah");
            let (number, unit) = if let Some(number) = value.strip_suffix('%') {
                (number, CapacityUnit::Percent)
            } else if let Some(number) = value.strip_suffix("Ah") {
                (number, CapacityUnit::AmpHours)
            } else {
                return Err(invalid(
                    "Capacity termination must be given in the form '80%', '4Ah', or '4A.h'",
                ));
            };
            let value = number.parse::<f64>().map_err(|_| {
                invalid("Capacity termination must be given in the form '80%', '4Ah', or '4A.h'")
            })?;
            return Ok(Self::Capacity { value, unit });
        }

        units::quantity(term, "V").map(Self::Voltage).ok_or_else(|| {
            invalid(
                "Only capacity or voltage can be provided as a termination reason, \
                 e.g. '80% capacity', '4 Ah capacity', or '2.5 V'",
            )
        })
    }

    /// True if a cycle with discharge capacity `capacity` (A.h) ends the
    /// experiment, given the first cycle's capacity.
    #[must_use]
    pub fn capacity_reached(&self, capacity: f64, first: f64) -> bool {
        match *self {
            Self::Capacity {
                value,
                unit: CapacityUnit::Percent,
            } => capacity < first * value / 100.0,
            Self::Capacity {
                value,
                unit: CapacityUnit::AmpHours,
            } => capacity < value,
            Self::Voltage(_) => false,
        }
    }

    /// True if a step ending at `voltage` ends the experiment.
    #[must_use]
    pub fn voltage_reached(&self, voltage: f64) -> bool {
        matches!(*self, Self::Voltage(v) if voltage < v)
    }
}

impl FromStr for TerminationCondition {
    type Err = ExperimentError;

    fn from_str(term: &str) -> Result<Self, Self::Err> {
        Self::parse(term)
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity {
                value,
                unit: CapacityUnit::Percent,
            } => write!(f, "{value}% capacity"),
            Self::Capacity {
                value,
                unit: CapacityUnit::AmpHours,
            } => write!(f, "{value} Ah capacity"),
            Self::Voltage(v) => write!(f, "{v} V"),
        }
    }
}

/// A sequence of cycles with a recording period, an optional ambient
/// temperature, and optional global terminations.
///
/// ```
/// use volta_model::experiment::Experiment;
///
/// let experiment = Experiment::new([
///     ["Discharge at 1 A until 1.95 V", "Rest for 1 hour"],
///     ["Charge at 0.5 A for 2 hours", "Rest for 30 minutes"],
/// ])?
/// .with_termination(["80% capacity"])?;
///
/// assert_eq!(experiment.cycles().len(), 2);
/// assert_eq!(experiment.period(), 60.0);
/// # Ok::<(), volta_model::experiment::ExperimentError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    cycles: Vec<Vec<Step>>,
    period: f64,
    temperature: Option<f64>,
    termination: Vec<TerminationCondition>,
}

impl Experiment {
    /// Parses each cycle's steps.
    ///
    /// # Errors
    ///
    /// Fails on the first step that does not parse, or if the experiment or
    /// any cycle is empty.
    pub fn new<I, C, S>(cycles: I) -> Result<Self, ExperimentError>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cycles = cycles
            .into_iter()
            .map(|cycle| {
                cycle
                    .into_iter()
                    .map(|step| Step::parse(step.as_ref()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_steps(cycles)
    }

    /// Builds an experiment from already-parsed steps, for example steps
    /// carrying tags or per-step overrides.
    ///
    /// # Errors
    ///
    /// Fails if the experiment or any cycle is empty.
    pub fn from_steps(cycles: Vec<Vec<Step>>) -> Result<Self, ExperimentError> {
        if cycles.is_empty() || cycles.iter().any(Vec::is_empty) {
            return Err(ExperimentError::EmptyExperiment);
        }
        Ok(Self {
            cycles,
            period: units::duration(DEFAULT_PERIOD)?,
            temperature: None,
            termination: Vec::new(),
        })
    }

    /// Sets the default recording period, such as `"10 seconds"`.
    ///
    /// # Errors
    ///
    /// Fails if `period` is not a positive duration.
    pub fn with_period(mut self, period: &str) -> Result<Self, ExperimentError> {
        self.period = units::duration(period)?;
        Ok(self)
    }

    /// Sets the default ambient temperature, in degrees Celsius.
    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius + ZERO_CELSIUS);
        self
    }

    /// Adds global terminations.
    ///
    /// # Errors
    ///
    /// Fails on the first term that is not a capacity or voltage.
    pub fn with_termination<I, S>(mut self, terms: I) -> Result<Self, ExperimentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            self.termination
                .push(TerminationCondition::parse(term.as_ref())?);
        }
        Ok(self)
    }

    #[must_use]
    pub fn cycles(&self) -> &[Vec<Step>] {
        &self.cycles
    }

    /// Every step with the index of its cycle, in run order.
    pub fn steps(&self) -> impl Iterator<Item = (usize, &Step)> {
        self.cycles
            .iter()
            .enumerate()
            .flat_map(|(cycle, steps)| steps.iter().map(move |step| (cycle, step)))
    }

    /// Default recording period in seconds.
    #[must_use]
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Default ambient temperature in K, if set.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    #[must_use]
    pub fn termination(&self) -> &[TerminationCondition] {
        &self.termination
    }

    /// Recording period of `step`, falling back to the experiment's.
    #[must_use]
    pub fn period_for(&self, step: &Step) -> f64 {
        step.period().unwrap_or(self.period)
    }

    /// Ambient temperature of `step` in K, falling back to the experiment's.
    #[must_use]
    pub fn temperature_for(&self, step: &Step) -> Option<f64> {
        step.temperature().or(self.temperature)
    }

    /// Indices of the cycles that contain a step tagged `tag`.
    #[must_use]
    pub fn search_tag(&self, tag: &str) -> Vec<usize> {
        self.cycles
            .iter()
            .enumerate()
            .filter(|(_, steps)| steps.iter().any(|step| step.tags().iter().any(|t| t == tag)))
            .map(|(cycle, _)| cycle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cycles_of_steps() {
        let experiment = Experiment::new([
            vec!["Discharge at 1 A for 1 hour", "Rest for 10 minutes"],
            vec!["Charge at 1 A until 2.3 V"],
        ])
        .unwrap();

        let operations: Vec<_> = experiment
            .steps()
            .map(|(cycle, step)| (cycle, step.operation()))
            .collect();
        assert_eq!(
            operations,
            [
                (0, Operation::Discharge),
                (0, Operation::Rest),
                (1, Operation::Charge),
            ]
        );
        assert!(experiment.termination().is_empty());
        assert_eq!(experiment.temperature(), None);
    }

    #[test]
    fn empty_experiments_are_rejected() {
        let none: [[&str; 0]; 0] = [];
        assert_eq!(Experiment::new(none), Err(ExperimentError::EmptyExperiment));
        assert_eq!(
            Experiment::from_steps(vec![vec![]]),
            Err(ExperimentError::EmptyExperiment)
        );
        assert!(matches!(
            Experiment::new([["Discharge at 1 A"]]),
            Err(ExperimentError::InvalidStep { .. })
        ));
    }

    #[test]
    fn period_and_temperature_defaults_and_overrides() {
        let tagged = Step::parse("Rest for 1 hour")
            .unwrap()
            .with_period("5 seconds")
            .unwrap()
            .with_temperature(0.0);
        let plain = Step::parse("Discharge at 1 A for 1 hour").unwrap();
        let experiment = Experiment::from_steps(vec![vec![plain.clone(), tagged.clone()]])
            .unwrap()
            .with_period("2 minutes")
            .unwrap()
            .with_temperature(25.0);

        assert_eq!(experiment.period_for(&plain), 120.0);
        assert_eq!(experiment.period_for(&tagged), 5.0);
        assert_eq!(experiment.temperature_for(&plain), Some(298.15));
        assert_eq!(experiment.temperature_for(&tagged), Some(273.15));
    }

    #[test]
    fn parses_terminations() {
        assert_eq!(
            TerminationCondition::parse("80% capacity").unwrap(),
            TerminationCondition::Capacity {
                value: 80.0,
                unit: CapacityUnit::Percent
            }
        );
        for term in ["4 Ah capacity", "4Ah capacity", "4 A.h capacity", "4A.h capacity"] {
            assert_eq!(
                TerminationCondition::parse(term).unwrap(),
                TerminationCondition::Capacity {
                    value: 4.0,
                    unit: CapacityUnit::AmpHours
                },
                "{term}"
            );
        }
        assert_eq!(
            TerminationCondition::parse("2.5 V").unwrap(),
            TerminationCondition::Voltage(2.5)
        );
        assert_eq!(
            TerminationCondition::parse("2.5V").unwrap(),
            TerminationCondition::Voltage(2.5)
        );
    }

    #[test]
    fn termination_errors_match_the_accepted_forms() {
        let err = TerminationCondition::parse("4 W capacity").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Capacity termination must be given in the form '80%', '4Ah', or '4A.h'"
        );

        let err = TerminationCondition::parse("2 hours").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only capacity or voltage can be provided as a termination reason, \
             e.g. '80% capacity', '4 Ah capacity', or '2.5 V'"
        );
    }

    #[test]
    fn terminations_compare_against_measurements() {
        let percent: TerminationCondition = "80% capacity".parse().unwrap();
        assert!(percent.capacity_reached(0.7, 1.0));
        assert!(!percent.capacity_reached(0.9, 1.0));
        assert!(!percent.voltage_reached(0.0));

        let absolute: TerminationCondition = "4 Ah capacity".parse().unwrap();
        assert!(absolute.capacity_reached(3.9, 10.0));

        let voltage: TerminationCondition = "2.5 V".parse().unwrap();
        assert!(voltage.voltage_reached(2.4));
        assert!(!voltage.voltage_reached(2.6));
        assert_eq!(voltage.to_string(), "2.5 V");
    }

    #[test]
    fn search_tag_lists_cycles() {
        let step = |text: &str| Step::parse(text).unwrap();
        let experiment = Experiment::from_steps(vec![
            vec![
                step("Discharge at 1 A for 1 hour").with_tags(["discharge"]),
                step("Rest for 1 hour"),
            ],
            vec![step("Charge at 1 A for 1 hour")],
            vec![step("Discharge at 1 A for 1 hour").with_tags(["discharge", "last"])],
        ])
        .unwrap();

        assert_eq!(experiment.search_tag("discharge"), [0, 2]);
        assert_eq!(experiment.search_tag("last"), [2]);
        assert!(experiment.search_tag("missing").is_empty());
    }
}
