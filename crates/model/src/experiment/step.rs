use std::{fmt, str::FromStr};

use super::{ExperimentError, units};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Discharge,
    Charge,
    Rest,
    Hold,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Discharge => "Discharge",
            Operation::Charge => "Charge",
            Operation::Rest => "Rest",
            Operation::Hold => "Hold",
        })
    }
}

/// What a step holds fixed. Currents and C-rates are positive on discharge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drive {
    /// A current in A.
    Current(f64),
    /// A current in multiples of the nominal capacity per hour.
    CRate(f64),
    /// A terminal voltage in V.
    Voltage(f64),
}

/// What ends a step before its duration runs out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CutOff {
    /// A terminal voltage in V, reached in the direction of travel.
    Voltage(f64),
    /// A current magnitude in A that a voltage hold decays to.
    Current(f64),
}

/// One operating condition of an experiment.
///
/// Parsed from strings such as `"Discharge at 1 A for 2 hours"`,
/// `"Charge at C/2 until 4.1 V"`, `"Hold at 4.1 V until 50 mA"`, or
/// `"Rest for 30 minutes"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    description: String,
    operation: Operation,
    drive: Drive,
    duration: Option<f64>,
    cut_off: Option<CutOff>,
    period: Option<f64>,
    temperature: Option<f64>,
    tags: Vec<String>,
}

#[derive(Default)]
struct Clauses<'a> {
    at: Option<String>,
    duration: Option<String>,
    until: Option<String>,
    rest: Vec<&'a str>,
}

impl Step {
    /// # Errors
    ///
    /// Fails with [`ExperimentError::UnsupportedStep`] for power and
    /// resistance steps, and with [`ExperimentError::InvalidStep`] if the
    /// text does not follow one of the accepted forms.
    pub fn parse(text: &str) -> Result<Self, ExperimentError> {
        let invalid = |reason: &str| ExperimentError::InvalidStep {
            step: text.to_owned(),
            reason: reason.to_owned(),
        };

        let mut words = text.split_whitespace();
        let operation = match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("discharge") => Operation::Discharge,
            Some("charge") => Operation::Charge,
            Some("rest") => Operation::Rest,
            Some("hold") => Operation::Hold,
            _ => return Err(invalid("steps start with Discharge, Charge, Rest, or Hold")),
        };

        let clauses = clauses(words).map_err(|keyword| {
            invalid(&format!("`{keyword}` is given more than once or has no value"))
        })?;
        if !clauses.rest.is_empty() {
            return Err(invalid(&format!("unexpected `{}`", clauses.rest.join(" "))));
        }

        let sign = if operation == Operation::Charge { -1.0 } else { 1.0 };
        let drive = match (operation, clauses.at.as_deref()) {
            (Operation::Rest, None) => Drive::Current(0.0),
            (Operation::Rest, Some(_)) => return Err(invalid("a rest step has no current")),
            (Operation::Hold, None) => return Err(invalid("expected `at <voltage> V`")),
            (_, None) => return Err(invalid("expected `at <current> A` or `at <rate>C`")),
            (_, Some(at)) => {
                if let Some(kind) = unsupported(at) {
                    return Err(ExperimentError::UnsupportedStep {
                        step: text.to_owned(),
                        kind,
                    });
                }
                let current = units::current(at).filter(|i| *i >= 0.0);
                let rate = units::c_rate(at).filter(|c| *c >= 0.0);
                match (operation, units::quantity(at, "V")) {
                    (Operation::Hold, Some(volts)) => Drive::Voltage(volts),
                    (Operation::Hold, None) => {
                        return Err(invalid("a hold step is given as `at <voltage> V`"));
                    }
                    _ => match (current, rate) {
                        (Some(amps), _) => Drive::Current(sign * amps),
                        (None, Some(rate)) => Drive::CRate(sign * rate),
                        (None, None) => {
                            return Err(invalid(
                                "currents are given as a non-negative number of A or mA, \
                                 or as a C-rate such as `1C` or `C/2`",
                            ));
                        }
                    },
                }
            }
        };

        let duration = clauses
            .duration
            .as_deref()
            .map(units::duration)
            .transpose()?;
        let cut_off = clauses
            .until
            .as_deref()
            .map(|until| match operation {
                Operation::Hold => units::current(until)
                    .filter(|i| *i >= 0.0)
                    .map(CutOff::Current)
                    .ok_or_else(|| invalid("hold steps end at a current, such as `until 50 mA`")),
                _ if units::current(until).is_some() => {
                    Err(invalid("current cut-offs only end hold steps"))
                }
                _ => units::quantity(until, "V")
                    .map(CutOff::Voltage)
                    .ok_or_else(|| invalid("cut-offs are given in V")),
            })
            .transpose()?;

        if duration.is_none() && (cut_off.is_none() || operation == Operation::Rest) {
            return Err(invalid("expected `for <duration>` or `until <limit>`"));
        }

        Ok(Self {
            description: text.trim().to_owned(),
            operation,
            drive,
            duration,
            cut_off,
            period: None,
            temperature: None,
            tags: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Overrides the experiment's recording period for this step.
    ///
    /// # Errors
    ///
    /// Fails if `period` is not a duration such as `"10 seconds"`.
    pub fn with_period(mut self, period: &str) -> Result<Self, ExperimentError> {
        self.period = Some(units::duration(period)?);
        Ok(self)
    }

    /// Overrides the ambient temperature, in degrees Celsius.
    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius + super::ZERO_CELSIUS);
        self
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn drive(&self) -> Drive {
        self.drive
    }

    /// The applied current in A, positive on discharge, if given in A.
    #[must_use]
    pub fn current(&self) -> Option<f64> {
        match self.drive {
            Drive::Current(amps) => Some(amps),
            Drive::CRate(_) | Drive::Voltage(_) => None,
        }
    }

    /// Duration in seconds, if given.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    #[must_use]
    pub fn cut_off(&self) -> Option<CutOff> {
        self.cut_off
    }

    /// Recording period in seconds, if overridden.
    #[must_use]
    pub fn period(&self) -> Option<f64> {
        self.period
    }

    /// Ambient temperature in K, if overridden.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// True once `reading` is past the cut-off. The reading is the
    /// terminal voltage for a voltage cut-off, crossed in the direction of
    /// travel, and the current for a current cut-off, reached in magnitude.
    #[must_use]
    pub fn is_cut_off(&self, reading: f64) -> bool {
        match (self.operation, self.cut_off) {
            (Operation::Discharge, Some(CutOff::Voltage(v))) => reading <= v,
            (Operation::Charge, Some(CutOff::Voltage(v))) => reading >= v,
            (_, Some(CutOff::Current(limit))) => reading.abs() <= limit,
            _ => false,
        }
    }
}

impl FromStr for Step {
    type Err = ExperimentError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Names the kind of a setpoint that parses but has no runner.
fn unsupported(at: &str) -> Option<&'static str> {
    let any = |suffixes: &[&str]| {
        suffixes
            .iter()
            .any(|unit| units::quantity(at, unit).is_some())
    };
    if any(&["W", "mW"]) {
        Some("power")
    } else if any(&["Ohm", "mOhm"]) {
        Some("resistance")
    } else {
        None
    }
}

/// Splits the words after the operation into `at`, `for`, and `until`
/// clauses. Returns the offending keyword on a repeat or an empty clause.
fn clauses<'a>(words: impl Iterator<Item = &'a str>) -> Result<Clauses<'a>, &'a str> {
    let mut clauses = Clauses::default();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for word in words {
        match word {
            "at" | "for" | "until" => {
                close(&mut clauses, current.take())?;
                current = Some((word, Vec::new()));
            }
            _ => match &mut current {
                Some((_, values)) => values.push(word),
                None => clauses.rest.push(word),
            },
        }
    }
    close(&mut clauses, current)?;
    Ok(clauses)
}

fn close<'a>(
    clauses: &mut Clauses<'a>,
    open: Option<(&'a str, Vec<&'a str>)>,
) -> Result<(), &'a str> {
    let Some((keyword, values)) = open else {
        return Ok(());
    };
    let slot = match keyword {
        "at" => &mut clauses.at,
        "for" => &mut clauses.duration,
        _ => &mut clauses.until,
    };
    if values.is_empty() || slot.is_some() {
        return Err(keyword);
    }
    *slot = Some(values.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_accepted_forms() {
        let step = Step::parse("Discharge at 1 A for 2 hours").unwrap();
        assert_eq!(step.operation(), Operation::Discharge);
        assert_eq!(step.current(), Some(1.0));
        assert_eq!(step.duration(), Some(7200.0));
        assert_eq!(step.cut_off(), None);

        let step = Step::parse("Charge at 0.5 A until 2.2 V").unwrap();
        assert_eq!(step.current(), Some(-0.5));
        assert_eq!(step.duration(), None);
        assert_eq!(step.cut_off(), Some(CutOff::Voltage(2.2)));
        assert!(step.is_cut_off(2.3));
        assert!(!step.is_cut_off(2.1));

        let step = Step::parse("Rest for 30 minutes").unwrap();
        assert_eq!(step.current(), Some(0.0));
        assert_eq!(step.duration(), Some(1800.0));

        let step = Step::parse("Discharge at 2 A for 1 hour until 1.9 V").unwrap();
        assert_eq!(step.duration(), Some(3600.0));
        assert!(step.is_cut_off(1.9));

        let step = Step::parse("Discharge at 50 mA for 1 hour").unwrap();
        assert_eq!(step.current(), Some(0.05));
    }

    #[test]
    fn c_rates_are_signed_by_direction() {
        let step = Step::parse("Discharge at 1C for 1 hour").unwrap();
        assert_eq!(step.drive(), Drive::CRate(1.0));
        assert_eq!(step.current(), None);

        let step = Step::parse("Charge at C/2 until 4.1 V").unwrap();
        assert_eq!(step.drive(), Drive::CRate(-0.5));
        assert_eq!(Step::parse("Charge at 0.5 C for 1 hour").unwrap().drive(), Drive::CRate(-0.5));
    }

    #[test]
    fn holds_end_at_a_current() {
        let step = Step::parse("Hold at 4.2 V until 50 mA").unwrap();
        assert_eq!(step.operation(), Operation::Hold);
        assert_eq!(step.drive(), Drive::Voltage(4.2));
        assert_eq!(step.current(), None);
        assert_eq!(step.duration(), None);
        assert_eq!(step.cut_off(), Some(CutOff::Current(0.05)));
        assert!(step.is_cut_off(-0.04));
        assert!(!step.is_cut_off(-0.2));

        let step = Step::parse("Hold at 4.2 V for 1 hour until 0.1 A").unwrap();
        assert_eq!(step.duration(), Some(3600.0));
        assert_eq!(step.cut_off(), Some(CutOff::Current(0.1)));

        let step = Step::parse("Hold at 4.2V for 30 minutes").unwrap();
        assert_eq!(step.cut_off(), None);
    }

    #[test]
    fn power_and_resistance_steps_are_unsupported() {
        for (text, expected) in [
            ("Discharge at 2 W for 1 hour", "power"),
            ("Charge at 500 mW until 4.1 V", "power"),
            ("Discharge at 1 Ohm for 10 minutes", "resistance"),
            ("Hold at 5 W for 1 hour", "power"),
        ] {
            match Step::parse(text) {
                Err(ExperimentError::UnsupportedStep { step, kind }) => {
                    assert_eq!(step, text);
                    assert_eq!(kind, expected, "{text}");
                }
                other => panic!("{text} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_malformed_steps() {
        for text in [
            "Hold at 1 A for 1 hour",
            "Hold at 4.2 V until 3 V",
            "Hold at 4.2 V",
            "Discharge at 4 V for 1 hour",
            "Discharge at 1 A until 50 mA",
            "Charge at -1C for 1 hour",
            "Cycle at 1 A for 1 hour",
            "Discharge for 1 hour",
            "Discharge at 1 A",
            "Rest at 1 A for 1 hour",
            "Rest until 2 V",
            "Charge at 1 A for 1 hour for 2 hours",
            "Charge at one A for 1 hour",
            "Charge at 1 A until 4 W",
            "Discharge at 1 A for 2 hours quickly",
        ] {
            assert!(
                matches!(
                    Step::parse(text),
                    Err(ExperimentError::InvalidStep { .. } | ExperimentError::InvalidDuration { .. })
                ),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn tags_and_overrides() {
        let step: Step = "Rest for 1 hour".parse().unwrap();
        let step = step
            .with_tags(["relax"])
            .with_period("10 seconds")
            .unwrap()
            .with_temperature(25.0);

        assert_eq!(step.tags(), ["relax".to_owned()]);
        assert_eq!(step.period(), Some(10.0));
        assert_eq!(step.temperature(), Some(298.15));
    }
}
