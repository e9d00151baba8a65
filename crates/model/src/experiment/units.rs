use super::ExperimentError;

/// Seconds per unit for the time units accepted in steps and periods.
fn seconds_per(unit: &str) -> Option<f64> {
    match unit {
        "s" | "sec" | "second" | "seconds" => Some(1.0),
        "min" | "minute" | "minutes" => Some(60.0),
        "h" | "hr" | "hour" | "hours" => Some(3600.0),
        "day" | "days" => Some(86_400.0),
        _ => None,
    }
}

/// Parses `"<number> <unit>"`, for example `"30 minutes"`, into seconds.
pub(super) fn duration(text: &str) -> Result<f64, ExperimentError> {
    let invalid = || ExperimentError::InvalidDuration {
        text: text.to_owned(),
    };
    let mut words = text.split_whitespace();
    let (Some(value), Some(unit), None) = (words.next(), words.next(), words.next()) else {
        return Err(invalid());
    };
    let value: f64 = value.parse().map_err(|_| invalid())?;
    let scale = seconds_per(unit).ok_or_else(invalid)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    Ok(value * scale)
}

/// Parses a number followed by `unit`, with or without a space: `"2.5 V"`, `"1A"`.
pub(super) fn quantity(text: &str, unit: &str) -> Option<f64> {
    let number = text.trim().strip_suffix(unit)?.trim();
    number.parse().ok().filter(|x: &f64| x.is_finite())
}

/// Parses a current in A or mA: `"1 A"`, `"50 mA"`.
pub(super) fn current(text: &str) -> Option<f64> {
    quantity(text, "mA")
        .map(|milliamps| milliamps / 1000.0)
        .or_else(|| quantity(text, "A"))
}

/// Parses a C-rate: `"1C"`, `"0.5 C"`, or `"C/2"`.
pub(super) fn c_rate(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(divisor) = text.strip_prefix("C/") {
        let divisor: f64 = divisor.trim().parse().ok()?;
        return (divisor.is_finite() && divisor > 0.0).then(|| 1.0 / divisor);
    }
    quantity(text, "C")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_convert_to_seconds() {
        assert_eq!(duration("2 hours").unwrap(), 7200.0);
        assert_eq!(duration("30 minutes").unwrap(), 1800.0);
        assert_eq!(duration("1 minute").unwrap(), 60.0);
        assert_eq!(duration("10 s").unwrap(), 10.0);
        assert!(duration("2 fortnights").is_err());
        assert!(duration("hours").is_err());
        assert!(duration("0 s").is_err());
    }

    #[test]
    fn quantities_accept_optional_spaces() {
        assert_eq!(quantity("2.5 V", "V"), Some(2.5));
        assert_eq!(quantity("1A", "A"), Some(1.0));
        assert_eq!(quantity("A", "A"), None);
        assert_eq!(quantity("2.5 A", "V"), None);
    }

    #[test]
    fn currents_and_c_rates() {
        assert_eq!(current("2 A"), Some(2.0));
        assert_eq!(current("50 mA"), Some(0.05));
        assert_eq!(current("50mA"), Some(0.05));
        assert_eq!(current("4 V"), None);

        assert_eq!(c_rate("1C"), Some(1.0));
        assert_eq!(c_rate("0.5 C"), Some(0.5));
        assert_eq!(c_rate("C/4"), Some(0.25));
        assert_eq!(c_rate("C/0"), None);
        assert_eq!(c_rate("1 A"), None);
    }
}
