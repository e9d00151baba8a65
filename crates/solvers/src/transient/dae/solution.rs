use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    /// Reached the end of the time span.
    Complete,

    /// Event `index` crossed zero at `t`; the trajectory ends there.
    EventTriggered { index: usize, t: f64 },

    /// An observer stopped the solve.
    Cancelled,
}

/// An accepted trajectory: `states[i]` is the state at `times[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: Status,
    pub times: Vec<f64>,
    pub states: Vec<DVector<f64>>,
    /// Accepted steps.
    pub steps: usize,
    /// Steps rejected by error control or by Newton failure.
    pub rejected: usize,
}

impl Solution {
    #[must_use]
    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    #[must_use]
    pub fn last_state(&self) -> Option<&DVector<f64>> {
        self.states.last()
    }

    /// Linear interpolation between accepted states, clamped to the span.
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
}
