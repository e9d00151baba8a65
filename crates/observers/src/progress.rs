use tracing::info;
use volta_core::Observer;

use crate::traits::HasTime;

/// Logs simulated time at `info` level every `every` events.
///
/// Never requests an action, so it can wrap any time-stepping solve.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    label: String,
    every: usize,
    seen: usize,
    last: Option<f64>,
}

impl ProgressLog {
    /// An `every` of zero is treated as one.
    #[must_use]
    pub fn new(label: impl Into<String>, every: usize) -> Self {
        Self {
            label: label.into(),
            every: every.max(1),
            seen: 0,
            last: None,
        }
    }

    /// Number of events observed.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Time of the most recent event.
    #[must_use]
    pub fn last_time(&self) -> Option<f64> {
        self.last
    }
}

impl<E: HasTime, A> Observer<E, A> for ProgressLog {
    fn observe(&mut self, event: &E) -> Option<A> {
        let t = event.time();
        if self.seen % self.every == 0 {
            info!(label = %self.label, t, step = event.step(), "progress");
        }
        self.seen += 1;
        self.last = Some(t);
        None
    }
}

impl<E: HasTime, A> Observer<E, A> for &mut ProgressLog {
    fn observe(&mut self, event: &E) -> Option<A> {
        Observer::<E, A>::observe(&mut **self, event)
    }
}
