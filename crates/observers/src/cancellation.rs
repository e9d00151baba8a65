use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use volta_core::Observer;

use crate::traits::CanStopEarly;

/// A cooperative cancellation flag.
///
/// Clones share the flag, so one clone can be handed to a solver as its
/// observer while another is cancelled from a different thread. The solver
/// stops at the next event it emits after [`Cancellation::cancel`].
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag so the handle can be reused for another solve.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for Cancellation {
    fn observe(&mut self, _event: &E) -> Option<A> {
        self.is_cancelled().then(A::stop_early)
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for &Cancellation {
    fn observe(&mut self, _event: &E) -> Option<A> {
        self.is_cancelled().then(A::stop_early)
    }
}
