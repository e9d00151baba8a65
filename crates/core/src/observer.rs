/// Receives solver events and decides how the solve should proceed.
///
/// Observers let callers watch or steer a solver without changing its API.
/// The DAE integrator emits one event per accepted step, which is where
/// cooperative cancellation and experiment cut-offs hook in.
///
/// `observe` returns `Option<A>`: `Some(action)` requests a solver-specific
/// action, `None` lets the solver continue.
///
/// Closures implement `Observer` automatically, and `()` is a no-op observer.
pub trait Observer<E, A> {
    /// Observes a solver event and optionally returns a control action.
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Action {
        Stop,
    }

    fn drive<O: Observer<usize, Action>>(mut observer: O, events: usize) -> Option<usize> {
        (0..events).find(|event| observer.observe(event).is_some())
    }

    #[test]
    fn closure_observer_can_request_action() {
        let stopped_at = drive(|e: &usize| (*e == 3).then_some(Action::Stop), 10);
        assert_eq!(stopped_at, Some(3));
    }

    #[test]
    fn unit_observer_never_acts() {
        assert_eq!(drive((), 10), None);
    }
}
