/// Control actions supported by the DAE integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop and return the trajectory so far with status `Cancelled`.
    StopEarly,
}
