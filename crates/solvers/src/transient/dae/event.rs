use nalgebra::DVector;

/// Emitted once for the initial state and then after every accepted step.
///
/// Step 0 is the consistent initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub step: usize,
    pub t: f64,
    /// Size of the step that reached `t`, zero for step 0.
    pub h: f64,
    pub y: DVector<f64>,
}
