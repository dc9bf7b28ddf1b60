use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::error::RtbpResult;

/// A trait for types that can be used as scalars in our vector fields.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// An autonomous or time-dependent vector field.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// The flow of a vector field treated as a black box: advance a state by an
/// exact requested time, or fail.
pub trait Flow {
    /// Advances `state` in place by `time` (negative for backward flow).
    fn advance(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        state: &mut [f64],
        time: f64,
    ) -> RtbpResult<()>;
}
