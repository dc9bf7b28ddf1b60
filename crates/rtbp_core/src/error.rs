use num_complex::Complex64;
use thiserror::Error;

/// Failures of the section, manifold and refinement machinery.
///
/// Search exhaustion that callers are expected to handle (a manifold that
/// never reaches its target, a root that stops short of the tolerance) is
/// reported through result values instead; `NotConverged` only appears here
/// when the caller asked for non-converged roots to be rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtbpError {
    #[error("Flow integration failed at t = {time}: {message}")]
    Integration { time: f64, message: String },

    #[error("Flow is tangent to the {section} section (f = {value:e}, df/dt = {rate:e})")]
    Tangency {
        section: &'static str,
        value: f64,
        rate: f64,
    },

    #[error("Root is not bracketed: f({a}) = {fa:e}, f({b}) = {fb:e}")]
    InvalidBracket { a: f64, b: f64, fa: f64, fb: f64 },

    #[error("Root search stopped after {iterations} iterations (estimate {estimate}, residual {residual:e})")]
    NotConverged {
        estimate: f64,
        residual: f64,
        iterations: usize,
    },

    #[error("Energy level {energy} is not reachable from reduced point ({u}, {v})")]
    EnergyInversion { energy: f64, u: f64, v: f64 },

    #[error("Delaunay chart undefined: {0}")]
    Delaunay(String),

    #[error("No crossing of the {section} section within |t| <= {max_time}")]
    SectionNotReached { section: &'static str, max_time: f64 },

    #[error("Fixed point search failed after {iterations} Newton steps (|P(p) - p| = {residual:e}): {message}")]
    FixedPoint {
        iterations: usize,
        residual: f64,
        message: String,
    },

    #[error("Fixed point is not a real saddle: eigenvalues {first} and {second}")]
    NotSaddle { first: Complex64, second: Complex64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type RtbpResult<T> = Result<T, RtbpError>;
