//! The `rtbp_core` crate provides the numerical engine behind the `rtbp` CLI:
//! Poincaré sections, invariant manifolds and homoclinic points of the planar
//! circular restricted three-body problem.
//!
//! Key components:
//! - **Crossing**: event detection on a black-box flow, with refinement of each
//!   crossing by Brent's method and a filter against contractible loops.
//! - **Manifold**: globalization of one-dimensional invariant manifolds by
//!   iterating a discretized fundamental domain.
//! - **Homoclinic**: refinement of a bracketed manifold intersection to full
//!   double precision.
//! - **Poincaré**: the `ReturnMap` seam between the RTBP flow and the manifold
//!   machinery, and fixed points with their eigen-data.
//!
//! The mass parameter is never global; it lives in the `Rtbp` value passed to
//! every call.
pub mod autodiff;
pub mod config;
pub mod crossing;
pub mod delaunay;
pub mod error;
pub mod fixed_point;
pub mod homoclinic;
pub mod manifold;
pub mod poincare;
pub mod roots;
pub mod rtbp;
pub mod section;
pub mod solvers;
pub mod traits;

pub use config::{ConvergencePolicy, RunConfig};
pub use crossing::{advance_to_section, advance_to_section_inverse, SectionHit, TimeDirection};
pub use error::{RtbpError, RtbpResult};
pub use homoclinic::{refine_intersection, Refinement};
pub use manifold::{
    approximate_intersection, optimal_displacement, Approximation, Axis, EigenDirection,
    Eigendata, Stability, TargetLine,
};
pub use poincare::{PoincareMap, ReturnMap};
pub use rtbp::{PhaseState, Rtbp};
pub use section::Section;
