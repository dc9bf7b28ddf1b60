//! Globalization of one-dimensional invariant manifolds of a planar map.
//!
//! A short linear segment along an eigenvector is discretized, then mapped
//! whole, one iterate at a time, until two consecutive image points straddle
//! a target line. The straddling pair is translated back to a bracket of
//! displacements on the original segment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DisplacementSettings, ManifoldSettings};
use crate::crossing::TimeDirection;
use crate::error::{RtbpError, RtbpResult};
use crate::poincare::ReturnMap;
use crate::roots::straddles;
use crate::rtbp::PhaseState;
use crate::section::Point2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stability {
    Unstable,
    Stable,
}

impl Stability {
    /// Unstable manifolds grow under the map, stable ones under its inverse.
    pub fn direction(self) -> TimeDirection {
        match self {
            Stability::Unstable => TimeDirection::Forward,
            Stability::Stable => TimeDirection::Backward,
        }
    }
}

/// A real eigenvalue with its unit eigenvector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EigenDirection {
    pub value: f64,
    pub vector: Point2,
}

impl EigenDirection {
    pub fn stability(&self) -> Stability {
        if self.value.abs() > 1.0 {
            Stability::Unstable
        } else {
            Stability::Stable
        }
    }

    /// `base + displacement * vector`.
    pub fn displace(&self, base: Point2, displacement: f64) -> Point2 {
        [
            base[0] + displacement * self.vector[0],
            base[1] + displacement * self.vector[1],
        ]
    }

    /// Multiplier of the linearization in the direction of growth.
    fn growth(&self) -> f64 {
        match self.stability() {
            Stability::Unstable => self.value,
            Stability::Stable => 1.0 / self.value,
        }
    }
}

/// Eigen-data of a saddle fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eigendata {
    pub unstable: EigenDirection,
    pub stable: EigenDirection,
}

impl Eigendata {
    pub fn get(&self, stability: Stability) -> &EigenDirection {
        match stability {
            Stability::Unstable => &self.unstable,
            Stability::Stable => &self.stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    First,
    Second,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::First => 0,
            Axis::Second => 1,
        }
    }
}

/// The line `point[axis] = value` in reduced coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetLine {
    pub axis: Axis,
    pub value: f64,
}

impl TargetLine {
    pub fn new(axis: Axis, value: f64) -> Self {
        Self { axis, value }
    }

    pub fn distance(&self, point: Point2) -> f64 {
        point[self.axis.index()] - self.value
    }
}

/// Samples of a piece of manifold, overwritten in place by each iterate.
#[derive(Debug, Clone)]
pub struct ManifoldSegment {
    /// Displacement of each sample's pre-image along the eigenvector.
    parameters: Vec<f64>,
    points: Vec<Point2>,
    states: Vec<PhaseState>,
    iterates: usize,
}

impl ManifoldSegment {
    /// Discretizes `[p0, P(p0)]` with `p0 = fixed_point + displacement * v`.
    ///
    /// Both ends are samples; `P` is the inverse map for stable directions.
    pub fn fundamental_domain<M: ReturnMap>(
        map: &mut M,
        fixed_point: Point2,
        eigen: &EigenDirection,
        displacement: f64,
        samples: usize,
    ) -> RtbpResult<Self> {
        if samples < 2 {
            return Err(RtbpError::InvalidInput(format!(
                "a manifold segment needs at least two samples, got {samples}"
            )));
        }
        let start = eigen.displace(fixed_point, displacement);
        let end = map.apply(start, eigen.stability().direction(), 1)?.point;

        let mut parameters = Vec::with_capacity(samples);
        let mut points = Vec::with_capacity(samples);
        let mut states = Vec::with_capacity(samples);
        for i in 0..samples {
            let t = i as f64 / (samples - 1) as f64;
            let point = lerp(start, end, t);
            let offset = [point[0] - fixed_point[0], point[1] - fixed_point[1]];
            parameters.push(offset[0] * eigen.vector[0] + offset[1] * eigen.vector[1]);
            states.push(map.lift(point)?);
            points.push(point);
        }
        Ok(Self {
            parameters,
            points,
            states,
            iterates: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn states(&self) -> &[PhaseState] {
        &self.states
    }

    /// Map iterates applied since the fundamental domain was built.
    pub fn iterates(&self) -> usize {
        self.iterates
    }

    /// Maps every sample once, in place.
    pub fn advance<M: ReturnMap>(&mut self, map: &mut M, direction: TimeDirection) -> RtbpResult<()> {
        for (state, point) in self.states.iter_mut().zip(self.points.iter_mut()) {
            let image = map.iterate(state, direction)?;
            *state = image.state;
            *point = image.point;
        }
        self.iterates += 1;
        Ok(())
    }

    /// Index of the first pair of consecutive samples straddling `target`.
    pub fn first_straddle(&self, target: &TargetLine) -> Option<usize> {
        self.points
            .windows(2)
            .position(|pair| straddles(target.distance(pair[0]), target.distance(pair[1])))
    }
}

/// Coarse location of an intersection of a manifold with a target line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproximateIntersection {
    pub iterates: usize,
    /// Displacements along the eigenvector, `bracket.0 < bracket.1`.
    pub bracket: (f64, f64),
    /// Interpolated image point near the target line.
    pub point: Point2,
    /// Interpolated displacement inside the bracket.
    pub displacement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Approximation {
    Bracketed(ApproximateIntersection),
    /// The segment never straddled the target within the iterate budget.
    NoIntersectionFound { iterates: usize },
}

impl Approximation {
    pub fn bracketed(self) -> Option<ApproximateIntersection> {
        match self {
            Approximation::Bracketed(found) => Some(found),
            Approximation::NoIntersectionFound { .. } => None,
        }
    }
}

/// Iterates the fundamental domain of the `eigen` manifold of `fixed_point`
/// until it straddles `target`.
pub fn approximate_intersection<M: ReturnMap>(
    map: &mut M,
    fixed_point: Point2,
    eigen: &EigenDirection,
    displacement: f64,
    target: &TargetLine,
    settings: &ManifoldSettings,
) -> RtbpResult<Approximation> {
    let direction = eigen.stability().direction();
    let mut segment =
        ManifoldSegment::fundamental_domain(map, fixed_point, eigen, displacement, settings.samples)?;

    for _ in 0..settings.max_iterates {
        segment.advance(map, direction)?;
        debug!(
            iterate = segment.iterates(),
            first = ?segment.points()[0],
            last = ?segment.points()[segment.len() - 1],
            "globalized segment"
        );

        if let Some(i) = segment.first_straddle(target) {
            let (a, b) = (segment.points[i], segment.points[i + 1]);
            let (da, db) = (target.distance(a), target.distance(b));
            let t = if da == db { 0.0 } else { da / (da - db) };
            let (ha, hb) = (segment.parameters[i], segment.parameters[i + 1]);
            return Ok(Approximation::Bracketed(ApproximateIntersection {
                iterates: segment.iterates(),
                bracket: (ha.min(hb), ha.max(hb)),
                point: lerp(a, b, t),
                displacement: ha + t * (hb - ha),
            }));
        }
    }

    debug!(iterates = settings.max_iterates, "manifold did not reach the target");
    Ok(Approximation::NoIntersectionFound {
        iterates: settings.max_iterates,
    })
}

/// Picks the displacement along `eigen` that balances linearization error
/// against the error of globalizing a too short segment.
///
/// Starting from `settings.initial` the displacement shrinks by
/// `settings.shrink` while the linearization error
/// `|P(p + h v) - p - lambda h v|` stays above `settings.error_floor` and
/// keeps improving by at least `settings.min_improvement` per step.
pub fn optimal_displacement<M: ReturnMap>(
    map: &mut M,
    fixed_point: Point2,
    eigen: &EigenDirection,
    settings: &DisplacementSettings,
) -> RtbpResult<f64> {
    if !(settings.shrink > 1.0) || !(settings.initial > 0.0) {
        return Err(RtbpError::InvalidInput(format!(
            "displacement search needs initial > 0 and shrink > 1, got {} and {}",
            settings.initial, settings.shrink
        )));
    }
    let mut h = settings.initial;
    let mut error = linearization_error(map, fixed_point, eigen, h)?;
    loop {
        if error < settings.error_floor {
            return Ok(h);
        }
        let next = h / settings.shrink;
        if next < settings.min_displacement {
            return Ok(h);
        }
        let next_error = linearization_error(map, fixed_point, eigen, next)?;
        debug!(h = next, error = next_error, "linearization error");
        if next_error == 0.0 {
            return Ok(next);
        }
        if error / next_error < settings.min_improvement {
            return Ok(h);
        }
        h = next;
        error = next_error;
    }
}

fn linearization_error<M: ReturnMap>(
    map: &mut M,
    fixed_point: Point2,
    eigen: &EigenDirection,
    h: f64,
) -> RtbpResult<f64> {
    let image = map
        .apply(eigen.displace(fixed_point, h), eigen.stability().direction(), 1)?
        .point;
    let linear = eigen.displace(fixed_point, eigen.growth() * h);
    Ok((image[0] - linear[0]).hypot(image[1] - linear[1]))
}

fn lerp(a: Point2, b: Point2, t: f64) -> Point2 {
    [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]
}
