//! Poincaré sections of the planar RTBP.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::autodiff::directional_derivative;
use crate::delaunay::{mean_anomaly, pericentre_argument, to_cartesian, to_delaunay, wrap_angle};
use crate::error::{RtbpError, RtbpResult};
use crate::roots::{straddles, Brent};
use crate::rtbp::{PhaseState, Rtbp};
use crate::traits::{DynamicalSystem, Scalar};

const LIFT_BRACKET_WIDTH: f64 = 0.05;
const LIFT_BRACKET_EXPANSIONS: usize = 8;
const LIFT_TOLERANCE: f64 = 1e-16;
const LIFT_MAX_ITERS: usize = 100;

/// A point in the two reduced coordinates of a section.
pub type Point2 = [f64; 2];

/// Which geometric condition defines a Poincaré cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    /// `y = 0` crossed with `dy/dt < 0`.
    YDescending,
    /// `y = 0` crossed either way; only half-turns around the origin count,
    /// small loops that re-cross on the same side of the origin do not.
    YHalfTurn,
    /// Mean anomaly `l = 0` (pericentre passage).
    MeanAnomalyZero,
    /// Mean anomaly `l = pi` (apocentre passage).
    MeanAnomalyPi,
    /// Argument of the pericentre `g = 0`.
    PericentreZero,
    /// Argument of the pericentre `g = pi`.
    PericentrePi,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::YDescending,
        Section::YHalfTurn,
        Section::MeanAnomalyZero,
        Section::MeanAnomalyPi,
        Section::PericentreZero,
        Section::PericentrePi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::YDescending => "y-descending",
            Section::YHalfTurn => "y-half-turn",
            Section::MeanAnomalyZero => "mean-anomaly-zero",
            Section::MeanAnomalyPi => "mean-anomaly-pi",
            Section::PericentreZero => "pericentre-zero",
            Section::PericentrePi => "pericentre-pi",
        }
    }

    pub fn is_delaunay(self) -> bool {
        !matches!(self, Section::YDescending | Section::YHalfTurn)
    }

    /// Whether consecutive accepted crossings must alternate the sign of `x`.
    pub fn filters_loops(self) -> bool {
        matches!(self, Section::YHalfTurn)
    }

    /// Signed distance to the section; angles are wrapped to `[-pi, pi]`.
    pub fn distance<T: Scalar>(self, state: &[T]) -> T {
        let pi = T::from_f64(PI).unwrap();
        match self {
            Section::YDescending | Section::YHalfTurn => state[1],
            Section::MeanAnomalyZero => wrap_angle(mean_anomaly(state)),
            Section::MeanAnomalyPi => wrap_angle(mean_anomaly(state) - pi),
            Section::PericentreZero => wrap_angle(pericentre_argument(state)),
            Section::PericentrePi => wrap_angle(pericentre_argument(state) - pi),
        }
    }

    /// Signed distance and its derivative along the flow of `model`.
    pub fn value_and_rate(self, model: &Rtbp, state: &PhaseState) -> (f64, f64) {
        let mut field = [0.0; 4];
        DynamicalSystem::<f64>::apply(model, 0.0, state, &mut field);
        directional_derivative(|s| self.distance(s), state, &field)
    }

    /// Crossing test over one sub-step with distances `before` and `after`.
    ///
    /// Landing exactly on the section counts, leaving it does not. A sign
    /// change with a jump larger than pi is an angle wrapping around, not a
    /// crossing. `time_sign` is the sign of the sub-step; it orients the
    /// `dy/dt < 0` condition of [`Section::YDescending`] in backward time.
    pub fn crosses(self, before: f64, after: f64, time_sign: f64) -> bool {
        if before == 0.0 {
            return false;
        }
        if after != 0.0 && (before < 0.0) == (after < 0.0) {
            return false;
        }
        if self.is_delaunay() && (after - before).abs() > PI {
            return false;
        }
        match self {
            Section::YDescending => (after - before) * time_sign < 0.0,
            _ => true,
        }
    }

    /// True when both the distance and its rate are negligible.
    pub fn is_tangent(self, value: f64, rate: f64, tolerance: f64) -> bool {
        value.abs() <= tolerance && rate.abs() <= tolerance
    }

    /// Forces `state` onto the section by overriding the defining coordinate.
    pub fn project(self, state: &PhaseState) -> RtbpResult<PhaseState> {
        match self {
            Section::YDescending | Section::YHalfTurn => {
                let mut projected = *state;
                projected[1] = 0.0;
                Ok(projected)
            }
            _ => {
                let mut delaunay = to_delaunay(state)?;
                match self {
                    Section::MeanAnomalyZero => delaunay[0] = 0.0,
                    Section::MeanAnomalyPi => delaunay[0] = PI,
                    Section::PericentreZero => delaunay[2] = 0.0,
                    _ => delaunay[2] = PI,
                }
                to_cartesian(&delaunay)
            }
        }
    }

    /// Reduced coordinates on the section: `(x, px)` on `y = 0`, `(g, G)` on
    /// `l = const`, `(l, L)` on `g = const`.
    pub fn reduce(self, state: &PhaseState) -> RtbpResult<Point2> {
        match self {
            Section::YDescending | Section::YHalfTurn => Ok([state[0], state[2]]),
            Section::MeanAnomalyZero | Section::MeanAnomalyPi => {
                let d = to_delaunay(state)?;
                Ok([d[2], d[3]])
            }
            Section::PericentreZero | Section::PericentrePi => {
                let d = to_delaunay(state)?;
                Ok([d[0], d[1]])
            }
        }
    }

    /// Lifts reduced coordinates to the phase-space point on the section with
    /// energy `energy`.
    pub fn lift(self, model: &Rtbp, energy: f64, point: Point2) -> RtbpResult<PhaseState> {
        let [u, v] = point;
        match self {
            Section::YDescending => {
                let py = model.momentum_on_axis(u, v, energy, -1.0)?;
                Ok([u, 0.0, v, py])
            }
            Section::YHalfTurn => {
                // Counter-clockwise half-turns: dy/dt has the sign of x.
                let sign = if u >= 0.0 { 1.0 } else { -1.0 };
                let py = model.momentum_on_axis(u, v, energy, sign)?;
                Ok([u, 0.0, v, py])
            }
            Section::MeanAnomalyZero | Section::MeanAnomalyPi => {
                let l = if self == Section::MeanAnomalyZero { 0.0 } else { PI };
                let (g, big_g) = (u, v);
                let kepler = energy + big_g;
                if kepler >= 0.0 {
                    return Err(RtbpError::EnergyInversion { energy, u, v });
                }
                let guess = 1.0 / (-2.0 * kepler).sqrt();
                let floor = big_g.abs() * (1.0 + 1e-12);
                let big_l = solve_action(
                    |big_l| Ok(model.hamiltonian(&to_cartesian(&[l, big_l, g, big_g])?) - energy),
                    guess,
                    floor,
                    f64::INFINITY,
                )
                .map_err(|_| RtbpError::EnergyInversion { energy, u, v })?;
                to_cartesian(&[l, big_l, g, big_g])
            }
            Section::PericentreZero | Section::PericentrePi => {
                let g = if self == Section::PericentreZero { 0.0 } else { PI };
                let (l, big_l) = (u, v);
                if !(big_l > 0.0) {
                    return Err(RtbpError::EnergyInversion { energy, u, v });
                }
                let guess = -0.5 / (big_l * big_l) - energy;
                let big_g = solve_action(
                    |big_g| Ok(model.hamiltonian(&to_cartesian(&[l, big_l, g, big_g])?) - energy),
                    guess,
                    -big_l,
                    big_l,
                )
                .map_err(|_| RtbpError::EnergyInversion { energy, u, v })?;
                to_cartesian(&[l, big_l, g, big_g])
            }
        }
    }
}

/// Brackets and solves `f(action) = 0` around `guess` within `[lo, hi]`.
fn solve_action<F>(mut f: F, guess: f64, lo: f64, hi: f64) -> RtbpResult<f64>
where
    F: FnMut(f64) -> RtbpResult<f64>,
{
    let guess = guess.clamp(lo, hi);
    let mut width = LIFT_BRACKET_WIDTH * guess.abs().max(1.0);
    for _ in 0..LIFT_BRACKET_EXPANSIONS {
        let a = (guess - width).max(lo);
        let b = (guess + width).min(hi);
        let (fa, fb) = (f(a), f(b));
        if let (Ok(fa), Ok(fb)) = (fa, fb) {
            if straddles(fa, fb) {
                let report = Brent::new(LIFT_TOLERANCE, LIFT_MAX_ITERS)
                    .solve_with_values(&mut f, a, fa, b, fb)?;
                return Ok(report.root);
            }
        }
        width *= 2.0;
    }
    Err(RtbpError::InvalidInput(format!(
        "no sign change of the energy residual around action {guess}"
    )))
}
