//! Planar circular restricted three-body problem in the rotating frame.
//!
//! Canonical coordinates `(x, y, px, py)`; the primary of mass `1 - mu` sits
//! at `(mu, 0)` and the secondary of mass `mu` at `(mu - 1, 0)`:
//!
//! `H = (px^2 + py^2)/2 - (x py - y px) - (1 - mu)/r1 - mu/r2`.

use serde::{Deserialize, Serialize};

use crate::error::{RtbpError, RtbpResult};
use crate::traits::{DynamicalSystem, Scalar};

/// A phase-space point `(x, y, px, py)` or `(l, L, g, G)`.
pub type PhaseState = [f64; 4];

/// The mass parameter of a run, passed explicitly to everything that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rtbp {
    mu: f64,
}

impl Rtbp {
    pub fn new(mu: f64) -> RtbpResult<Self> {
        if !mu.is_finite() || !(0.0..=0.5).contains(&mu) {
            return Err(RtbpError::InvalidInput(format!(
                "mass parameter must lie in [0, 0.5], got {mu}"
            )));
        }
        Ok(Self { mu })
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Gravitational potential `(1 - mu)/r1 + mu/r2` (positive).
    pub fn potential<T: Scalar>(&self, x: T, y: T) -> T {
        let mu = T::from_f64(self.mu).unwrap();
        let one = T::one();
        let r1 = ((x - mu).powi(2) + y * y).sqrt();
        let r2 = ((x - mu + one).powi(2) + y * y).sqrt();
        let mut omega = (one - mu) / r1;
        if self.mu > 0.0 {
            omega = omega + mu / r2;
        }
        omega
    }

    pub fn hamiltonian<T: Scalar>(&self, state: &[T]) -> T {
        let (x, y, px, py) = (state[0], state[1], state[2], state[3]);
        let half = T::from_f64(0.5).unwrap();
        half * (px * px + py * py) - (x * py - y * px) - self.potential(x, y)
    }

    /// Recovers `py` on `y = 0` from `(x, px)` and the energy level.
    ///
    /// `py = x + sign * sqrt(x^2 - px^2 + 2 Omega + 2 h)`, so `sign` is the
    /// sign of `dy/dt = py - x` at the lifted point.
    pub fn momentum_on_axis(&self, x: f64, px: f64, energy: f64, sign: f64) -> RtbpResult<f64> {
        let discriminant = x * x - px * px + 2.0 * self.potential(x, 0.0) + 2.0 * energy;
        if !discriminant.is_finite() || discriminant < 0.0 {
            return Err(RtbpError::EnergyInversion {
                energy,
                u: x,
                v: px,
            });
        }
        Ok(x + sign.signum() * discriminant.sqrt())
    }
}

impl<T: Scalar> DynamicalSystem<T> for Rtbp {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: T, s: &[T], out: &mut [T]) {
        let mu = T::from_f64(self.mu).unwrap();
        let one = T::one();
        let (x, y, px, py) = (s[0], s[1], s[2], s[3]);

        let d1 = x - mu;
        let d2 = x - mu + one;
        let r1_cubed = (d1 * d1 + y * y).sqrt().powi(3);
        let primary = (one - mu) / r1_cubed;

        out[0] = px + y;
        out[1] = py - x;
        out[2] = py - primary * d1;
        out[3] = -px - primary * y;

        if self.mu > 0.0 {
            let r2_cubed = (d2 * d2 + y * y).sqrt().powi(3);
            let secondary = mu / r2_cubed;
            out[2] = out[2] - secondary * d2;
            out[3] = out[3] - secondary * y;
        }
    }
}

/// State of a circular Kepler orbit of radius `radius` at polar angle
/// `angle`, as seen in the rotating frame of the `mu = 0` problem.
pub fn circular_orbit_state(radius: f64, angle: f64) -> PhaseState {
    let speed = radius.powf(-0.5);
    let (sin, cos) = angle.sin_cos();
    [radius * cos, radius * sin, -speed * sin, speed * cos]
}
