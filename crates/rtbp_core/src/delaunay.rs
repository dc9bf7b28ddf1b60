//! Delaunay chart `(l, L, g, G)` of the Kepler part of the rotating-frame
//! Hamiltonian, `H0 = -1/(2 L^2) - G`.
//!
//! The Kepler problem has unit gravitational parameter and is centred at the
//! origin. `g` is the argument of the pericentre measured in the rotating
//! frame, so it drifts at unit negative rate when `mu = 0`.

use std::f64::consts::{PI, TAU};

use crate::error::{RtbpError, RtbpResult};
use crate::rtbp::PhaseState;
use crate::traits::Scalar;

const KEPLER_TOL: f64 = 1e-15;
const KEPLER_MAX_ITERS: usize = 50;

/// Wraps an angle to `[-pi, pi]`.
pub fn wrap_angle<T: Scalar>(angle: T) -> T {
    let tau = T::from_f64(TAU).unwrap();
    angle - tau * (angle / tau).round()
}

/// Mean anomaly `l` of the osculating Kepler ellipse.
/// NaN outside the elliptic region.
pub fn mean_anomaly<T: Scalar>(s: &[T]) -> T {
    let (x, y, px, py) = (s[0], s[1], s[2], s[3]);
    let half = T::from_f64(0.5).unwrap();
    let one = T::one();
    let r = (x * x + y * y).sqrt();
    let energy = half * (px * px + py * py) - one / r;
    let big_l = one / (-(energy + energy)).sqrt();
    let semi_major = big_l * big_l;
    let radial = (x * px + y * py) / big_l;
    let eccentric = radial.atan2(one - r / semi_major);
    eccentric - radial
}

/// Argument of the pericentre `g`: direction of the Laplace-Runge-Lenz vector.
pub fn pericentre_argument<T: Scalar>(s: &[T]) -> T {
    let (x, y, px, py) = (s[0], s[1], s[2], s[3]);
    let r = (x * x + y * y).sqrt();
    let big_g = x * py - y * px;
    let ex = py * big_g - x / r;
    let ey = -px * big_g - y / r;
    ey.atan2(ex)
}

/// Cartesian `(x, y, px, py)` to Delaunay `(l, L, g, G)`.
pub fn to_delaunay(state: &PhaseState) -> RtbpResult<PhaseState> {
    let [x, y, px, py] = *state;
    let r = x.hypot(y);
    if r <= 0.0 || !r.is_finite() {
        return Err(RtbpError::Delaunay(format!(
            "position ({x}, {y}) is at the origin or not finite"
        )));
    }
    let energy = 0.5 * (px * px + py * py) - 1.0 / r;
    if energy >= 0.0 {
        return Err(RtbpError::Delaunay(format!(
            "Kepler energy {energy} is not elliptic"
        )));
    }
    let big_l = 1.0 / (-2.0 * energy).sqrt();
    let big_g = x * py - y * px;
    Ok([
        wrap_angle(mean_anomaly(state)),
        big_l,
        wrap_angle(pericentre_argument(state)),
        big_g,
    ])
}

/// Delaunay `(l, L, g, G)` to Cartesian `(x, y, px, py)`.
pub fn to_cartesian(delaunay: &PhaseState) -> RtbpResult<PhaseState> {
    let [l, big_l, g, big_g] = *delaunay;
    if !(big_l > 0.0) || big_g.abs() > big_l {
        return Err(RtbpError::Delaunay(format!(
            "actions (L, G) = ({big_l}, {big_g}) need L > 0 and |G| <= L"
        )));
    }
    let ratio = big_g / big_l;
    let e = (1.0 - ratio * ratio).max(0.0).sqrt();
    let u = solve_kepler(l, e)?;

    let a = big_l * big_l;
    let n = big_l.powi(-3);
    let (su, cu) = u.sin_cos();
    let u_dot = n / (1.0 - e * cu);

    let orbital = [
        a * (cu - e),
        a * ratio * su,
        -a * su * u_dot,
        a * ratio * cu * u_dot,
    ];
    let (sg, cg) = g.sin_cos();
    Ok([
        cg * orbital[0] - sg * orbital[1],
        sg * orbital[0] + cg * orbital[1],
        cg * orbital[2] - sg * orbital[3],
        sg * orbital[2] + cg * orbital[3],
    ])
}

/// Eccentric anomaly `u` with `u - e sin u = l`.
fn solve_kepler(l: f64, e: f64) -> RtbpResult<f64> {
    let mean = wrap_angle(l);
    let mut u = if e > 0.8 { PI.copysign(mean) } else { mean + e * mean.sin() };
    for _ in 0..KEPLER_MAX_ITERS {
        let residual = u - e * u.sin() - mean;
        let step = residual / (1.0 - e * u.cos());
        u -= step;
        if step.abs() <= KEPLER_TOL * (1.0 + u.abs()) {
            return Ok(u + (l - mean));
        }
    }
    Err(RtbpError::Delaunay(format!(
        "Kepler equation did not converge for l = {l}, e = {e}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::directional_derivative;
    use crate::rtbp::Rtbp;
    use crate::traits::DynamicalSystem;

    fn angle_distance(a: f64, b: f64) -> f64 {
        wrap_angle(a - b).abs()
    }

    #[test]
    fn chart_round_trip_on_eccentric_orbit() {
        let delaunay = [1.2, 0.69, -0.4, 0.6];
        let cartesian = to_cartesian(&delaunay).unwrap();
        let back = to_delaunay(&cartesian).unwrap();
        assert!(angle_distance(back[0], delaunay[0]) < 1e-12);
        assert!((back[1] - delaunay[1]).abs() < 1e-12);
        assert!(angle_distance(back[2], delaunay[2]) < 1e-12);
        assert!((back[3] - delaunay[3]).abs() < 1e-12);
    }

    #[test]
    fn pericentre_of_retrograde_orbit() {
        let delaunay = [0.3, 0.8, 2.0, -0.5];
        let back = to_delaunay(&to_cartesian(&delaunay).unwrap()).unwrap();
        assert!(angle_distance(back[2], 2.0) < 1e-12);
        assert!((back[3] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn hyperbolic_state_is_rejected() {
        let result = to_delaunay(&[1.0, 0.0, 0.0, 2.0]);
        assert!(matches!(result, Err(RtbpError::Delaunay(_))));
    }

    #[test]
    fn angle_rates_along_kepler_flow() {
        let model = Rtbp::new(0.0).unwrap();
        let delaunay = [0.5, 0.7, 1.0, 0.55];
        let state = to_cartesian(&delaunay).unwrap();
        let mut field = [0.0; 4];
        DynamicalSystem::<f64>::apply(&model, 0.0, &state, &mut field);

        let (_, l_rate) = directional_derivative(|s| mean_anomaly(s), &state, &field);
        let (_, g_rate) = directional_derivative(|s| pericentre_argument(s), &state, &field);
        assert!((l_rate - 0.7_f64.powi(-3)).abs() < 1e-10);
        assert!((g_rate + 1.0).abs() < 1e-10);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for k in -5..5 {
            let wrapped = wrap_angle(0.3 + TAU * k as f64);
            assert!((wrapped - 0.3).abs() < 1e-12);
        }
        assert!(wrap_angle(3.5_f64) < 0.0);
    }
}
