//! Fixed points of a return map and the eigen-data of their linearization.

use nalgebra::linalg::SVD;
use nalgebra::{Matrix2, Vector2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NewtonSettings;
use crate::crossing::TimeDirection;
use crate::error::{RtbpError, RtbpResult};
use crate::manifold::{EigenDirection, Eigendata};
use crate::poincare::ReturnMap;
use crate::rtbp::PhaseState;
use crate::section::Point2;

/// Eigenvalues closer to the unit circle than this are not hyperbolic.
const HYPERBOLIC_MARGIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedPoint {
    pub point: Point2,
    pub state: PhaseState,
    /// Integration time of one map iterate, the period of the orbit.
    pub period: f64,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major Jacobian of the map at `point`.
    pub jacobian: [[f64; 2]; 2],
}

/// Newton iteration on `P(p) - p` from `guess`.
pub fn solve_fixed_point<M: ReturnMap>(
    map: &mut M,
    guess: Point2,
    settings: &NewtonSettings,
) -> RtbpResult<FixedPoint> {
    if settings.max_steps == 0 {
        return Err(RtbpError::InvalidInput(
            "max_steps must be greater than zero".to_string(),
        ));
    }
    if settings.damping <= 0.0 || settings.tolerance <= 0.0 || settings.jacobian_step <= 0.0 {
        return Err(RtbpError::InvalidInput(
            "damping, tolerance and jacobian_step must be positive".to_string(),
        ));
    }

    let mut point = guess;
    let mut residual = displacement(map, point)?;
    let mut residual_norm = residual.norm();
    let mut iterations = 0usize;

    while residual_norm > settings.tolerance {
        if iterations >= settings.max_steps {
            return Err(RtbpError::FixedPoint {
                iterations,
                residual: residual_norm,
                message: "did not converge".to_string(),
            });
        }

        let jacobian = map_jacobian(map, point, settings.jacobian_step)? - Matrix2::identity();
        let delta = jacobian.lu().solve(&residual).ok_or_else(|| RtbpError::FixedPoint {
            iterations,
            residual: residual_norm,
            message: "P - I is singular".to_string(),
        })?;

        point[0] -= settings.damping * delta[0];
        point[1] -= settings.damping * delta[1];
        iterations += 1;
        residual = displacement(map, point)?;
        residual_norm = residual.norm();
        debug!(iteration = iterations, residual = residual_norm, "newton step");
    }

    let jacobian = map_jacobian(map, point, settings.jacobian_step)?;
    let image = map.apply(point, TimeDirection::Forward, 1)?;
    Ok(FixedPoint {
        point,
        state: map.lift(point)?,
        period: image.time,
        residual_norm,
        iterations,
        jacobian: [
            [jacobian[(0, 0)], jacobian[(0, 1)]],
            [jacobian[(1, 0)], jacobian[(1, 1)]],
        ],
    })
}

/// Jacobian of one forward iterate by central differences.
pub fn map_jacobian<M: ReturnMap>(map: &mut M, point: Point2, step: f64) -> RtbpResult<Matrix2<f64>> {
    let mut jacobian = Matrix2::zeros();
    for j in 0..2 {
        let mut plus = point;
        let mut minus = point;
        plus[j] += step;
        minus[j] -= step;
        let forward = map.apply(plus, TimeDirection::Forward, 1)?.point;
        let backward = map.apply(minus, TimeDirection::Forward, 1)?.point;
        for i in 0..2 {
            jacobian[(i, j)] = (forward[i] - backward[i]) / (2.0 * step);
        }
    }
    Ok(jacobian)
}

/// Unit eigenvectors of a real saddle, each with its first non-negligible
/// component positive.
pub fn eigendata(jacobian: &[[f64; 2]; 2]) -> RtbpResult<Eigendata> {
    let matrix = Matrix2::new(
        jacobian[0][0],
        jacobian[0][1],
        jacobian[1][0],
        jacobian[1][1],
    );
    let eigenvalues = matrix.complex_eigenvalues();
    let (first, second): (Complex64, Complex64) = (eigenvalues[0], eigenvalues[1]);
    let not_saddle = || RtbpError::NotSaddle { first, second };

    let is_real = |z: Complex64| z.im.abs() <= 1e-12 * z.re.abs().max(1.0);
    if !is_real(first) || !is_real(second) {
        return Err(not_saddle());
    }
    let (unstable, stable) = if first.re.abs() >= second.re.abs() {
        (first.re, second.re)
    } else {
        (second.re, first.re)
    };
    if unstable.abs() <= 1.0 + HYPERBOLIC_MARGIN || stable.abs() >= 1.0 - HYPERBOLIC_MARGIN {
        return Err(not_saddle());
    }

    Ok(Eigendata {
        unstable: EigenDirection {
            value: unstable,
            vector: null_vector(&matrix, unstable).ok_or_else(not_saddle)?,
        },
        stable: EigenDirection {
            value: stable,
            vector: null_vector(&matrix, stable).ok_or_else(not_saddle)?,
        },
    })
}

fn null_vector(matrix: &Matrix2<f64>, lambda: f64) -> Option<Point2> {
    let shifted = matrix - Matrix2::identity() * lambda;
    let svd = SVD::new(shifted, true, true);
    let v_t = svd.v_t?;
    let row = v_t.row(v_t.nrows() - 1);
    let mut vector = Vector2::new(row[0], row[1]);
    let norm = vector.norm();
    if norm == 0.0 {
        return None;
    }
    vector /= norm;
    let leading = if vector[0].abs() > 1e-12 { vector[0] } else { vector[1] };
    if leading < 0.0 {
        vector = -vector;
    }
    Some([vector[0], vector[1]])
}

fn displacement<M: ReturnMap>(map: &mut M, point: Point2) -> RtbpResult<Vector2<f64>> {
    let image = map.apply(point, TimeDirection::Forward, 1)?.point;
    Ok(Vector2::new(image[0] - point[0], image[1] - point[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poincare::test_maps::QuadraticSaddle;

    #[test]
    fn newton_finds_shifted_saddle() {
        let mut map = QuadraticSaddle::new(1.0);
        map.offset = 0.3;
        let fixed = solve_fixed_point(&mut map, [0.05, 0.4], &NewtonSettings::default()).unwrap();
        assert!(fixed.point[0].abs() < 1e-12);
        assert!((fixed.point[1] - 0.6).abs() < 1e-12);
        assert_eq!(fixed.period, 1.0);
        assert!((fixed.jacobian[0][0] - 2.0).abs() < 1e-8);
        assert!((fixed.jacobian[1][1] - 0.5).abs() < 1e-8);
        assert!(fixed.jacobian[1][0].abs() < 1e-8);
    }

    #[test]
    fn newton_reports_exhausted_steps() {
        let mut map = QuadraticSaddle::new(1.0);
        let settings = NewtonSettings {
            max_steps: 1,
            damping: 0.1,
            ..NewtonSettings::default()
        };
        let result = solve_fixed_point(&mut map, [0.2, 0.3], &settings);
        assert!(matches!(result, Err(RtbpError::FixedPoint { iterations: 1, .. })));
    }

    #[test]
    fn eigendata_of_diagonal_saddle() {
        let data = eigendata(&[[2.0, 0.0], [0.0, 0.5]]).unwrap();
        assert!((data.unstable.value - 2.0).abs() < 1e-12);
        assert!((data.stable.value - 0.5).abs() < 1e-12);
        assert!((data.unstable.vector[0] - 1.0).abs() < 1e-12);
        assert!(data.unstable.vector[1].abs() < 1e-12);
        assert!((data.stable.vector[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn eigenvectors_are_unit_and_sign_normalized() {
        // Eigenvalues 3 and 1/3 with non-orthogonal eigenvectors.
        let jacobian = [[3.0, -8.0 / 3.0], [0.0, 1.0 / 3.0]];
        let data = eigendata(&jacobian).unwrap();
        for direction in [data.unstable, data.stable] {
            let [a, b] = direction.vector;
            assert!(((a * a + b * b).sqrt() - 1.0).abs() < 1e-12);
            assert!(a > 0.0 || (a.abs() <= 1e-12 && b > 0.0));
            let image = [
                jacobian[0][0] * a + jacobian[0][1] * b,
                jacobian[1][0] * a + jacobian[1][1] * b,
            ];
            assert!((image[0] - direction.value * a).abs() < 1e-12);
            assert!((image[1] - direction.value * b).abs() < 1e-12);
        }
    }

    #[test]
    fn elliptic_and_attracting_points_are_rejected() {
        let rotation = [[0.0, -1.0], [1.0, 0.0]];
        assert!(matches!(eigendata(&rotation), Err(RtbpError::NotSaddle { .. })));
        let sink = [[0.5, 0.0], [0.0, 0.8]];
        assert!(matches!(eigendata(&sink), Err(RtbpError::NotSaddle { .. })));
    }
}
