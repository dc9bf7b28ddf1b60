//! Refinement of a bracketed manifold intersection to full precision.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConvergencePolicy, RefineSettings};
use crate::crossing::TimeDirection;
use crate::error::{RtbpError, RtbpResult};
use crate::manifold::{EigenDirection, TargetLine};
use crate::poincare::ReturnMap;
use crate::roots::{Brent, RootStatus};
use crate::rtbp::PhaseState;
use crate::section::Point2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    /// Displacement along the eigenvector whose image lies on the target.
    pub displacement: f64,
    /// `fixed_point + displacement * eigenvector`.
    pub preimage: Point2,
    pub preimage_state: PhaseState,
    pub homoclinic_point: Point2,
    pub homoclinic_state: PhaseState,
    /// Integration time from the preimage to the homoclinic point.
    pub time: f64,
    /// Signed distance of the homoclinic point to the target line.
    pub residual: f64,
    pub iterations: usize,
    /// Final bracket of the root search.
    pub bracket: (f64, f64),
    pub status: RootStatus,
}

/// Solves `distance(h) = 0` on `bracket`, where `distance(h)` is the signed
/// distance to `target` of `iterates` map iterates of
/// `fixed_point + h * eigen.vector`.
///
/// Endpoints are reordered if needed; a bracket without a sign change is an
/// `InvalidBracket` error. Exhausting the iteration cap is handled according
/// to `settings.policy`.
#[allow(clippy::too_many_arguments)]
pub fn refine_intersection<M: ReturnMap>(
    map: &mut M,
    fixed_point: Point2,
    eigen: &EigenDirection,
    bracket: (f64, f64),
    target: &TargetLine,
    iterates: usize,
    direction: TimeDirection,
    settings: &RefineSettings,
) -> RtbpResult<Refinement> {
    let brent = Brent::new(settings.tolerance, settings.max_iterations);
    let report = brent.solve(
        |h| {
            let image = map.apply(eigen.displace(fixed_point, h), direction, iterates)?;
            Ok::<f64, RtbpError>(target.distance(image.point))
        },
        bracket.0,
        bracket.1,
    )?;

    if !report.status.is_converged() {
        match settings.policy {
            ConvergencePolicy::BestEffort => warn!(
                displacement = report.root,
                residual = report.residual,
                iterations = report.iterations,
                "intersection refinement did not converge; keeping best estimate"
            ),
            ConvergencePolicy::Reject => {
                return Err(RtbpError::NotConverged {
                    estimate: report.root,
                    residual: report.residual,
                    iterations: report.iterations,
                })
            }
        }
    }

    let preimage = eigen.displace(fixed_point, report.root);
    let preimage_state = map.lift(preimage)?;
    let image = map.apply(preimage, direction, iterates)?;
    debug!(
        displacement = report.root,
        residual = report.residual,
        iterations = report.iterations,
        time = image.time,
        "refined intersection"
    );

    Ok(Refinement {
        displacement: report.root,
        preimage,
        preimage_state,
        homoclinic_point: image.point,
        homoclinic_state: image.state,
        time: image.time,
        residual: target.distance(image.point),
        iterations: report.iterations,
        bracket: report.bracket,
        status: report.status.and(image.status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifoldSettings;
    use crate::manifold::{approximate_intersection, Axis};
    use crate::poincare::test_maps::QuadraticSaddle;

    fn unstable() -> EigenDirection {
        EigenDirection {
            value: 2.0,
            vector: [1.0, 0.0],
        }
    }

    #[test]
    fn refines_globalized_bracket_to_target() {
        let mut map = QuadraticSaddle::new(1.0);
        let target = TargetLine::new(Axis::Second, 0.1);
        let found = approximate_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            1e-4,
            &target,
            &ManifoldSettings::default(),
        )
        .unwrap()
        .bracketed()
        .unwrap();

        let refined = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            found.bracket,
            &target,
            found.iterates,
            TimeDirection::Forward,
            &RefineSettings::default(),
        )
        .unwrap();

        assert!(refined.status.is_converged());
        assert!(refined.residual.abs() < 1e-13);
        assert!(refined.iterations <= 100);
        assert_eq!(refined.time, found.iterates as f64);
        assert_eq!(refined.preimage, [refined.displacement, 0.0]);
        // P^k(h, 0) has y = h^2 2^(1-k) (8^k - 1) / 7.
        let k = found.iterates as i32;
        let exact = (0.7 / (2.0_f64.powi(1 - k) * (8.0_f64.powi(k) - 1.0))).sqrt();
        assert!((refined.displacement - exact).abs() < 1e-15);
    }

    #[test]
    fn residual_never_exceeds_endpoint_residuals() {
        let mut map = QuadraticSaddle::new(1.0);
        let target = TargetLine::new(Axis::First, 0.5);
        let bracket = (1e-4, 2e-4);
        let refined = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            bracket,
            &target,
            12,
            TimeDirection::Forward,
            &RefineSettings::default(),
        )
        .unwrap();
        let at = |h: f64| (4096.0 * h - 0.5).abs();
        assert!(refined.residual.abs() <= at(bracket.0).min(at(bracket.1)));
        assert!((refined.displacement - 0.5 / 4096.0).abs() < 1e-17);
    }

    #[test]
    fn reversed_bracket_is_accepted() {
        let mut map = QuadraticSaddle::new(1.0);
        let target = TargetLine::new(Axis::First, 0.5);
        let refined = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            (2e-4, 1e-4),
            &target,
            12,
            TimeDirection::Forward,
            &RefineSettings::default(),
        )
        .unwrap();
        assert!(refined.bracket.0 <= refined.bracket.1);
    }

    #[test]
    fn bracket_without_sign_change_is_rejected() {
        let mut map = QuadraticSaddle::new(1.0);
        let target = TargetLine::new(Axis::First, 0.5);
        let result = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            (1e-5, 2e-5),
            &target,
            12,
            TimeDirection::Forward,
            &RefineSettings::default(),
        );
        assert!(matches!(result, Err(RtbpError::InvalidBracket { .. })));
    }

    #[test]
    fn iteration_cap_follows_policy() {
        let target = TargetLine::new(Axis::Second, 0.1);
        let tight = RefineSettings {
            tolerance: 0.0,
            max_iterations: 2,
            policy: ConvergencePolicy::BestEffort,
        };
        let mut map = QuadraticSaddle::new(1.0);
        let best_effort = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            (1e-4, 2e-4),
            &target,
            12,
            TimeDirection::Forward,
            &tight,
        )
        .unwrap();
        assert_eq!(best_effort.status, RootStatus::NotConverged);
        assert_eq!(best_effort.iterations, 2);

        let reject = RefineSettings {
            policy: ConvergencePolicy::Reject,
            ..tight
        };
        let result = refine_intersection(
            &mut map,
            [0.0, 0.0],
            &unstable(),
            (1e-4, 2e-4),
            &target,
            12,
            TimeDirection::Forward,
            &reject,
        );
        assert!(matches!(
            result,
            Err(RtbpError::NotConverged { iterations: 2, .. })
        ));
    }
}
