//! Run settings.
//!
//! Every struct deserializes with missing fields filled from its `Default`,
//! so a JSON config only needs to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::delaunay::to_delaunay;
use crate::error::RtbpResult;
use crate::rtbp::PhaseState;
use crate::section::Section;

/// What to do when a bracketed root search runs out of iterations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergencePolicy {
    /// Keep the last estimate, flagged as not converged.
    #[default]
    BestEffort,
    /// Fail with `RtbpError::NotConverged`.
    Reject,
}

/// Tolerances of the adaptive flow integrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
    /// Internal steps allowed for a single `advance` call.
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            abs_tol: 1e-14,
            rel_tol: 1e-14,
            initial_step: 1e-3,
            min_step: 1e-14,
            max_step: 0.1,
            max_steps: 100_000,
        }
    }
}

/// Event detection on a Poincaré section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionSettings {
    /// Sub-step between crossing tests for `y = 0` sections.
    pub cartesian_step: f64,
    /// Sub-step between crossing tests for Delaunay-angle sections, for
    /// orbits with `L >= 1`. Faster orbits use `delaunay_step * L^3`, so the
    /// mean anomaly never moves by more than `delaunay_step` per sub-step.
    pub delaunay_step: f64,
    pub root_tolerance: f64,
    pub root_max_iterations: usize,
    pub tangency_tolerance: f64,
    /// A start closer than this to the section counts as lying on it.
    pub start_tolerance: f64,
    /// Bound on |elapsed time| of a single call.
    pub max_time: f64,
    pub policy: ConvergencePolicy,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            cartesian_step: 1e-2,
            delaunay_step: 1e-1,
            root_tolerance: 1e-16,
            root_max_iterations: 100,
            tangency_tolerance: 1e-10,
            start_tolerance: 1e-13,
            max_time: 1e3,
            policy: ConvergencePolicy::BestEffort,
        }
    }
}

impl SectionSettings {
    /// Sub-step of a search on `section` starting from `start`.
    pub fn sub_step(&self, section: Section, start: &PhaseState) -> RtbpResult<f64> {
        if !section.is_delaunay() {
            return Ok(self.cartesian_step);
        }
        let big_l = to_delaunay(start)?[1];
        Ok(self.delaunay_step * big_l.powi(3).min(1.0))
    }
}

/// Globalization of a discretized fundamental domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifoldSettings {
    pub samples: usize,
    pub max_iterates: usize,
}

impl Default for ManifoldSettings {
    fn default() -> Self {
        Self {
            samples: 20,
            max_iterates: 100,
        }
    }
}

/// Search for the displacement along the eigenvector that balances local
/// linearization error against accumulated integration error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementSettings {
    pub initial: f64,
    pub shrink: f64,
    pub error_floor: f64,
    pub min_improvement: f64,
    pub min_displacement: f64,
}

impl Default for DisplacementSettings {
    fn default() -> Self {
        Self {
            initial: 1e-2,
            shrink: 10.0,
            error_floor: 1e-4,
            min_improvement: 10.0,
            min_displacement: 1e-12,
        }
    }
}

/// Bracketed refinement of a homoclinic displacement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub policy: ConvergencePolicy,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-16,
            max_iterations: 100,
            policy: ConvergencePolicy::BestEffort,
        }
    }
}

/// Damped Newton iteration for fixed points of a return map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
    /// Step of the central differences used for the Jacobian.
    pub jacobian_step: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-12,
            jacobian_step: 1e-7,
        }
    }
}

/// Everything one run of the pipeline needs besides its input records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub mu: f64,
    pub section: Section,
    pub integrator: IntegratorSettings,
    pub crossing: SectionSettings,
    pub manifold: ManifoldSettings,
    pub displacement: DisplacementSettings,
    pub refine: RefineSettings,
    pub newton: NewtonSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mu: 0.00095,
            section: Section::YDescending,
            integrator: IntegratorSettings::default(),
            crossing: SectionSettings::default(),
            manifold: ManifoldSettings::default(),
            displacement: DisplacementSettings::default(),
            refine: RefineSettings::default(),
            newton: NewtonSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtbp::circular_orbit_state;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{ "mu": 0.001, "section": "mean-anomaly-pi", "refine": { "policy": "reject" } }"#,
        )
        .expect("config should parse");
        assert_eq!(config.mu, 0.001);
        assert_eq!(config.section, Section::MeanAnomalyPi);
        assert_eq!(config.refine.policy, ConvergencePolicy::Reject);
        assert_eq!(config.refine.max_iterations, 100);
        assert_eq!(config.manifold.samples, 20);
    }

    #[test]
    fn sub_step_depends_on_section_family() {
        let settings = SectionSettings::default();
        let slow = circular_orbit_state(4.0, 0.3);
        assert_eq!(settings.sub_step(Section::YDescending, &slow).unwrap(), 1e-2);
        assert_eq!(settings.sub_step(Section::PericentreZero, &slow).unwrap(), 1e-1);
    }

    #[test]
    fn delaunay_sub_step_follows_the_mean_motion() {
        let settings = SectionSettings::default();
        // L = 0.5, so one sub-step is an eighth of the slow-orbit step.
        let fast = circular_orbit_state(0.25, 0.3);
        let step = settings.sub_step(Section::MeanAnomalyZero, &fast).unwrap();
        assert!((step - 0.1 / 8.0).abs() < 1e-15);
        assert_eq!(settings.sub_step(Section::YHalfTurn, &fast).unwrap(), 1e-2);
    }

    #[test]
    fn hyperbolic_start_has_no_delaunay_sub_step() {
        let settings = SectionSettings::default();
        let escaping = [1.0, 0.0, 0.0, 2.0];
        assert!(matches!(
            settings.sub_step(Section::MeanAnomalyPi, &escaping),
            Err(crate::error::RtbpError::Delaunay(_))
        ));
    }
}
