//! Event detection on top of a black-box flow.
//!
//! The state is advanced by fixed sub-steps; when a sub-step changes the sign
//! of the section distance, Brent's method on the elapsed sub-step time
//! locates the crossing, which is then projected exactly onto the section.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{ConvergencePolicy, SectionSettings};
use crate::delaunay::to_delaunay;
use crate::error::{RtbpError, RtbpResult};
use crate::roots::{Brent, RootStatus};
use crate::rtbp::{PhaseState, Rtbp};
use crate::section::Section;
use crate::traits::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeDirection {
    Forward,
    Backward,
}

impl TimeDirection {
    pub fn sign(self) -> f64 {
        match self {
            TimeDirection::Forward => 1.0,
            TimeDirection::Backward => -1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            TimeDirection::Forward => TimeDirection::Backward,
            TimeDirection::Backward => TimeDirection::Forward,
        }
    }
}

/// A refined crossing, already projected onto its section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub state: PhaseState,
    /// Signed time since the start of the search.
    pub time: f64,
    pub status: RootStatus,
}

impl Crossing {
    fn left_of_origin(&self) -> bool {
        self.state[0] < 0.0
    }
}

/// One-slot lookahead that rejects contractible loops.
///
/// A raw crossing is held until the next one is seen. It is accepted when
/// that next crossing lies on the other side of the origin and it is itself
/// on the other side from the previous accepted crossing, or from the start
/// of the search when the start lies on the section. Anything else is a loop
/// and the newer crossing takes the slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CrossingFilter {
    #[default]
    NoPending,
    /// Nothing held yet; the last accepted crossing (or the start) lies on
    /// the left of the origin when `left` is true.
    Anchored { left: bool },
    Pending {
        crossing: Crossing,
        /// Side of the last accepted crossing or start, if any.
        anchor: Option<bool>,
    },
}

impl CrossingFilter {
    /// Filter for a search from `start`, anchored on the side of `start`
    /// when it lies on the section.
    pub fn starting_at(start: &PhaseState, on_section: bool) -> Self {
        if on_section {
            CrossingFilter::Anchored {
                left: start[0] < 0.0,
            }
        } else {
            CrossingFilter::NoPending
        }
    }

    /// Feeds the next raw crossing, returning the crossing it confirms.
    pub fn observe(self, crossing: Crossing) -> (CrossingFilter, Option<Crossing>) {
        match self {
            CrossingFilter::NoPending => (
                CrossingFilter::Pending {
                    crossing,
                    anchor: None,
                },
                None,
            ),
            CrossingFilter::Anchored { left } => (
                CrossingFilter::Pending {
                    crossing,
                    anchor: Some(left),
                },
                None,
            ),
            CrossingFilter::Pending { crossing: pending, anchor } => {
                let side = pending.left_of_origin();
                let turned = side != crossing.left_of_origin();
                let moved_on = anchor != Some(side);
                if turned && moved_on {
                    let next = CrossingFilter::Pending {
                        crossing,
                        anchor: Some(side),
                    };
                    (next, Some(pending))
                } else {
                    (CrossingFilter::Pending { crossing, anchor }, None)
                }
            }
        }
    }
}

/// Result of a section search over one or more cuts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionHit {
    pub state: PhaseState,
    /// Accumulated time; negative for inverse searches.
    pub time: f64,
    /// `NotConverged` if any of the crossing refinements hit its cap.
    pub status: RootStatus,
}

/// Advances `start` forward in time to its `cuts`-th crossing of `section`.
pub fn advance_to_section<F: Flow>(
    model: &Rtbp,
    flow: &mut F,
    start: &PhaseState,
    section: Section,
    cuts: usize,
    settings: &SectionSettings,
) -> RtbpResult<SectionHit> {
    advance(model, flow, start, section, cuts, TimeDirection::Forward, settings)
}

/// Same as [`advance_to_section`] with time flowing backward.
pub fn advance_to_section_inverse<F: Flow>(
    model: &Rtbp,
    flow: &mut F,
    start: &PhaseState,
    section: Section,
    cuts: usize,
    settings: &SectionSettings,
) -> RtbpResult<SectionHit> {
    advance(model, flow, start, section, cuts, TimeDirection::Backward, settings)
}

/// Section search in either time direction.
pub fn advance<F: Flow>(
    model: &Rtbp,
    flow: &mut F,
    start: &PhaseState,
    section: Section,
    cuts: usize,
    direction: TimeDirection,
    settings: &SectionSettings,
) -> RtbpResult<SectionHit> {
    if cuts == 0 {
        return Err(RtbpError::InvalidInput(
            "a section search needs at least one cut".to_string(),
        ));
    }
    if section.is_delaunay() {
        to_delaunay(start)?;
        let (value, rate) = section.value_and_rate(model, start);
        if rate.abs() <= settings.tangency_tolerance {
            return Err(RtbpError::Tangency {
                section: section.name(),
                value,
                rate,
            });
        }
    }

    let sign = direction.sign();
    let step = sign * settings.sub_step(section, start)?;
    let mut state = *start;
    let mut elapsed = 0.0_f64;
    let mut before = section.distance(&state);
    if before.abs() <= settings.start_tolerance {
        // Leaving the section is not a crossing.
        before = 0.0;
    }
    let mut filter = CrossingFilter::starting_at(start, before == 0.0);
    let mut found = 0;
    let mut status = RootStatus::Converged;

    loop {
        if elapsed.abs() >= settings.max_time {
            return Err(RtbpError::SectionNotReached {
                section: section.name(),
                max_time: settings.max_time,
            });
        }

        let mut next = state;
        flow.advance(model, &mut next, step)?;
        let after = section.distance(&next);

        if section.crosses(before, after, sign) {
            let crossing =
                locate_crossing(model, flow, section, &state, before, after, step, settings)?;
            let crossing = Crossing {
                time: elapsed + crossing.time,
                ..crossing
            };
            trace!(time = crossing.time, x = crossing.state[0], "raw crossing");

            let accepted = if section.filters_loops() {
                let (next_filter, accepted) = filter.observe(crossing);
                filter = next_filter;
                accepted
            } else {
                Some(crossing)
            };

            if let Some(accepted) = accepted {
                found += 1;
                status = status.and(accepted.status);
                debug!(
                    section = section.name(),
                    cut = found,
                    time = accepted.time,
                    "accepted crossing"
                );
                if found == cuts {
                    return Ok(SectionHit {
                        state: accepted.state,
                        time: accepted.time,
                        status,
                    });
                }
            }
        }

        state = next;
        before = after;
        elapsed += step;
    }
}

/// Refines a crossing inside the sub-step from `state`. Returned time is
/// relative to `state`.
#[allow(clippy::too_many_arguments)]
fn locate_crossing<F: Flow>(
    model: &Rtbp,
    flow: &mut F,
    section: Section,
    state: &PhaseState,
    before: f64,
    after: f64,
    step: f64,
    settings: &SectionSettings,
) -> RtbpResult<Crossing> {
    let sign = step.signum();
    let brent = Brent::new(settings.root_tolerance, settings.root_max_iterations);
    let report = brent.solve_with_values(
        |tau| {
            let mut trial = *state;
            flow.advance(model, &mut trial, sign * tau)?;
            Ok::<f64, RtbpError>(section.distance(&trial))
        },
        0.0,
        before,
        step.abs(),
        after,
    )?;

    let mut hit = *state;
    flow.advance(model, &mut hit, sign * report.root)?;
    let hit = section.project(&hit)?;

    let (value, rate) = section.value_and_rate(model, &hit);
    if section.is_tangent(value, rate, settings.tangency_tolerance) {
        return Err(RtbpError::Tangency {
            section: section.name(),
            value,
            rate,
        });
    }

    if !report.status.is_converged() {
        match settings.policy {
            ConvergencePolicy::BestEffort => warn!(
                section = section.name(),
                residual = report.residual,
                iterations = report.iterations,
                "crossing refinement did not converge; keeping best estimate"
            ),
            ConvergencePolicy::Reject => {
                return Err(RtbpError::NotConverged {
                    estimate: sign * report.root,
                    residual: report.residual,
                    iterations: report.iterations,
                })
            }
        }
    }

    Ok(Crossing {
        state: hit,
        time: sign * report.root,
        status: report.status,
    })
}
