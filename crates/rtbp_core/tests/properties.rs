//! Property-based tests for the root finder, the loop filter and the angle
//! conventions.

use std::f64::consts::PI;

use proptest::prelude::*;
use rtbp_core::crossing::{Crossing, CrossingFilter};
use rtbp_core::delaunay::wrap_angle;
use rtbp_core::roots::{Brent, RootStatus};
use rtbp_core::{RtbpError, Section};

fn crossing(x: f64, time: f64) -> Crossing {
    Crossing {
        state: [x, 0.0, 0.0, 0.0],
        time,
        status: RootStatus::Converged,
    }
}

// ── Brent ────────────────────────────────────────────────────────────

proptest! {
    /// Any sign-changing bracket of a monotone cubic converges to its root,
    /// and the reported residual never exceeds the endpoint residuals.
    #[test]
    fn brent_finds_bracketed_root(
        root in -10.0f64..10.0,
        left in 0.01f64..5.0,
        right in 0.01f64..5.0,
    ) {
        let f = |x: f64| (x - root) * (1.0 + x * x);
        let (a, b) = (root - left, root + right);
        let report = Brent::default()
            .solve(|x| Ok::<f64, RtbpError>(f(x)), a, b)
            .unwrap();

        prop_assert_eq!(report.status, RootStatus::Converged);
        prop_assert!((report.root - root).abs() < 1e-12);
        prop_assert!(report.residual.abs() <= f(a).abs().min(f(b).abs()));
        prop_assert!(report.bracket.0 <= report.bracket.1);
        prop_assert!(report.bracket.0 >= a && report.bracket.1 <= b);
    }

    /// Endpoints of equal sign never start a search.
    #[test]
    fn brent_rejects_same_sign_endpoints(a in 0.1f64..3.0, width in 0.1f64..3.0) {
        let result = Brent::default().solve(|x| Ok::<f64, RtbpError>(x * x + 0.5), a, a + width);
        let rejected = matches!(result, Err(RtbpError::InvalidBracket { .. }));
        prop_assert!(rejected);
    }
}

// ── Loop filter ──────────────────────────────────────────────────────

proptest! {
    /// Consecutive accepted crossings always lie on opposite sides of the
    /// origin, whatever the sequence of raw crossings.
    #[test]
    fn accepted_crossings_alternate_sides(
        sides in prop::collection::vec(any::<bool>(), 1..64),
    ) {
        let mut filter = CrossingFilter::NoPending;
        let mut accepted = Vec::new();
        for (i, &left) in sides.iter().enumerate() {
            let x = if left { -1.0 - i as f64 } else { 1.0 + i as f64 };
            let (next, confirmed) = filter.observe(crossing(x, i as f64));
            filter = next;
            accepted.extend(confirmed);
        }

        for pair in accepted.windows(2) {
            prop_assert!((pair[0].state[0] < 0.0) != (pair[1].state[0] < 0.0));
            prop_assert!(pair[0].time < pair[1].time);
        }
        let side_changes = sides.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert_eq!(accepted.len(), side_changes);
    }

    /// A search starting on the section never accepts a crossing on the
    /// side of its start as the first cut.
    #[test]
    fn first_accepted_crossing_leaves_the_start_side(
        start_left in any::<bool>(),
        sides in prop::collection::vec(any::<bool>(), 1..64),
    ) {
        let start_x = if start_left { -0.5 } else { 0.5 };
        let mut filter = CrossingFilter::starting_at(&[start_x, 0.0, 0.0, 1.0], true);
        let mut accepted = Vec::new();
        for (i, &left) in sides.iter().enumerate() {
            let x = if left { -1.0 - i as f64 } else { 1.0 + i as f64 };
            let (next, confirmed) = filter.observe(crossing(x, i as f64));
            filter = next;
            accepted.extend(confirmed);
        }

        let mut previous = start_left;
        for hit in &accepted {
            let left = hit.state[0] < 0.0;
            prop_assert_ne!(left, previous);
            previous = left;
        }
    }
}

// ── Angles and crossing tests ────────────────────────────────────────

proptest! {
    /// Wrapping lands in [-pi, pi] and only removes whole turns.
    #[test]
    fn wrap_angle_is_in_range(angle in -100.0f64..100.0) {
        let wrapped = wrap_angle(angle);
        prop_assert!((-PI..=PI).contains(&wrapped));
        let turns = (angle - wrapped) / (2.0 * PI);
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }

    /// No section reports a crossing between two values of the same sign.
    #[test]
    fn same_sign_is_never_a_crossing(
        before in 1e-6f64..3.0,
        after in 1e-6f64..3.0,
        negative in any::<bool>(),
        backward in any::<bool>(),
    ) {
        let s = if negative { -1.0 } else { 1.0 };
        let time_sign = if backward { -1.0 } else { 1.0 };
        for section in Section::ALL {
            prop_assert!(!section.crosses(s * before, s * after, time_sign));
        }
    }

    /// Delaunay angles jumping across the branch cut are wraps, not crossings.
    #[test]
    fn angle_wrap_is_not_a_crossing(before in 2.5f64..3.1, after in 2.5f64..3.1) {
        for section in Section::ALL.into_iter().filter(|s| s.is_delaunay()) {
            prop_assert!(!section.crosses(before, -after, 1.0));
        }
    }
}
