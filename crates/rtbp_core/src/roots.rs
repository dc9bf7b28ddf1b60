//! Bracketed scalar root finding.
//!
//! Brent's method (inverse quadratic interpolation safeguarded by bisection)
//! over a closure that may fail: every evaluation of a section or homoclinic
//! distance integrates the flow, and integration errors must propagate out
//! of the search untouched.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::RtbpError;

/// Outcome of a bracketed search that did not fail outright.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RootStatus {
    Converged,
    /// The iteration cap was hit first; the estimate is the best one seen.
    NotConverged,
}

impl RootStatus {
    pub fn is_converged(self) -> bool {
        matches!(self, RootStatus::Converged)
    }

    /// `NotConverged` wins when combining the statuses of chained searches.
    pub fn and(self, other: RootStatus) -> RootStatus {
        if self.is_converged() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootReport {
    /// Abscissa with the smallest residual of all evaluations.
    pub root: f64,
    pub residual: f64,
    pub iterations: usize,
    /// Final bracket, ordered.
    pub bracket: (f64, f64),
    pub status: RootStatus,
}

impl RootReport {
    pub fn width(&self) -> f64 {
        self.bracket.1 - self.bracket.0
    }
}

/// True if `fa` and `fb` straddle zero.
pub fn straddles(fa: f64, fb: f64) -> bool {
    fa.is_finite() && fb.is_finite() && (fa == 0.0 || fb == 0.0 || (fa < 0.0) != (fb < 0.0))
}

#[derive(Debug, Clone, Copy)]
pub struct Brent {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for Brent {
    fn default() -> Self {
        Self {
            tolerance: 1e-15,
            max_iterations: 100,
        }
    }
}

impl Brent {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Finds a root of `f` in `[a, b]`, evaluating both endpoints first.
    pub fn solve<F, E>(&self, mut f: F, a: f64, b: f64) -> Result<RootReport, E>
    where
        F: FnMut(f64) -> Result<f64, E>,
        E: From<RtbpError>,
    {
        let fa = f(a)?;
        let fb = f(b)?;
        self.solve_with_values(f, a, fa, b, fb)
    }

    /// Like [`Brent::solve`] with the endpoint values already known.
    ///
    /// Endpoints given in decreasing order are swapped. A pair that does not
    /// straddle zero is an `InvalidBracket` error.
    pub fn solve_with_values<F, E>(
        &self,
        mut f: F,
        a: f64,
        fa: f64,
        b: f64,
        fb: f64,
    ) -> Result<RootReport, E>
    where
        F: FnMut(f64) -> Result<f64, E>,
        E: From<RtbpError>,
    {
        let (mut a, mut fa, mut b, mut fb) = if a <= b {
            (a, fa, b, fb)
        } else {
            (b, fb, a, fa)
        };
        if !straddles(fa, fb) {
            return Err(RtbpError::InvalidBracket { a, b, fa, fb }.into());
        }

        let mut best = if fa.abs() <= fb.abs() { (a, fa) } else { (b, fb) };
        if best.1 == 0.0 {
            return Ok(RootReport {
                root: best.0,
                residual: 0.0,
                iterations: 0,
                bracket: (a, b),
                status: RootStatus::Converged,
            });
        }

        let mut c = b;
        let mut fc = fb;
        let mut d = b - a;
        let mut e = d;

        for iteration in 1..=self.max_iterations {
            if (fb > 0.0) == (fc > 0.0) {
                c = a;
                fc = fa;
                d = b - a;
                e = d;
            }
            if fc.abs() < fb.abs() {
                a = b;
                b = c;
                c = a;
                fa = fb;
                fb = fc;
                fc = fa;
            }

            let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * self.tolerance;
            let xm = 0.5 * (c - b);
            if xm.abs() <= tol1 || fb == 0.0 {
                return Ok(RootReport {
                    root: best.0,
                    residual: best.1,
                    iterations: iteration - 1,
                    bracket: (b.min(c), b.max(c)),
                    status: RootStatus::Converged,
                });
            }

            if e.abs() >= tol1 && fa.abs() > fb.abs() {
                let s = fb / fa;
                let (mut p, mut q);
                if a == c {
                    p = 2.0 * xm * s;
                    q = 1.0 - s;
                } else {
                    let qa = fa / fc;
                    let r = fb / fc;
                    p = s * (2.0 * xm * qa * (qa - r) - (b - a) * (r - 1.0));
                    q = (qa - 1.0) * (r - 1.0) * (s - 1.0);
                }
                if p > 0.0 {
                    q = -q;
                }
                p = p.abs();
                let min1 = 3.0 * xm * q - (tol1 * q).abs();
                let min2 = (e * q).abs();
                if 2.0 * p < min1.min(min2) {
                    e = d;
                    d = p / q;
                } else {
                    d = xm;
                    e = d;
                }
            } else {
                d = xm;
                e = d;
            }

            a = b;
            fa = fb;
            b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
            fb = f(b)?;
            if !fb.is_finite() {
                return Err(RtbpError::InvalidInput(format!(
                    "root function is not finite at {b}"
                ))
                .into());
            }
            if fb.abs() < best.1.abs() {
                best = (b, fb);
            }
            trace!(iteration, x = b, residual = fb, "brent step");
        }

        Ok(RootReport {
            root: best.0,
            residual: best.1,
            iterations: self.max_iterations,
            bracket: (b.min(c), b.max(c)),
            status: RootStatus::NotConverged,
        })
    }
}
