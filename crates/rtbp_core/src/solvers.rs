use crate::config::IntegratorSettings;
use crate::error::{RtbpError, RtbpResult};
use crate::traits::{DynamicalSystem, Flow, Scalar};

/// Tsitouras 5(4) stage buffers.
pub struct Tsit5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    next: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            next: vec![z; dim],
        }
    }

    /// Attempts one step of size `dt` from `(t, state)`.
    ///
    /// The 5th order solution is left in an internal buffer and the embedded
    /// error estimate `dt * sum(btilde_i k_i)` is written to `err`. Call
    /// [`Tsit5::accept`] to copy the solution into the state.
    pub fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        err: &mut [T],
    ) {
        let c = |v: f64| T::from_f64(v).unwrap();

        let c2 = c(0.161);
        let c3 = c(0.327);
        let c4 = c(0.9);
        let c5 = c(0.9800255409045097);

        let a21 = c(0.161);

        let a31 = c(-0.008480655492356989);
        let a32 = c(0.335480655492357);

        let a41 = c(2.898);
        let a42 = c(-6.359447987781783);
        let a43 = c(4.361447987781783);

        let a51 = c(5.325864858437957);
        let a52 = c(-11.748883564062828);
        let a53 = c(7.495539342889693);
        let a54 = c(-0.09249506636030195);

        let a61 = c(5.86145544294642);
        let a62 = c(-12.92096931784711);
        let a63 = c(8.159367898576159);
        let a64 = c(-0.071584973281401);
        let a65 = c(-0.02826857949054663);

        // 5th order weights (FSAL: row 7 of the tableau)
        let b1 = c(0.09646076681806523);
        let b2 = c(0.01);
        let b3 = c(0.4798896504144996);
        let b4 = c(1.379008574103742);
        let b5 = c(-3.290069515436099);
        let b6 = c(2.324710524099774);

        // b - b_hat
        let e1 = c(-0.00178001105222577714);
        let e2 = c(-0.0008164344596567469);
        let e3 = c(0.007880878010261995);
        let e4 = c(-0.1447110071732629);
        let e5 = c(0.5823571654525552);
        let e6 = c(-0.45808210592918697);
        let e7 = c(0.015151515151515152);

        let n = state.len();

        system.apply(t, state, &mut self.k1);

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t + c2 * dt, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t + c3 * dt, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t + c4 * dt, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t + c5 * dt, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t + dt, &self.tmp, &mut self.k6);

        for i in 0..n {
            self.next[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b2 * self.k2[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.apply(t + dt, &self.next, &mut self.k7);

        for i in 0..n {
            err[i] = dt
                * (e1 * self.k1[i]
                    + e2 * self.k2[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
        }
    }

    /// The solution computed by the last trial step.
    pub fn proposal(&self) -> &[T] {
        &self.next
    }

    pub fn accept(&self, state: &mut [T]) {
        state.copy_from_slice(&self.next);
    }
}

/// Adaptive Tsit5 integration exposed as a [`Flow`].
///
/// Lands exactly on the requested time. Every call starts the step-size
/// controller from `initial_step`, so the result depends only on the state
/// and the requested time, never on earlier calls.
pub struct AdaptiveFlow {
    settings: IntegratorSettings,
    stepper: Tsit5<f64>,
    err: Vec<f64>,
}

impl AdaptiveFlow {
    pub fn new(dim: usize, settings: IntegratorSettings) -> Self {
        Self {
            settings,
            stepper: Tsit5::new(dim),
            err: vec![0.0; dim],
        }
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    fn error_norm(&self, state: &[f64]) -> f64 {
        let proposal = self.stepper.proposal();
        let mut sum = 0.0;
        for i in 0..state.len() {
            let scale = self.settings.abs_tol
                + self.settings.rel_tol * state[i].abs().max(proposal[i].abs());
            let ratio = self.err[i] / scale;
            sum += ratio * ratio;
        }
        (sum / state.len() as f64).sqrt()
    }
}

impl Flow for AdaptiveFlow {
    fn advance(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        state: &mut [f64],
        time: f64,
    ) -> RtbpResult<()> {
        if !time.is_finite() {
            return Err(RtbpError::InvalidInput(format!(
                "cannot advance the flow by {time}"
            )));
        }
        if time == 0.0 {
            return Ok(());
        }
        let direction = time.signum();
        let span = time.abs();
        let mut elapsed = 0.0;
        let mut h = self
            .settings
            .initial_step
            .abs()
            .clamp(self.settings.min_step, self.settings.max_step);
        let mut steps = 0usize;

        while elapsed < span {
            if steps >= self.settings.max_steps {
                return Err(RtbpError::Integration {
                    time: direction * elapsed,
                    message: format!("exceeded {} internal steps", self.settings.max_steps),
                });
            }
            steps += 1;

            let remaining = span - elapsed;
            let last = h >= remaining;
            let trial = if last { remaining } else { h };
            self.stepper.trial_step(
                system,
                direction * elapsed,
                state,
                direction * trial,
                &mut self.err,
            );
            let norm = self.error_norm(state);
            if !norm.is_finite() || self.stepper.proposal().iter().any(|v| !v.is_finite()) {
                h = trial * 0.25;
                if h < self.settings.min_step {
                    return Err(RtbpError::Integration {
                        time: direction * elapsed,
                        message: "state became non-finite".to_string(),
                    });
                }
                continue;
            }

            let factor = if norm == 0.0 {
                5.0
            } else {
                (0.9 * norm.powf(-0.2)).clamp(0.2, 5.0)
            };

            if norm <= 1.0 {
                self.stepper.accept(state);
                elapsed = if last { span } else { elapsed + trial };
                // A clipped final step says nothing about the controller's choice.
                if !last || trial >= h {
                    h = (trial * factor).min(self.settings.max_step);
                }
            } else {
                h = trial * factor.min(0.9);
                if h < self.settings.min_step {
                    return Err(RtbpError::Integration {
                        time: direction * elapsed,
                        message: format!(
                            "step size collapsed below {:e} (error norm {norm:e})",
                            self.settings.min_step
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
