use crate::error::{EosError, EosResult};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    /// Fraction of the Newton step tried first.
    pub damping: f64,
    /// Converged once the Newton step is below `tolerance * |x|`.
    pub tolerance: f64,
    /// Step halvings allowed per iteration before giving up.
    pub max_backtracks: usize,
    pub backtrack_factor: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            damping: 1.0,
            tolerance: 1.5e-8,
            max_backtracks: 30,
            backtrack_factor: 0.5,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> EosResult<()> {
        if self.max_steps == 0 {
            return Err(EosError::invalid_settings("max_steps must be greater than zero"));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(EosError::invalid_settings("damping must lie in (0, 1]"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(EosError::invalid_settings("tolerance must be positive"));
        }
        if !(self.backtrack_factor > 0.0 && self.backtrack_factor < 1.0) {
            return Err(EosError::invalid_settings("backtrack_factor must lie in (0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootResult {
    pub root: f64,
    pub residual: f64,
    pub iterations: usize,
}

/// Damped Newton iteration for a scalar root of `f`.
///
/// `f` returns the residual and its derivative. A step is accepted only when
/// the residual stays finite and its magnitude drops; otherwise the step is
/// shrunk by `backtrack_factor`. Returning a non-finite residual therefore
/// marks a point as outside the admissible region.
pub fn newton_root<F>(f: F, initial_guess: f64, settings: &NewtonSettings) -> EosResult<RootResult>
where
    F: Fn(f64) -> (f64, f64),
{
    settings.validate()?;

    let mut x = initial_guess;
    let (mut r, mut dr) = f(x);
    if !r.is_finite() || !dr.is_finite() {
        return Err(EosError::convergence(format!(
            "residual is not finite at the initial guess {}",
            initial_guess
        )));
    }

    for iteration in 0..settings.max_steps {
        if r == 0.0 {
            return Ok(RootResult {
                root: x,
                residual: r,
                iterations: iteration,
            });
        }
        if dr == 0.0 {
            return Err(EosError::convergence(format!(
                "derivative vanished at x = {} (residual {})",
                x, r
            )));
        }

        let step = -r / dr;
        if step.abs() <= settings.tolerance * x.abs() {
            let polished = x + step;
            let (r_polished, _) = f(polished);
            let (root, residual) = if r_polished.is_finite() && r_polished.abs() <= r.abs() {
                (polished, r_polished)
            } else {
                (x, r)
            };
            return Ok(RootResult {
                root,
                residual,
                iterations: iteration + 1,
            });
        }

        let mut alpha = settings.damping;
        let mut accepted = None;
        for _ in 0..=settings.max_backtracks {
            let candidate = x + alpha * step;
            let (rc, drc) = f(candidate);
            if rc.is_finite() && drc.is_finite() && rc.abs() < r.abs() {
                accepted = Some((candidate, rc, drc));
                break;
            }
            alpha *= settings.backtrack_factor;
        }
        let Some((candidate, rc, drc)) = accepted else {
            return Err(EosError::convergence(format!(
                "line search could not reduce |residual| = {} at x = {}",
                r.abs(),
                x
            )));
        };

        trace!(iteration, x = candidate, residual = rc, alpha, "newton step");
        x = candidate;
        r = rc;
        dr = drc;
    }

    Err(EosError::convergence(format!(
        "Newton solver failed to converge in {} steps (x = {}, residual = {})",
        settings.max_steps, x, r
    )))
}
