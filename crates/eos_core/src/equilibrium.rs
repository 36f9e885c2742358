use crate::autodiff::{derivative, value_and_derivative};
use crate::error::{ensure_finite, EosError, EosResult};
use crate::solvers::{newton_root, NewtonSettings, RootResult};
use crate::traits::EnergyCurve;
use serde::{Deserialize, Serialize};

/// Equilibrium properties of an energy curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumProperties {
    /// Volume at which the pressure vanishes.
    pub v0: f64,
    /// Energy at `v0`.
    pub e0: f64,
    /// Bulk modulus at `v0`.
    pub k0: f64,
    /// Pressure derivative of the bulk modulus at `v0`.
    pub kp0: f64,
    pub iterations: usize,
    /// Pressure left at `v0`.
    pub residual: f64,
}

impl EquilibriumProperties {
    pub fn evaluate<E: EnergyCurve>(curve: &E, root: &RootResult) -> EosResult<Self> {
        let v0 = root.root;
        Ok(Self {
            v0,
            e0: ensure_finite(curve.energy_at(v0), "energy", v0)?,
            k0: ensure_finite(curve.bulk_modulus_at(v0), "bulk modulus", v0)?,
            kp0: bulk_modulus_pressure_derivative(curve, v0)?,
            iterations: root.iterations,
            residual: root.residual,
        })
    }
}

/// Solves P(v) = 0 starting from `initial_volume`.
///
/// The pressure slope comes from differentiating the pressure itself, so each
/// Newton step costs one evaluation on `Dual<Dual<f64>>`. Non-positive trial
/// volumes are reported to the solver as non-finite and get backtracked.
pub fn solve_equilibrium_volume<E: EnergyCurve>(
    curve: &E,
    initial_volume: f64,
    settings: &NewtonSettings,
) -> EosResult<RootResult> {
    newton_root(
        |v| {
            if v <= 0.0 {
                return (f64::NAN, f64::NAN);
            }
            value_and_derivative(|x| curve.pressure_at(x), v)
        },
        initial_volume,
        settings,
    )
}

/// dB/dP at `volume`, taken as the ratio (dB/dV) / (dP/dV).
///
/// Fails where the pressure slope vanishes, i.e. at an inflection of E(V).
pub fn bulk_modulus_pressure_derivative<E: EnergyCurve>(curve: &E, volume: f64) -> EosResult<f64> {
    let dk_dv = derivative(|v| curve.bulk_modulus_at(v), volume);
    let dp_dv = derivative(|v| curve.pressure_at(v), volume);
    if dp_dv == 0.0 {
        return Err(EosError::NonFinite {
            what: "bulk modulus pressure derivative (dP/dV = 0)".to_string(),
            volume,
        });
    }
    ensure_finite(dk_dv / dp_dv, "bulk modulus pressure derivative", volume)
}
