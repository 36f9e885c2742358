//! Eulerian finite strain, the coordinate the energy polynomial is fitted in.

use crate::error::{EosError, EosResult};
use crate::traits::Scalar;

/// Eulerian strain `(v_ref / volume)^(2/3) - 1`.
///
/// Zero at `v_ref`, positive under compression. Unchecked: a negative volume
/// gives NaN and zero gives infinity, so callers validate first (see [`strain`]).
pub fn eulerian_strain<T: Scalar>(volume: T, v_ref: T) -> T {
    (v_ref / volume).powf(T::real(2.0 / 3.0)) - T::one()
}

/// Returns `volume` unchanged if it is a finite positive number.
pub fn check_volume(volume: f64) -> EosResult<f64> {
    if volume.is_finite() && volume > 0.0 {
        Ok(volume)
    } else {
        Err(EosError::domain("volume must be finite and positive", volume))
    }
}

/// Checked Eulerian strain of a single volume.
pub fn strain(volume: f64, v_ref: f64) -> EosResult<f64> {
    check_volume(v_ref)?;
    check_volume(volume)?;
    Ok(eulerian_strain(volume, v_ref))
}

/// Checked Eulerian strain of every volume in `volumes`.
pub fn strains(volumes: &[f64], v_ref: f64) -> EosResult<Vec<f64>> {
    volumes.iter().map(|&v| strain(v, v_ref)).collect()
}
