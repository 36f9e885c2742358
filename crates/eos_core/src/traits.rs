use crate::autodiff::derivative;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars along the energy curve.
/// Implemented by `f64` and by (nested) dual numbers, so the same code path
/// produces values and their derivatives.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Lifts an `f64` literal into this scalar type with a zero derivative part.
    fn real(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// An energy-volume relation E(V) that can be evaluated on any `Scalar`.
///
/// Implementors only provide `energy_at`; pressure and bulk modulus follow by
/// differentiating it with dual numbers. None of these methods validate the
/// volume, callers are expected to pass finite positive values.
pub trait EnergyCurve {
    /// Energy at `volume`.
    fn energy_at<T: Scalar>(&self, volume: T) -> T;

    /// Pressure P = -dE/dV.
    fn pressure_at<T: Scalar>(&self, volume: T) -> T {
        -derivative(|v| self.energy_at(v), volume)
    }

    /// Bulk modulus B = -V dP/dV.
    fn bulk_modulus_at<T: Scalar>(&self, volume: T) -> T {
        -volume * derivative(|v| self.pressure_at(v), volume)
    }
}
