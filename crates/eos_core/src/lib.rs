pub mod autodiff;
pub mod equilibrium;
pub mod error;
pub mod model;
pub mod polynomial;
pub mod solvers;
pub mod strain;
/// The `eos_core` crate fits finite-strain equations of state to energy-volume
/// data and derives equilibrium properties from the fit.
/// All derivatives are exact, computed with (nested) dual numbers rather than
/// finite differences.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `EnergyCurve` (E(V) with derived P and B).
/// - **Autodiff**: generic `Dual` numbers; nesting them gives higher derivatives.
/// - **Polynomial**: SVD least-squares fit and Horner evaluation.
/// - **Solvers**: damped Newton root finding with backtracking.
/// - **Model**: `FiniteStrainEos`, the fitted model with a cached equilibrium.
pub mod traits;

pub use equilibrium::EquilibriumProperties;
pub use error::{EosError, EosResult};
pub use model::{EosSettings, FiniteStrainEos};
