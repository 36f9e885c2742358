use crate::equilibrium::{solve_equilibrium_volume, EquilibriumProperties};
use crate::error::{ensure_finite, EosError, EosResult};
use crate::polynomial::{FitSettings, Polynomial};
use crate::solvers::{NewtonSettings, RootResult};
use crate::strain::{check_volume, eulerian_strain, strain, strains};
use crate::traits::{EnergyCurve, Scalar};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EosSettings {
    /// Degree of the energy polynomial in Eulerian strain.
    pub order: usize,
    pub fit: FitSettings,
    pub newton: NewtonSettings,
}

impl Default for EosSettings {
    fn default() -> Self {
        Self {
            order: 3,
            fit: FitSettings::default(),
            newton: NewtonSettings::default(),
        }
    }
}

/// Finite-strain energy-volume equation of state.
///
/// The energy is a polynomial in the Eulerian strain measured from the first
/// sample's volume. Pressure and bulk modulus are exact derivatives of that
/// polynomial, taken with dual numbers.
///
/// The equilibrium volume is resolved at most once, on the first call to
/// [`resolve_equilibrium`](Self::resolve_equilibrium) or any of the `v0`,
/// `k0`, `kp0`, `e0` queries, and is cached from then on. A failed solve is
/// not cached.
#[derive(Debug, Clone)]
pub struct FiniteStrainEos {
    v_ref: f64,
    polynomial: Polynomial,
    settings: EosSettings,
    fit_rms: f64,
    equilibrium: OnceCell<RootResult>,
}

impl FiniteStrainEos {
    /// Fits a third-order model.
    pub fn new(volumes: &[f64], energies: &[f64]) -> EosResult<Self> {
        Self::with_settings(volumes, energies, EosSettings::default())
    }

    pub fn with_order(volumes: &[f64], energies: &[f64], order: usize) -> EosResult<Self> {
        Self::with_settings(
            volumes,
            energies,
            EosSettings {
                order,
                ..EosSettings::default()
            },
        )
    }

    /// Fits from `(volume, energy)` pairs.
    pub fn from_samples(samples: &[(f64, f64)], order: usize) -> EosResult<Self> {
        let (volumes, energies): (Vec<f64>, Vec<f64>) = samples.iter().copied().unzip();
        Self::with_order(&volumes, &energies, order)
    }

    pub fn with_settings(
        volumes: &[f64],
        energies: &[f64],
        settings: EosSettings,
    ) -> EosResult<Self> {
        if settings.order == 0 {
            return Err(EosError::fitting("order must be at least 1"));
        }
        settings.newton.validate()?;
        let Some(&v_ref) = volumes.first() else {
            return Err(EosError::fitting("no samples given"));
        };
        let x = strains(volumes, v_ref)?;
        let polynomial = Polynomial::fit(&x, energies, settings.order, &settings.fit)?;
        let fit_rms = polynomial.rms_residual(&x, energies);
        debug!(
            order = settings.order,
            samples = volumes.len(),
            v_ref,
            fit_rms,
            "fitted finite-strain equation of state"
        );

        Ok(Self {
            v_ref,
            polynomial,
            settings,
            fit_rms,
            equilibrium: OnceCell::new(),
        })
    }

    pub fn v_ref(&self) -> f64 {
        self.v_ref
    }

    pub fn order(&self) -> usize {
        self.settings.order
    }

    pub fn polynomial(&self) -> &Polynomial {
        &self.polynomial
    }

    /// Fitted coefficients, highest power of strain first.
    pub fn coefficients(&self) -> &[f64] {
        self.polynomial.coefficients()
    }

    pub fn settings(&self) -> &EosSettings {
        &self.settings
    }

    /// Root-mean-square energy residual of the fit over the input samples.
    pub fn fit_rms(&self) -> f64 {
        self.fit_rms
    }

    pub fn strain(&self, volume: f64) -> EosResult<f64> {
        strain(volume, self.v_ref)
    }

    /// Energy at `volume`. Extreme volumes whose strain overflows fail with
    /// [`EosError::NonFinite`] rather than returning inf or NaN.
    pub fn free_energy(&self, volume: f64) -> EosResult<f64> {
        let v = check_volume(volume)?;
        ensure_finite(self.energy_at(v), "energy", v)
    }

    pub fn pressure(&self, volume: f64) -> EosResult<f64> {
        let v = check_volume(volume)?;
        ensure_finite(self.pressure_at(v), "pressure", v)
    }

    pub fn bulk_modulus(&self, volume: f64) -> EosResult<f64> {
        let v = check_volume(volume)?;
        ensure_finite(self.bulk_modulus_at(v), "bulk modulus", v)
    }

    pub fn free_energies(&self, volumes: &[f64]) -> EosResult<Vec<f64>> {
        volumes.iter().map(|&v| self.free_energy(v)).collect()
    }

    pub fn pressures(&self, volumes: &[f64]) -> EosResult<Vec<f64>> {
        volumes.iter().map(|&v| self.pressure(v)).collect()
    }

    pub fn bulk_moduli(&self, volumes: &[f64]) -> EosResult<Vec<f64>> {
        volumes.iter().map(|&v| self.bulk_modulus(v)).collect()
    }

    /// Whether the equilibrium volume has been resolved and cached.
    pub fn is_resolved(&self) -> bool {
        self.equilibrium.get().is_some()
    }

    /// Solves P(v) = 0 from `v_ref` on first use and returns the cached `v0`.
    pub fn resolve_equilibrium(&self) -> EosResult<f64> {
        self.equilibrium_root().map(|root| root.root)
    }

    fn equilibrium_root(&self) -> EosResult<&RootResult> {
        if let Some(root) = self.equilibrium.get() {
            return Ok(root);
        }
        let root = solve_equilibrium_volume(self, self.v_ref, &self.settings.newton)?;
        debug!(
            v0 = root.root,
            iterations = root.iterations,
            residual = root.residual,
            "resolved equilibrium volume"
        );
        Ok(self.equilibrium.get_or_init(|| root))
    }

    pub fn v0(&self) -> EosResult<f64> {
        self.resolve_equilibrium()
    }

    pub fn e0(&self) -> EosResult<f64> {
        self.free_energy(self.v0()?)
    }

    pub fn k0(&self) -> EosResult<f64> {
        self.bulk_modulus(self.v0()?)
    }

    pub fn kp0(&self) -> EosResult<f64> {
        self.equilibrium().map(|props| props.kp0)
    }

    /// All equilibrium properties at once.
    pub fn equilibrium(&self) -> EosResult<EquilibriumProperties> {
        EquilibriumProperties::evaluate(self, self.equilibrium_root()?)
    }
}

impl EnergyCurve for FiniteStrainEos {
    fn energy_at<T: Scalar>(&self, volume: T) -> T {
        self.polynomial.eval(eulerian_strain(volume, T::real(self.v_ref)))
    }
}

#[cfg(test)]
mod tests {
    use super::{EosSettings, FiniteStrainEos};
    use crate::error::EosError;
    use proptest::prelude::*;

    /// Third-order Birch-Murnaghan energy, exactly cubic in Eulerian strain.
    fn birch_murnaghan(volume: f64) -> f64 {
        let (e0, v0, b0, bp) = (-10.0, 40.0, 0.5, 4.5);
        let eta = (v0 / volume).powf(2.0 / 3.0);
        let f = eta - 1.0;
        e0 + 9.0 * v0 * b0 / 16.0 * (f.powi(3) * bp + f.powi(2) * (6.0 - 4.0 * eta))
    }

    fn birch_murnaghan_samples() -> (Vec<f64>, Vec<f64>) {
        let volumes = vec![37.0, 35.0, 36.0, 38.0, 39.0, 40.0, 41.0, 42.0, 43.0, 44.0];
        let energies = volumes.iter().map(|&v| birch_murnaghan(v)).collect();
        (volumes, energies)
    }

    fn quadratic_samples() -> (Vec<f64>, Vec<f64>) {
        let volumes = vec![8.0, 9.0, 10.0, 11.0, 12.0];
        let energies = volumes
            .iter()
            .map(|&v| 2.0 * (v - 10.0) * (v - 10.0) - 5.0)
            .collect();
        (volumes, energies)
    }

    fn assert_close(actual: f64, expected: f64, rel: f64) {
        assert!(
            (actual - expected).abs() <= rel * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn reference_volume_is_first_sample() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        assert_eq!(eos.v_ref(), 37.0);
        assert_eq!(eos.order(), 3);
        assert_eq!(eos.coefficients().len(), 4);
        assert_eq!(eos.strain(37.0).expect("valid"), 0.0);
    }

    #[test]
    fn birch_murnaghan_parameters_are_recovered() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        assert!(eos.fit_rms() < 1e-10, "rms = {}", eos.fit_rms());

        let props = eos.equilibrium().expect("equilibrium");
        assert_close(props.v0, 40.0, 1e-8);
        assert_close(props.e0, -10.0, 1e-10);
        assert_close(props.k0, 0.5, 1e-7);
        assert_close(props.kp0, 4.5, 1e-5);
        assert!(props.residual.abs() < 1e-10);
    }

    #[test]
    fn higher_order_reproduces_cubic_data() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::with_order(&volumes, &energies, 4).expect("fit");
        assert_close(eos.v0().expect("v0"), 40.0, 1e-7);
        assert_close(eos.k0().expect("k0"), 0.5, 1e-6);
        assert_close(eos.kp0().expect("kp0"), 4.5, 1e-4);
    }

    #[test]
    fn quadratic_in_volume_with_order_two() {
        // 2 (v - 10)^2 - 5 is not a polynomial in strain, so an order-2 fit
        // puts the minimum a little below 10.
        let (volumes, energies) = quadratic_samples();
        let eos = FiniteStrainEos::with_order(&volumes, &energies, 2).expect("fit");
        let v0 = eos.v0().expect("v0");
        let k0 = eos.k0().expect("k0");
        assert!((v0 - 9.7144).abs() < 1e-3, "v0 = {v0}");
        assert!((k0 - 39.557).abs() < 1e-2, "k0 = {k0}");
        assert!((k0 - 40.0).abs() / 40.0 < 0.02);
        assert!(eos.kp0().expect("kp0").is_finite());
    }

    #[test]
    fn raising_order_does_not_move_v0_beyond_fit_tolerance() {
        let (volumes, energies) = quadratic_samples();
        let v0s: Vec<f64> = (2..=4)
            .map(|order| {
                FiniteStrainEos::with_order(&volumes, &energies, order)
                    .and_then(|eos| eos.v0())
                    .expect("v0")
            })
            .collect();
        for v0 in &v0s {
            assert!((v0 - 10.0).abs() < 0.3, "v0 = {v0}");
        }
        assert!((v0s[1] - v0s[2]).abs() < 0.05, "orders 3 and 4: {v0s:?}");
        let k0 = FiniteStrainEos::with_order(&volumes, &energies, 4)
            .and_then(|eos| eos.k0())
            .expect("k0");
        assert!((k0 - 40.0).abs() < 0.5, "k0 = {k0}");
    }

    #[test]
    fn pressure_is_small_when_minimum_sits_at_reference() {
        let volumes = [40.0, 37.0, 38.0, 39.0, 41.0, 42.0, 43.0];
        let energies: Vec<f64> = volumes.iter().map(|&v| birch_murnaghan(v)).collect();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        assert!(eos.pressure(40.0).expect("pressure").abs() < 1e-9);
        assert!(eos.pressure(38.0).expect("pressure") > 0.0);
        assert!(eos.pressure(42.0).expect("pressure") < 0.0);
    }

    #[test]
    fn bulk_modulus_matches_closed_form() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        let p = eos.polynomial();
        let (dp, ddp) = (p.derivative(), p.derivative().derivative());
        let v_ref = eos.v_ref();
        for v in [36.0, 39.5, 43.0] {
            let x = eos.strain(v).expect("strain");
            let dx = -2.0 / 3.0 * v_ref.powf(2.0 / 3.0) * v.powf(-5.0 / 3.0);
            let ddx = 10.0 / 9.0 * v_ref.powf(2.0 / 3.0) * v.powf(-8.0 / 3.0);
            let pressure = -dp.eval(x) * dx;
            let bulk = v * (ddp.eval(x) * dx * dx + dp.eval(x) * ddx);
            assert_close(eos.pressure(v).expect("p"), pressure, 1e-12);
            assert_close(eos.bulk_modulus(v).expect("b"), bulk, 1e-12);
        }
    }

    #[test]
    fn vector_queries_map_scalar_ones() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        let grid = [35.5, 38.25, 44.0];
        let pressures = eos.pressures(&grid).expect("pressures");
        let moduli = eos.bulk_moduli(&grid).expect("moduli");
        let free = eos.free_energies(&grid).expect("energies");
        for (i, &v) in grid.iter().enumerate() {
            assert_eq!(pressures[i], eos.pressure(v).expect("p"));
            assert_eq!(moduli[i], eos.bulk_modulus(v).expect("b"));
            assert_eq!(free[i], eos.free_energy(v).expect("e"));
        }
        assert!(eos.pressures(&[]).expect("empty").is_empty());
    }

    #[test]
    fn non_positive_volumes_are_domain_errors() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        let err = eos.pressure(-1.0).expect_err("negative volume");
        assert!(matches!(err, EosError::Domain { .. }), "unexpected error: {err}");
        assert!(matches!(eos.free_energy(0.0), Err(EosError::Domain { .. })));
        assert!(matches!(eos.bulk_modulus(f64::NAN), Err(EosError::Domain { .. })));
        assert!(matches!(
            eos.pressures(&[40.0, -2.0]),
            Err(EosError::Domain { value, .. }) if value == -2.0
        ));
    }

    #[test]
    fn extreme_volumes_never_return_nan() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        for v in [1e-310, 1e-300, 1e300] {
            for result in [eos.free_energy(v), eos.pressure(v), eos.bulk_modulus(v)] {
                match result {
                    Ok(value) => assert!(value.is_finite(), "v = {v}: Ok({value})"),
                    Err(EosError::NonFinite { volume, .. }) => assert_eq!(volume, v),
                    Err(err) => panic!("unexpected error at v = {v}: {err}"),
                }
            }
        }
        // Strain overflows to inf below ~1e-290 and the cubic blows up.
        assert!(matches!(eos.free_energy(1e-300), Err(EosError::NonFinite { .. })));
        assert!(matches!(eos.pressure(1e-300), Err(EosError::NonFinite { .. })));
        assert!(matches!(eos.bulk_modulus(1e-310), Err(EosError::NonFinite { .. })));
        assert!(matches!(eos.bulk_modulus(1e300), Err(EosError::NonFinite { .. })));
        assert!(matches!(
            eos.pressures(&[40.0, 1e-300]),
            Err(EosError::NonFinite { .. })
        ));
    }

    #[test]
    fn too_few_samples_is_a_fitting_error() {
        let err = FiniteStrainEos::with_order(&[10.0, 11.0], &[-1.0, -0.9], 3)
            .expect_err("two samples for a cubic");
        assert!(matches!(err, EosError::Fitting { .. }), "unexpected error: {err}");
    }

    #[test]
    fn invalid_construction_inputs() {
        assert!(matches!(
            FiniteStrainEos::new(&[], &[]),
            Err(EosError::Fitting { .. })
        ));
        assert!(matches!(
            FiniteStrainEos::with_order(&[1.0, 2.0, 3.0], &[0.0, 1.0, 2.0], 0),
            Err(EosError::Fitting { .. })
        ));
        assert!(matches!(
            FiniteStrainEos::with_order(&[10.0, 10.0, 10.0], &[1.0, 2.0, 3.0], 1),
            Err(EosError::Fitting { .. })
        ));
        assert!(matches!(
            FiniteStrainEos::with_order(&[10.0, -9.0, 11.0], &[1.0, 2.0, 3.0], 1),
            Err(EosError::Domain { .. })
        ));
    }

    #[test]
    fn from_samples_matches_parallel_slices() {
        let (volumes, energies) = birch_murnaghan_samples();
        let pairs: Vec<(f64, f64)> = volumes
            .iter()
            .copied()
            .zip(energies.iter().copied())
            .collect();
        let a = FiniteStrainEos::from_samples(&pairs, 3).expect("fit");
        let b = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        assert_eq!(a.coefficients(), b.coefficients());
    }

    #[test]
    fn equilibrium_is_resolved_once() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
        assert!(!eos.is_resolved());
        let _ = eos.pressure(40.0).expect("pressure");
        assert!(!eos.is_resolved());

        let k0 = eos.k0().expect("k0");
        assert!(eos.is_resolved());
        let v0 = eos.v0().expect("v0");
        assert_eq!(eos.resolve_equilibrium().expect("cached"), v0);
        assert_eq!(eos.k0().expect("k0"), k0);
        assert_eq!(eos.bulk_modulus(v0).expect("b"), k0);
    }

    #[test]
    fn linear_fit_has_no_equilibrium() {
        let (volumes, energies) = birch_murnaghan_samples();
        let eos = FiniteStrainEos::with_order(&volumes, &energies, 1).expect("fit");
        let err = eos.v0().expect_err("pressure is monotonic");
        assert!(matches!(err, EosError::Convergence { .. }), "unexpected error: {err}");
        assert!(!eos.is_resolved());
        assert!(matches!(eos.kp0(), Err(EosError::Convergence { .. })));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: EosSettings =
            serde_json::from_str(r#"{"order": 4, "newton": {"max_steps": 10}}"#).expect("json");
        assert_eq!(settings.order, 4);
        assert_eq!(settings.newton.max_steps, 10);
        assert_eq!(settings.newton.tolerance, EosSettings::default().newton.tolerance);
        assert_eq!(settings.fit.rcond, None);
    }

    #[test]
    fn invalid_newton_settings_are_rejected_at_construction() {
        let (volumes, energies) = birch_murnaghan_samples();
        let mut settings = EosSettings::default();
        settings.newton.max_steps = 0;
        let err = FiniteStrainEos::with_settings(&volumes, &energies, settings)
            .expect_err("max_steps = 0");
        assert!(matches!(err, EosError::InvalidSettings { .. }));
    }

    proptest! {
        #[test]
        fn bulk_modulus_agrees_with_finite_difference(v in 35.0f64..44.0) {
            let (volumes, energies) = birch_murnaghan_samples();
            let eos = FiniteStrainEos::new(&volumes, &energies).expect("fit");
            let h = 1e-4 * v;
            let p_plus = eos.pressure(v + h).expect("p+");
            let p_minus = eos.pressure(v - h).expect("p-");
            let fd = -v * (p_plus - p_minus) / (2.0 * h);
            let exact = eos.bulk_modulus(v).expect("b");
            prop_assert!(((exact - fd) / exact).abs() < 1e-4, "exact {} fd {}", exact, fd);
        }
    }
}
