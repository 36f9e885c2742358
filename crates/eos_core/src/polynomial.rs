use crate::error::{EosError, EosResult};
use crate::traits::Scalar;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Least-squares settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FitSettings {
    /// Relative cutoff for small singular values. `None` uses `n * f64::EPSILON`.
    pub rcond: Option<f64>,
}

/// Polynomial with coefficients stored highest degree first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation, generic so that dual numbers flow through it.
    pub fn eval<T: Scalar>(&self, x: T) -> T {
        self.coefficients
            .iter()
            .fold(T::zero(), |acc, &c| acc * x + T::real(c))
    }

    pub fn derivative(&self) -> Polynomial {
        let degree = self.degree();
        let coefficients = self
            .coefficients
            .iter()
            .take(degree)
            .enumerate()
            .map(|(i, &c)| c * (degree - i) as f64)
            .collect();
        Polynomial::new(coefficients)
    }

    /// Root-mean-square residual against `(x, y)`.
    pub fn rms_residual(&self, x: &[f64], y: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let sum: f64 = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| {
                let r = self.eval(xi) - yi;
                r * r
            })
            .sum();
        (sum / x.len() as f64).sqrt()
    }

    /// Least-squares fit of a degree-`degree` polynomial to `(x, y)`.
    ///
    /// Solves the column-scaled Vandermonde system by SVD. Singular values
    /// below `rcond * s_max` count as zero; if that leaves fewer than
    /// `degree + 1` independent columns the fit is rejected.
    pub fn fit(x: &[f64], y: &[f64], degree: usize, settings: &FitSettings) -> EosResult<Self> {
        if x.len() != y.len() {
            return Err(EosError::fitting(format!(
                "sample length mismatch: {} abscissae, {} ordinates",
                x.len(),
                y.len()
            )));
        }
        let n = x.len();
        let cols = degree + 1;
        if n < cols {
            return Err(EosError::fitting(format!(
                "degree {} fit needs at least {} samples, got {}",
                degree, cols, n
            )));
        }
        if let Some(bad) = x.iter().chain(y).find(|v| !v.is_finite()) {
            return Err(EosError::fitting(format!("non-finite sample value {}", bad)));
        }
        let mut distinct = x.to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        if distinct.len() < cols {
            return Err(EosError::fitting(format!(
                "degenerate samples: {} distinct abscissae for degree {}",
                distinct.len(),
                degree
            )));
        }

        let mut lhs = DMatrix::from_fn(n, cols, |i, j| x[i].powi((degree - j) as i32));
        let mut scales = vec![1.0; cols];
        for j in 0..cols {
            let norm = lhs.column(j).norm();
            if norm > 0.0 {
                scales[j] = norm;
                for i in 0..n {
                    lhs[(i, j)] /= norm;
                }
            }
        }
        let rhs = DVector::from_column_slice(y);

        let rcond = settings.rcond.unwrap_or(n as f64 * f64::EPSILON);
        let svd = lhs.svd(true, true);
        let s_max = svd.singular_values.iter().cloned().fold(0.0, f64::max);
        let cutoff = rcond * s_max;
        let rank = svd.rank(cutoff);
        if rank < cols {
            return Err(EosError::fitting(format!(
                "degenerate samples: rank {} < {} for degree {}",
                rank, cols, degree
            )));
        }

        let solution = svd
            .solve(&rhs, cutoff)
            .map_err(|msg| EosError::fitting(format!("least-squares solve failed: {}", msg)))?;
        let coefficients: Vec<f64> = solution
            .iter()
            .zip(&scales)
            .map(|(c, s)| c / s)
            .collect();

        debug!(degree, samples = n, rank, "fitted polynomial");
        Ok(Polynomial::new(coefficients))
    }
}
