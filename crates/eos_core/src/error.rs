//! Error types for equation-of-state fitting and evaluation.

use thiserror::Error;

/// Errors produced while fitting or querying an equation of state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EosError {
    /// A volume outside the strain transform's domain (non-positive or non-finite).
    #[error("Domain error: {what} (got {value})")]
    Domain { what: String, value: f64 },

    /// Too few, mismatched or degenerate samples for the requested order.
    #[error("Fitting error: {what}")]
    Fitting { what: String },

    /// A valid volume whose result overflows to inf or NaN.
    #[error("Non-finite {what} at volume {volume}")]
    NonFinite { what: String, volume: f64 },

    #[error("Convergence failed: {what}")]
    Convergence { what: String },

    #[error("Invalid settings: {what}")]
    InvalidSettings { what: String },
}

pub type EosResult<T> = Result<T, EosError>;

/// Passes `value` through if finite, otherwise reports what was evaluated where.
pub fn ensure_finite(value: f64, what: &str, volume: f64) -> EosResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EosError::NonFinite {
            what: what.to_string(),
            volume,
        })
    }
}

impl EosError {
    pub(crate) fn domain(what: impl Into<String>, value: f64) -> Self {
        Self::Domain {
            what: what.into(),
            value,
        }
    }

    pub(crate) fn fitting(what: impl Into<String>) -> Self {
        Self::Fitting { what: what.into() }
    }

    pub(crate) fn convergence(what: impl Into<String>) -> Self {
        Self::Convergence { what: what.into() }
    }

    pub(crate) fn invalid_settings(what: impl Into<String>) -> Self {
        Self::InvalidSettings { what: what.into() }
    }
}
