//! Routing configuration errors.
//!
//! All of these are fatal at setup time. A simulation is never started with
//! an invalid routing configuration.

use thiserror::Error;

/// Errors detected while validating routing configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A rating-mechanism window length was zero or negative.
    #[error("{mechanism}: window length must be positive, got {value}")]
    NonPositiveWindow { mechanism: &'static str, value: f64 },

    /// A constant that must lie in [0, 1] was out of range.
    #[error("{name} must be between 0 and 1, got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    /// A constant that must be strictly positive was not.
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

pub(crate) fn check_unit_range(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange { name, value });
    }
    Ok(())
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}
