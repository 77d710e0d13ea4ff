use fleetgauge_core::DeviceMetric;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Invalid threshold / weight tables, detected before any snapshot is balanced.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("metric {metric} has a weight but no threshold")]
    MissingThreshold { metric: DeviceMetric },

    #[error("threshold for {metric} must be a positive number, got {value}")]
    InvalidThreshold { metric: DeviceMetric, value: f64 },

    #[error("weight for {metric} must be a non-negative number, got {value}")]
    InvalidWeight { metric: DeviceMetric, value: f64 },
}
