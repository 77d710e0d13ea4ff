use thiserror::Error;

use crate::model::{DeviceId, Timestamp};

pub type Result<T> = std::result::Result<T, MalformedDatasetError>;

/// Raised while building the SnapshotStore. Always fatal: the exporter
/// refuses to start on a dataset it cannot replay completely.
#[derive(Debug, Error)]
pub enum MalformedDatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid timestamp {value:?} at line {line}")]
    InvalidTimestamp { line: u64, value: String },

    #[error("missing field {field} at line {line}")]
    MissingField { line: u64, field: &'static str },

    #[error("timestamp {timestamp} has no record for device {device}")]
    MissingDevice {
        timestamp: Timestamp,
        device: DeviceId,
    },

    #[error("timestamp {timestamp} has more than one record for device {device}")]
    DuplicateDevice {
        timestamp: Timestamp,
        device: DeviceId,
    },

    #[error("timestamp {timestamp} has no host record")]
    MissingHost { timestamp: Timestamp },

    #[error("timestamp {timestamp} has more than one host record")]
    DuplicateHost { timestamp: Timestamp },

    #[error("dataset contains no records for the configured fleet")]
    Empty,
}

#[derive(Debug, Error, PartialEq)]
pub enum FleetError {
    #[error("fleet must contain at least one device")]
    Empty,

    #[error("device {0} is listed more than once")]
    Duplicate(DeviceId),

    #[error("{0:?} is reserved for host rows and cannot name a device")]
    Reserved(String),
}
